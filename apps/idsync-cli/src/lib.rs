//! idsync command-line application: settings, logging and wiring.

pub mod app;
pub mod cli;
pub mod error;
pub mod logging;
pub mod settings;

pub use cli::Cli;
pub use error::{CliError, CliResult};
pub use settings::Settings;
