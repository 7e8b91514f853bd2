//! CLI error types and exit codes

use idsync_core::{ErrorKind, SyncError};
use idsync_directory::DirectoryError;
use idsync_scim_client::ScimClientError;
use thiserror::Error;

/// Exit codes for the CLI
/// - 0: Success
/// - 1: Sync failed, or finished with skipped failures
/// - 2: Configuration error
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Sync failed: {0}")]
    Sync(#[from] SyncError),

    #[error("Target client error: {0}")]
    Target(#[from] ScimClientError),

    #[error("Directory client error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Sync finished with {0} failed operation(s)")]
    PartialFailure(usize),
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) | CliError::Io { .. } | CliError::Yaml(_) => 2,
            CliError::Sync(e) if e.kind() == ErrorKind::Config => 2,
            CliError::Target(ScimClientError::InvalidConfig(_)) => 2,
            CliError::Directory(DirectoryError::Config(_)) => 2,
            CliError::Sync(_)
            | CliError::Target(_)
            | CliError::Directory(_)
            | CliError::PartialFailure(_) => 1,
        }
    }

    /// Print the error to stderr
    pub fn print(&self) {
        if std::env::var("NO_COLOR").is_err() {
            eprintln!("\x1b[31mError:\x1b[0m {self}");
        } else {
            eprintln!("Error: {self}");
        }
    }
}
