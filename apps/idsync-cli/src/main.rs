//! idsync - one-shot directory synchronization into a SCIM target
//!
//! Exit codes: 0 on success, 1 when the run failed or skipped failures,
//! 2 on configuration errors.

use clap::Parser;
use idsync_cli::{app, logging, Cli, CliError, CliResult, Settings};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            tracing::error!(error = %e, "idsync failed");
            e.print();
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let settings = Settings::load(&cli)?;
    logging::init_logging(&settings.log.level, settings.log.format).map_err(CliError::Config)?;
    settings.validate()?;

    let report = app::execute(&settings).await?;
    if cli.print_report {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| CliError::Config(format!("failed to render report: {e}")))?;
        println!("{json}");
    }
    app::check_report(&report)
}
