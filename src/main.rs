//! geobatch CLI entry point.
//!
//! Initializes logging and delegates to the CLI module for command handling.

use std::process::ExitCode;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first to get log_level
    let cli = match geobatch::cli::parse_cli() {
        Ok(cli) => cli,
        Err(code) => return ExitCode::from(code),
    };

    // Initialize tracing with environment filter
    // Priority: RUST_LOG env var > --log-level CLI arg > default "info"
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| cli.log_level.clone());

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)))
        .init();

    match geobatch::cli::run_with_cli(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "geobatch failed");
            ExitCode::from(geobatch::cli::exit_code_for(&e))
        }
    }
}
