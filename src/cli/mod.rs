//! Command-line interface for geobatch.
//!
//! Provides the `geom-index` and `road-runner` batch commands.

mod commands;

pub use commands::{exit_code_for, parse_cli, run_with_cli, usage_exit_code, Cli};
