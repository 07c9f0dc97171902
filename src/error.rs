//! Error types for geobatch runs.
//!
//! Defines the error taxonomy of a batch run:
//! - Enumeration of work units (empty or unreadable input)
//! - Dependency reachability checked by the preflight probe
//! - Persisting the aggregated output
//!
//! Per-unit failures are not errors at this level: they are collected by
//! [`crate::collect::ErrorCollector`] and surfaced after the join barrier.

use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::ConfigError;
use crate::scheduler::{PoolError, QueueError};

/// Process exit code for a fully successful run.
pub const EXIT_SUCCESS: u8 = 0;
/// Process exit code for invalid input, usage or configuration errors.
pub const EXIT_INVALID_INPUT: u8 = 1;
/// Process exit code when enumeration produced no work units.
pub const EXIT_NO_WORK: u8 = 2;
/// Process exit code when the preflight probe could not reach the dependency.
pub const EXIT_UNREACHABLE: u8 = 3;
/// Process exit code when at least one unit failed but output was written.
pub const EXIT_PARTIAL_FAILURE: u8 = 4;
/// Process exit code when the aggregated output could not be persisted.
pub const EXIT_OUTPUT_FAILED: u8 = 5;

/// Errors that can occur while enumerating work units.
#[derive(Debug, Error)]
pub enum EnumerationError {
    #[error("Input path '{}' is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("Failed to walk '{}': {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Malformed line {line} in '{}': {reason}", path.display())]
    MalformedLine {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while persisting aggregated output.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Output path '{}' has no parent directory", .0.display())]
    InvalidPath(PathBuf),
}

/// Fatal errors that abort a batch run.
#[derive(Debug, Error)]
pub enum BatchError {
    /// Enumeration produced no work units; no worker was started.
    #[error("No work units found: {0}")]
    EnumerationEmpty(String),

    /// The preflight probe could not reach the external dependency.
    #[error("External dependency unreachable: {0}")]
    DependencyUnreachable(String),

    /// The aggregated output could not be persisted.
    #[error("Failed to persist aggregated output: {0}")]
    AggregationWriteFailure(#[from] OutputError),

    #[error("Enumeration failed: {0}")]
    Enumeration(#[from] EnumerationError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Worker pool error: {0}")]
    Pool(#[from] PoolError),
}

impl BatchError {
    /// Returns the process exit code that signals this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::EnumerationEmpty(_) => EXIT_NO_WORK,
            Self::DependencyUnreachable(_) => EXIT_UNREACHABLE,
            Self::AggregationWriteFailure(_) => EXIT_OUTPUT_FAILED,
            Self::Enumeration(_)
            | Self::InvalidInput(_)
            | Self::Config(_)
            | Self::Queue(_)
            | Self::Pool(_) => EXIT_INVALID_INPUT,
        }
    }
}
