//! geobatch: bounded concurrent batch dispatch for map data tools.
//!
//! This library runs an upfront list of independent work units through a
//! slow external operation (a generator subprocess or a routing server
//! request) on a fixed-size worker pool, collects per-unit failures without
//! stopping the batch, and merges results into categorized output.

// Core modules
pub mod cli;
pub mod collect;
pub mod enumerate;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod processor;
pub mod scheduler;

// Re-export commonly used error types
pub use error::{BatchError, EnumerationError, OutputError};
