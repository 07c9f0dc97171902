//! Batch orchestration.
//!
//! Ties the scheduler, the collectors and an output sink together into one
//! run of a batch.
//!
//! # Components
//!
//! - **Config**: worker count, per-unit timeout and progress cadence
//! - **Orchestrator**: the [`BatchRun`] state machine
//! - **Progress**: periodic progress logging while workers run
//!
//! # Flow
//!
//! 1. **Enumerating**: the caller hands over the full list of units
//! 2. **Preflighting**: one synchronous processor call on the first unit
//! 3. **Dispatching**: every unit is enqueued, the queue closed, the pool started
//! 4. **Joining**: wait until every unit is done and every worker has exited
//! 5. **Reporting**: drain errors, resolve categories, write the output
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use geobatch::enumerate::{load_towns, road_pairs, DEFAULT_ROAD_DELTA};
//! use geobatch::output::{CategoryFileSink, CategoryLabels};
//! use geobatch::pipeline::{BatchConfig, BatchRun};
//! use geobatch::processor::WayIdClient;
//!
//! let towns = load_towns("data/towns.csv".as_ref())?;
//! let pairs = road_pairs(&towns, DEFAULT_ROAD_DELTA);
//!
//! let sink = CategoryFileSink::new("data/ways.csv").with_labels(CategoryLabels::world_roads());
//! let mut run = BatchRun::new(
//!     "road-runner",
//!     BatchConfig::new(16).apply_env()?,
//!     Arc::new(WayIdClient::with_timeout("localhost:5000", Duration::from_secs(120))?),
//!     Arc::new(sink),
//! );
//!
//! let report = run.run(pairs).await?;
//! for record in &report.errors {
//!     eprintln!("{record}");
//! }
//! ```

pub mod config;
pub mod orchestrator;
pub mod progress;

pub use config::{timeout_from_secs, BatchConfig, ConfigError};
pub use orchestrator::{BatchReport, BatchRun, RunState};
pub use progress::{ProgressMonitor, ProgressSnapshot};
