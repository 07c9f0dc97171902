//! Thread-safe sinks that workers write into during the concurrent phase.
//!
//! - **ErrorCollector**: append-only `(unit, reason)` records for failed units
//! - **ResultAggregator**: categorized, deduplicated result identifiers
//!
//! Both are drained by the orchestrator only after the queue's join barrier.

pub mod aggregator;
pub mod errors;

pub use aggregator::{ResolvedResults, ResultAggregator};
pub use errors::{ErrorCollector, ErrorRecord};
