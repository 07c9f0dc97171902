//! Bounded concurrent dispatch: task queue, worker pool and the unit types
//! they move around.
//!
//! # Architecture
//!
//! ```text
//!                      ┌──────────────┐
//!                      │  Enumerator  │
//!                      │ (put, close) │
//!                      └──────┬───────┘
//!                             │
//!                      ┌──────▼───────┐
//!                      │  TaskQueue   │◄──── join()
//!                      └──────┬───────┘
//!                             │ get / mark_done
//!         ┌───────────────────┼───────────────────┐
//!         ▼                   ▼                   ▼
//!    ┌─────────┐         ┌─────────┐         ┌─────────┐
//!    │ Worker 1│         │ Worker 2│         │ Worker W│
//!    └────┬────┘         └────┬────┘         └────┬────┘
//!         └──────► ResultAggregator / ErrorCollector ◄──┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use geobatch::scheduler::{TaskQueue, WorkerPool, WorkerPoolConfig};
//! use geobatch::collect::{ErrorCollector, ResultAggregator};
//! use std::sync::Arc;
//!
//! let queue = Arc::new(TaskQueue::new());
//! queue.put_all(units)?;
//! queue.close();
//!
//! let mut pool = WorkerPool::new(
//!     WorkerPoolConfig::new(16),
//!     Arc::clone(&queue),
//!     processor,
//!     Arc::new(ErrorCollector::new()),
//!     Arc::new(ResultAggregator::new()),
//! );
//! pool.start()?;
//! queue.join().await;
//! pool.join_all().await;
//! ```

pub mod outcome;
pub mod queue;
pub mod worker_pool;

pub use outcome::{Category, ProcessingOutcome, ResultItem, WorkUnit};
pub use queue::{Dequeued, QueueError, QueueSnapshot, TaskQueue, UnitState};
pub use worker_pool::{PoolError, PoolStats, WorkerPool, WorkerPoolConfig};
