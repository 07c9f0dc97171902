//! Fixed-size pool of workers draining a [`TaskQueue`].
//!
//! Each worker runs as an independent tokio task and loops:
//!
//! 1. Dequeue a unit, or exit once the queue is closed and drained
//! 2. Call the external processor (the only long suspension point),
//!    bounded by the configured per-unit timeout
//! 3. File successful identifiers into the [`ResultAggregator`], or record
//!    the failure in the [`ErrorCollector`]
//! 4. Mark the unit done, whatever the outcome
//!
//! A panic inside the processor is caught and recorded as a failure of that
//! unit, so the join barrier is always reached.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::outcome::{ProcessingOutcome, WorkUnit};
use super::queue::{Dequeued, TaskQueue};
use crate::collect::{ErrorCollector, ResultAggregator};
use crate::processor::{ExternalProcessor, ProcessorError};

/// Errors that can occur in the worker pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool cannot run with the given configuration.
    #[error("Invalid pool configuration: {0}")]
    InvalidConfig(String),

    /// Pool is already running.
    #[error("Pool is already running")]
    AlreadyRunning,

    /// Pool is not running.
    #[error("Pool is not running")]
    NotRunning,

    /// Shutdown timed out.
    #[error("Shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),
}

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker tasks to spawn.
    pub num_workers: usize,
    /// Upper bound on a single processor call; `None` waits indefinitely.
    pub unit_timeout: Option<Duration>,
    /// Timeout for [`WorkerPool::shutdown`].
    pub shutdown_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: 8,
            unit_timeout: Some(Duration::from_secs(3600)),
            shutdown_timeout: Duration::from_secs(60),
        }
    }
}

impl WorkerPoolConfig {
    /// Creates a new configuration with the specified number of workers.
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers,
            ..Default::default()
        }
    }

    /// Sets the per-unit timeout.
    pub fn with_unit_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.unit_timeout = timeout;
        self
    }

    /// Sets the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Statistics about the worker pool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolStats {
    /// Total number of workers in the pool.
    pub num_workers: usize,
    /// Number of workers currently inside a processor call.
    pub active_workers: usize,
    /// Units whose processor call succeeded.
    pub units_succeeded: u64,
    /// Units whose processor call failed, timed out or panicked.
    pub units_failed: u64,
    /// Average processor call duration.
    pub average_unit_duration: Duration,
}

impl PoolStats {
    /// Returns the total number of units processed.
    pub fn total_processed(&self) -> u64 {
        self.units_succeeded + self.units_failed
    }

    /// Returns the success rate as a percentage.
    pub fn success_rate(&self) -> f64 {
        let total = self.total_processed();
        if total == 0 {
            return 0.0;
        }
        (self.units_succeeded as f64 / total as f64) * 100.0
    }
}

/// Shared state for tracking pool statistics.
struct SharedPoolStats {
    units_succeeded: AtomicU64,
    units_failed: AtomicU64,
    total_duration_ms: AtomicU64,
    active_workers: AtomicU64,
}

impl SharedPoolStats {
    fn new() -> Self {
        Self {
            units_succeeded: AtomicU64::new(0),
            units_failed: AtomicU64::new(0),
            total_duration_ms: AtomicU64::new(0),
            active_workers: AtomicU64::new(0),
        }
    }

    fn record_success(&self, duration: Duration) {
        self.units_succeeded.fetch_add(1, Ordering::SeqCst);
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    fn record_failure(&self, duration: Duration) {
        self.units_failed.fetch_add(1, Ordering::SeqCst);
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    fn increment_active(&self) {
        self.active_workers.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement_active(&self) {
        self.active_workers.fetch_sub(1, Ordering::SeqCst);
    }

    fn to_pool_stats(&self, num_workers: usize) -> PoolStats {
        let succeeded = self.units_succeeded.load(Ordering::SeqCst);
        let failed = self.units_failed.load(Ordering::SeqCst);
        let total_duration_ms = self.total_duration_ms.load(Ordering::SeqCst);
        let active = self.active_workers.load(Ordering::SeqCst);

        let total_units = succeeded + failed;
        let average_duration = if total_units > 0 {
            Duration::from_millis(total_duration_ms / total_units)
        } else {
            Duration::ZERO
        };

        PoolStats {
            num_workers,
            active_workers: active as usize,
            units_succeeded: succeeded,
            units_failed: failed,
            average_unit_duration: average_duration,
        }
    }
}

/// Pool of workers sharing one queue, one processor and the two collectors.
pub struct WorkerPool<U: WorkUnit> {
    config: WorkerPoolConfig,
    queue: Arc<TaskQueue<U>>,
    processor: Arc<dyn ExternalProcessor<U>>,
    errors: Arc<ErrorCollector<U>>,
    results: Arc<ResultAggregator>,
    worker_handles: Vec<JoinHandle<()>>,
    stats: Arc<SharedPoolStats>,
    is_running: AtomicBool,
}

impl<U: WorkUnit> WorkerPool<U> {
    /// Creates a pool; no worker runs until [`WorkerPool::start`].
    pub fn new(
        config: WorkerPoolConfig,
        queue: Arc<TaskQueue<U>>,
        processor: Arc<dyn ExternalProcessor<U>>,
        errors: Arc<ErrorCollector<U>>,
        results: Arc<ResultAggregator>,
    ) -> Self {
        Self {
            config,
            queue,
            processor,
            errors,
            results,
            worker_handles: Vec::new(),
            stats: Arc::new(SharedPoolStats::new()),
            is_running: AtomicBool::new(false),
        }
    }

    /// Spawns exactly `num_workers` workers.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::AlreadyRunning` if the pool is already running and
    /// `PoolError::InvalidConfig` for a pool of zero workers.
    pub fn start(&mut self) -> Result<(), PoolError> {
        if self.is_running.load(Ordering::SeqCst) {
            return Err(PoolError::AlreadyRunning);
        }
        if self.config.num_workers == 0 {
            return Err(PoolError::InvalidConfig(
                "num_workers must be at least 1".to_string(),
            ));
        }

        for i in 0..self.config.num_workers {
            let worker = Worker {
                id: format!("worker-{}", i),
                queue: Arc::clone(&self.queue),
                processor: Arc::clone(&self.processor),
                errors: Arc::clone(&self.errors),
                results: Arc::clone(&self.results),
                unit_timeout: self.config.unit_timeout,
                stats: Arc::clone(&self.stats),
            };

            self.worker_handles.push(tokio::spawn(worker.run()));
        }

        self.is_running.store(true, Ordering::SeqCst);
        info!(num_workers = self.config.num_workers, "Worker pool started");

        Ok(())
    }

    /// Waits for every worker to exit.
    ///
    /// Workers exit once the queue is closed and drained, so this only
    /// resolves after [`TaskQueue::close`] has been called.
    pub async fn join_all(&mut self) {
        for handle in self.worker_handles.drain(..) {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task panicked");
            }
        }
        self.is_running.store(false, Ordering::SeqCst);
    }

    /// Closes the queue and waits for workers to finish their current units.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::NotRunning` if the pool was never started and
    /// `PoolError::ShutdownTimeout` if workers don't stop in time.
    pub async fn shutdown(&mut self) -> Result<(), PoolError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(PoolError::NotRunning);
        }

        info!("Initiating worker pool shutdown");
        self.queue.close();

        let shutdown_timeout = self.config.shutdown_timeout;
        match tokio::time::timeout(shutdown_timeout, self.join_all()).await {
            Ok(()) => {
                info!("Worker pool shutdown complete");
                Ok(())
            }
            Err(_) => {
                self.is_running.store(false, Ordering::SeqCst);
                Err(PoolError::ShutdownTimeout(shutdown_timeout))
            }
        }
    }

    /// Returns current pool statistics.
    pub fn stats(&self) -> PoolStats {
        self.stats.to_pool_stats(self.config.num_workers)
    }

    /// Returns whether the pool is currently running.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Returns the number of workers in the pool.
    pub fn num_workers(&self) -> usize {
        self.config.num_workers
    }
}

/// A single worker that processes units from the queue.
struct Worker<U: WorkUnit> {
    id: String,
    queue: Arc<TaskQueue<U>>,
    processor: Arc<dyn ExternalProcessor<U>>,
    errors: Arc<ErrorCollector<U>>,
    results: Arc<ResultAggregator>,
    unit_timeout: Option<Duration>,
    stats: Arc<SharedPoolStats>,
}

impl<U: WorkUnit> Worker<U> {
    /// Main worker loop.
    async fn run(self) {
        debug!(worker_id = %self.id, "Worker started");

        while let Some(dequeued) = self.queue.get().await {
            self.process_unit(dequeued).await;
        }

        debug!(worker_id = %self.id, "No more units in queue, worker exiting");
    }

    async fn process_unit(&self, dequeued: Dequeued<U>) {
        let unit = dequeued.unit();
        let start_time = Instant::now();

        self.stats.increment_active();
        let outcome = self.execute(unit).await;
        let duration = start_time.elapsed();
        self.stats.decrement_active();

        match outcome {
            ProcessingOutcome::Success(items) => {
                let returned = items.len();
                let added = self.results.extend(items);
                self.stats.record_success(duration);
                debug!(
                    worker_id = %self.id,
                    unit = %unit,
                    returned,
                    added,
                    duration_ms = duration.as_millis(),
                    "Unit completed"
                );
            }
            ProcessingOutcome::Failure(reason) => {
                self.stats.record_failure(duration);
                warn!(
                    worker_id = %self.id,
                    unit = %unit,
                    error = %reason,
                    "Unit failed"
                );
                self.errors.record(unit.clone(), reason);
            }
        }

        if let Err(e) = self.queue.mark_done(dequeued.seq()) {
            error!(worker_id = %self.id, unit = %unit, error = %e, "Failed to mark unit done");
        }
    }

    /// Runs the processor for one unit and classifies what came back.
    async fn execute(&self, unit: &U) -> ProcessingOutcome {
        let call = AssertUnwindSafe(self.processor.process(unit)).catch_unwind();

        let result = match self.unit_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => {
                    return ProcessingOutcome::Failure(ProcessorError::Timeout(limit).to_string())
                }
            },
            None => call.await,
        };

        match result {
            Ok(Ok(ids)) => ProcessingOutcome::classify(unit, ids),
            Ok(Err(e)) => ProcessingOutcome::Failure(e.to_string()),
            Err(panic) => ProcessingOutcome::Failure(format!(
                "processor panicked: {}",
                panic_message(panic.as_ref())
            )),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    }
}
