//! Batch orchestrator.
//!
//! A [`BatchRun`] sequences one batch through its states:
//!
//! ```text
//! Enumerating -> Preflighting -> Dispatching -> Joining -> Reporting -> Done
//!      |              |                                        |
//!      +--------------+----------------> Aborted <-------------+
//! ```
//!
//! Everything before `Dispatching` and after `Joining` runs on the calling
//! task. Only the worker phase is concurrent.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tracing::{debug, info, warn};

use super::config::BatchConfig;
use super::progress::ProgressMonitor;
use crate::collect::{ErrorCollector, ErrorRecord, ResolvedResults, ResultAggregator};
use crate::error::{BatchError, EXIT_PARTIAL_FAILURE, EXIT_SUCCESS};
use crate::output::OutputSink;
use crate::processor::{ExternalProcessor, ProcessorError};
use crate::scheduler::{PoolStats, TaskQueue, WorkUnit, WorkerPool};

/// Lifecycle state of a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Enumerating,
    Preflighting,
    Dispatching,
    Joining,
    Reporting,
    Done,
    Aborted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Enumerating => write!(f, "enumerating"),
            RunState::Preflighting => write!(f, "preflighting"),
            RunState::Dispatching => write!(f, "dispatching"),
            RunState::Joining => write!(f, "joining"),
            RunState::Reporting => write!(f, "reporting"),
            RunState::Done => write!(f, "done"),
            RunState::Aborted => write!(f, "aborted"),
        }
    }
}

/// Outcome of a batch that reached the join barrier.
#[derive(Debug)]
pub struct BatchReport<U> {
    /// Identifiers after category precedence was applied.
    pub results: ResolvedResults,
    /// Failed units, in the order they were recorded.
    pub errors: Vec<ErrorRecord<U>>,
    /// Worker pool statistics at the end of the run.
    pub stats: PoolStats,
    /// Number of units dispatched to the pool.
    pub units: usize,
    /// Every state the run went through, in order.
    pub states: Vec<RunState>,
    /// Wall-clock duration of the whole run.
    pub duration: Duration,
}

impl<U> BatchReport<U> {
    /// Returns the state the run ended in.
    pub fn final_state(&self) -> RunState {
        self.states.last().copied().unwrap_or(RunState::Enumerating)
    }

    /// Returns true if every unit succeeded.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Process exit code for this report: success, or partial failure when
    /// any unit failed.
    pub fn exit_code(&self) -> u8 {
        if self.is_success() {
            EXIT_SUCCESS
        } else {
            EXIT_PARTIAL_FAILURE
        }
    }
}

/// One batch: a processor, a sink and the configuration to run them with.
pub struct BatchRun<U: WorkUnit> {
    name: String,
    config: BatchConfig,
    processor: Arc<dyn ExternalProcessor<U>>,
    sink: Arc<dyn OutputSink>,
    states: Vec<RunState>,
    unreported: Vec<ErrorRecord<U>>,
}

impl<U: WorkUnit> BatchRun<U> {
    pub fn new(
        name: impl Into<String>,
        config: BatchConfig,
        processor: Arc<dyn ExternalProcessor<U>>,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            processor,
            sink,
            states: Vec::new(),
            unreported: Vec::new(),
        }
    }

    /// States entered so far, including `Aborted` after a failed run.
    pub fn states(&self) -> &[RunState] {
        &self.states
    }

    /// Takes the unit failures of a run that aborted after the join
    /// barrier, when no [`BatchReport`] was returned to carry them.
    pub fn take_unreported(&mut self) -> Vec<ErrorRecord<U>> {
        std::mem::take(&mut self.unreported)
    }

    /// Runs the batch over the enumerated `units`.
    ///
    /// Per-unit failures do not fail the run; they are returned in the
    /// report. The run itself fails only when there is nothing to do, the
    /// dependency is unreachable, or the output cannot be written.
    ///
    /// # Errors
    ///
    /// - `BatchError::Config` for an invalid configuration
    /// - `BatchError::EnumerationEmpty` if `units` is empty
    /// - `BatchError::DependencyUnreachable` if the preflight probe cannot
    ///   reach the dependency
    /// - `BatchError::AggregationWriteFailure` if the sink fails
    pub async fn run(&mut self, units: Vec<U>) -> Result<BatchReport<U>, BatchError> {
        let started = Instant::now();
        self.states.clear();
        self.unreported.clear();
        self.enter(RunState::Enumerating);

        if let Err(e) = self.config.validate() {
            return Err(self.abort(e.into()));
        }

        let Some(first) = units.first() else {
            let err = BatchError::EnumerationEmpty(format!("{} enumerated no units", self.name));
            return Err(self.abort(err));
        };
        info!(batch = %self.name, units = units.len(), "Enumerated work units");

        self.enter(RunState::Preflighting);
        if let Err(e) = self.preflight(first).await {
            return Err(self.abort(e));
        }

        self.enter(RunState::Dispatching);
        let total = units.len();
        let queue = Arc::new(TaskQueue::new());
        let errors = Arc::new(ErrorCollector::new());
        let results = Arc::new(ResultAggregator::new());

        if let Err(e) = queue.put_all(units) {
            return Err(self.abort(e.into()));
        }
        queue.close();

        let mut pool = WorkerPool::new(
            self.config.pool_config(),
            Arc::clone(&queue),
            Arc::clone(&self.processor),
            Arc::clone(&errors),
            Arc::clone(&results),
        );
        if let Err(e) = pool.start() {
            return Err(self.abort(e.into()));
        }
        let monitor = ProgressMonitor::start(
            Arc::clone(&queue),
            Arc::clone(&errors),
            self.config.progress_interval,
        );

        self.enter(RunState::Joining);
        queue.join().await;
        if let Err(e) = pool.shutdown().await {
            warn!(batch = %self.name, error = %e, "Workers did not stop cleanly");
        }
        monitor.stop().await;

        self.enter(RunState::Reporting);
        let errors = errors.drain();
        let resolved = results.resolve();
        if let Err(e) = self.sink.write(&resolved) {
            for record in &errors {
                warn!(batch = %self.name, "{record}");
            }
            self.unreported = errors;
            return Err(self.abort(e.into()));
        }

        let stats = pool.stats();
        self.enter(RunState::Done);
        info!(
            batch = %self.name,
            units = total,
            succeeded = stats.units_succeeded,
            failed = errors.len(),
            success_rate = format!("{:.1}%", stats.success_rate()),
            results = resolved.len(),
            duration_secs = started.elapsed().as_secs(),
            "Batch finished"
        );

        Ok(BatchReport {
            results: resolved,
            errors,
            stats,
            units: total,
            states: self.states.clone(),
            duration: started.elapsed(),
        })
    }

    /// Calls the processor once on the first unit before any worker exists.
    ///
    /// Only an unreachable dependency aborts the run. Any other failure is
    /// logged and left for the pool, which processes the same unit again.
    async fn preflight(&self, unit: &U) -> Result<(), BatchError> {
        let call = AssertUnwindSafe(self.processor.process(unit)).catch_unwind();
        let result = match self.config.unit_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => Ok(Err(ProcessorError::Timeout(limit))),
            },
            None => call.await,
        };

        match result {
            Ok(Ok(ids)) => {
                debug!(unit = %unit, returned = ids.len(), "Preflight probe succeeded");
                Ok(())
            }
            Ok(Err(e)) if e.is_unreachable() => {
                Err(BatchError::DependencyUnreachable(format!("{unit}: {e}")))
            }
            Ok(Err(e)) => {
                warn!(unit = %unit, error = %e, "Preflight probe failed, continuing");
                Ok(())
            }
            Err(_) => {
                warn!(unit = %unit, "Preflight probe panicked, continuing");
                Ok(())
            }
        }
    }

    fn enter(&mut self, state: RunState) {
        debug!(batch = %self.name, state = %state, "Batch state");
        self.states.push(state);
    }

    fn abort(&mut self, err: BatchError) -> BatchError {
        warn!(batch = %self.name, error = %err, "Batch aborted");
        self.enter(RunState::Aborted);
        err
    }
}
