//! Background progress monitor for a running batch.
//!
//! Periodically logs how many units remain, how many are in flight and how
//! many are done, so operators can follow long runs without parsing
//! per-unit log lines. Purely observational: nothing here affects dispatch.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::collect::ErrorCollector;
use crate::scheduler::{QueueSnapshot, TaskQueue};

/// Snapshot of batch progress at a point in time.
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    /// Units waiting in the queue.
    pub remaining: usize,
    /// Units currently being processed.
    pub in_flight: usize,
    /// Units marked done, successful or not.
    pub done: u64,
    /// Units recorded as failed so far.
    pub failed: usize,
    /// Units enqueued in total.
    pub total: u64,
    /// Wall-clock elapsed time since the monitor started.
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    pub fn new(queue: QueueSnapshot, failed: usize, elapsed: Duration) -> Self {
        Self {
            remaining: queue.pending,
            in_flight: queue.in_flight,
            done: queue.done,
            failed,
            total: queue.enqueued,
            elapsed,
        }
    }

    /// Share of units done, as a percentage.
    pub fn percent_done(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.done as f64 / self.total as f64 * 100.0
    }

    /// Units done per second since the monitor started.
    pub fn rate_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.done as f64 / secs
        } else {
            0.0
        }
    }
}

/// A background task that periodically logs batch progress.
///
/// Call [`ProgressMonitor::stop`] to end it; dropping the monitor also ends
/// it at the next wakeup.
pub struct ProgressMonitor {
    stop_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressMonitor {
    /// Start a background progress monitor that logs every `interval`.
    pub fn start<U: Send + Sync + 'static>(
        queue: Arc<TaskQueue<U>>,
        errors: Arc<ErrorCollector<U>>,
        interval: Duration,
    ) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let start = Instant::now();

        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.tick().await; // skip the immediate first tick

            loop {
                tokio::select! {
                    _ = tick.tick() => {}
                    _ = &mut stop_rx => break,
                }

                let snap = ProgressSnapshot::new(queue.snapshot(), errors.len(), start.elapsed());
                tracing::info!(
                    remaining = snap.remaining,
                    in_flight = snap.in_flight,
                    done = snap.done,
                    failed = snap.failed,
                    total = snap.total,
                    progress_pct = format!("{:.1}%", snap.percent_done()),
                    units_per_sec = format!("{:.2}", snap.rate_per_sec()),
                    elapsed_secs = snap.elapsed.as_secs(),
                    "Batch progress"
                );
            }
        });

        Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    /// Signal the background monitor to stop and wait for it to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_percent_and_rate() {
        let queue = QueueSnapshot {
            enqueued: 200,
            pending: 100,
            in_flight: 4,
            done: 96,
            closed: true,
        };
        let snap = ProgressSnapshot::new(queue, 2, Duration::from_secs(48));

        assert_eq!(snap.remaining, 100);
        assert_eq!(snap.failed, 2);
        assert!((snap.percent_done() - 48.0).abs() < f64::EPSILON);
        assert!((snap.rate_per_sec() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_snapshot_empty_queue_is_complete() {
        let snap = ProgressSnapshot::new(QueueSnapshot::default(), 0, Duration::ZERO);
        assert!((snap.percent_done() - 100.0).abs() < f64::EPSILON);
        assert!((snap.rate_per_sec() - 0.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_progress_monitor_start_stop() {
        let queue: Arc<TaskQueue<u32>> = Arc::new(TaskQueue::new());
        queue.put_all(0..3).expect("queue is open");
        let errors = Arc::new(ErrorCollector::new());

        let monitor = ProgressMonitor::start(queue, errors, Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(70)).await;

        tokio::time::timeout(Duration::from_secs(1), monitor.stop())
            .await
            .expect("stop should not wait for the next tick");
    }
}
