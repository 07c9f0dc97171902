//! Collector for per-unit failures.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A failed unit and the reason its processor call failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord<U> {
    pub unit: U,
    pub reason: String,
}

impl<U: fmt::Display> fmt::Display for ErrorRecord<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error processing {}: {}", self.unit, self.reason)
    }
}

/// Append-only sink of [`ErrorRecord`]s, safe to share across workers.
///
/// Recording holds the lock only for a `Vec::push`.
pub struct ErrorCollector<U> {
    records: Mutex<Vec<ErrorRecord<U>>>,
}

impl<U> Default for ErrorCollector<U> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U> ErrorCollector<U> {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ErrorRecord<U>>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a failure for `unit`.
    pub fn record(&self, unit: U, reason: impl Into<String>) {
        self.lock().push(ErrorRecord {
            unit,
            reason: reason.into(),
        });
    }

    /// Removes and returns every record in arrival order.
    pub fn drain(&self) -> Vec<ErrorRecord<U>> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
