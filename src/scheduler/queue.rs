//! In-memory FIFO task queue with a completion barrier.
//!
//! Every unit moves through `pending → in-flight → done`:
//!
//! - [`TaskQueue::put`] appends a pending unit and returns its ticket
//! - [`TaskQueue::get`] hands the oldest pending unit to exactly one caller,
//!   blocking until one is available or the queue is closed
//! - [`TaskQueue::mark_done`] completes an in-flight unit, whatever its outcome
//! - [`TaskQueue::join`] resolves once every unit ever put has been marked done
//!
//! All state lives behind one mutex whose critical sections never await.
//! Wakeups go through two [`Notify`] handles: one for "a unit is available or
//! the queue closed" and one for "everything is done".

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::Notify;

/// Errors that can occur during queue operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// The queue no longer accepts units.
    #[error("Queue is closed")]
    Closed,

    /// The ticket does not belong to an in-flight unit.
    #[error("Unit {0} is not in flight")]
    NotInFlight(u64),
}

/// Lifecycle state of one enqueued unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Pending,
    InFlight,
    Done,
}

/// A unit handed out by [`TaskQueue::get`], together with the ticket that
/// must be passed back to [`TaskQueue::mark_done`].
#[derive(Debug)]
pub struct Dequeued<U> {
    seq: u64,
    unit: U,
}

impl<U> Dequeued<U> {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn unit(&self) -> &U {
        &self.unit
    }
}

/// Point-in-time view of the queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    /// Units put since creation.
    pub enqueued: u64,
    /// Units waiting to be dequeued.
    pub pending: usize,
    /// Units dequeued but not yet marked done.
    pub in_flight: usize,
    /// Units marked done.
    pub done: u64,
    pub closed: bool,
}

struct QueueState<U> {
    pending: VecDeque<(u64, U)>,
    in_flight: HashSet<u64>,
    next_seq: u64,
    done: u64,
    closed: bool,
}

enum Take<U> {
    Unit(Dequeued<U>),
    Empty,
    Closed,
}

/// Thread-safe FIFO of work units with a join barrier.
pub struct TaskQueue<U> {
    state: Mutex<QueueState<U>>,
    available: Notify,
    drained: Notify,
}

impl<U> Default for TaskQueue<U> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U> TaskQueue<U> {
    /// Creates an empty, open queue.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                in_flight: HashSet::new(),
                next_seq: 0,
                done: 0,
                closed: false,
            }),
            available: Notify::new(),
            drained: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<U>> {
        // Critical sections never panic half-way, so a poisoned guard still
        // holds consistent state.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a unit and returns its ticket.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Closed` once [`TaskQueue::close`] has been called.
    pub fn put(&self, unit: U) -> Result<u64, QueueError> {
        let seq = {
            let mut state = self.lock();
            if state.closed {
                return Err(QueueError::Closed);
            }
            let seq = state.next_seq;
            state.next_seq += 1;
            state.pending.push_back((seq, unit));
            seq
        };
        self.available.notify_one();
        Ok(seq)
    }

    /// Appends every unit in order. Returns how many were enqueued.
    pub fn put_all(&self, units: impl IntoIterator<Item = U>) -> Result<usize, QueueError> {
        let mut count = 0;
        for unit in units {
            self.put(unit)?;
            count += 1;
        }
        Ok(count)
    }

    /// Marks the queue as having no more work.
    ///
    /// Units already pending are still handed out; once they are gone,
    /// [`TaskQueue::get`] returns `None` instead of blocking.
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_waiters();
    }

    fn take(&self) -> Take<U> {
        let mut state = self.lock();
        match state.pending.pop_front() {
            Some((seq, unit)) => {
                state.in_flight.insert(seq);
                Take::Unit(Dequeued { seq, unit })
            }
            None if state.closed => Take::Closed,
            None => Take::Empty,
        }
    }

    /// Dequeues the oldest pending unit without blocking.
    ///
    /// Returns `None` when nothing is pending, whether or not the queue is
    /// closed.
    pub fn try_get(&self) -> Option<Dequeued<U>> {
        match self.take() {
            Take::Unit(dequeued) => Some(dequeued),
            Take::Empty | Take::Closed => None,
        }
    }

    /// Dequeues the oldest pending unit, waiting until one is available.
    ///
    /// Returns `None` once the queue is closed and drained of pending units.
    pub async fn get(&self) -> Option<Dequeued<U>> {
        loop {
            // Register interest before inspecting state so a put or close
            // landing in between is not missed.
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.take() {
                Take::Unit(dequeued) => return Some(dequeued),
                Take::Closed => return None,
                Take::Empty => {}
            }

            notified.await;
        }
    }

    /// Completes an in-flight unit.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::NotInFlight` if the ticket was never handed out
    /// or was already marked done.
    pub fn mark_done(&self, seq: u64) -> Result<(), QueueError> {
        let all_done = {
            let mut state = self.lock();
            if !state.in_flight.remove(&seq) {
                return Err(QueueError::NotInFlight(seq));
            }
            state.done += 1;
            state.done == state.next_seq
        };
        if all_done {
            self.drained.notify_waiters();
        }
        Ok(())
    }

    /// Waits until every unit put so far has been marked done.
    ///
    /// Resolves immediately on a queue that never received a unit.
    pub async fn join(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.lock();
                if state.done == state.next_seq {
                    return;
                }
            }

            notified.await;
        }
    }

    /// Returns the lifecycle state of the unit with the given ticket.
    pub fn state_of(&self, seq: u64) -> Option<UnitState> {
        let state = self.lock();
        if seq >= state.next_seq {
            None
        } else if state.in_flight.contains(&seq) {
            Some(UnitState::InFlight)
        } else if state.pending.iter().any(|(s, _)| *s == seq) {
            Some(UnitState::Pending)
        } else {
            Some(UnitState::Done)
        }
    }

    /// Number of pending units.
    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.lock();
        QueueSnapshot {
            enqueued: state.next_seq,
            pending: state.pending.len(),
            in_flight: state.in_flight.len(),
            done: state.done,
            closed: state.closed,
        }
    }
}
