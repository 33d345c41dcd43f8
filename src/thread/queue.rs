//! Thread-safe work queue of a [`Thread`](crate::Thread).
//!
//! Ordinary calls are kept in a FIFO. Timed calls wait in a min-heap ordered
//! by due time (then submission order) and are moved to the tail of the FIFO
//! once due, so a timed call never runs before its due time and never
//! overtakes calls that were already queued.
//!
//! Once closed, the queue rejects every push and hands the call back.

use crate::event::call::BoxedCall;

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub(crate) type QueuedCall = Box<dyn BoxedCall>;

struct TimedCall {
    due: Instant,
    sequence: u64,
    call: QueuedCall,
}

impl PartialEq for TimedCall {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.sequence == other.sequence
    }
}

impl Eq for TimedCall {}

impl PartialOrd for TimedCall {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimedCall {
    // Reversed so that the heap yields the earliest due call first.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (other.due, other.sequence).cmp(&(self.due, self.sequence))
    }
}

#[derive(Default)]
struct QueueState {
    calls: VecDeque<QueuedCall>,
    timed: BinaryHeap<TimedCall>,
    // Timed calls whose due time cannot be represented.
    never_due: Vec<QueuedCall>,
    sequence: u64,
    closed: bool,
}

#[derive(Default)]
pub(crate) struct EventQueue {
    state: Mutex<QueueState>,
}

impl EventQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends `call` to the tail of the FIFO.
    ///
    /// # Errors
    /// Gives `call` back if the queue is closed.
    pub(crate) fn push(&self, call: QueuedCall) -> Result<(), QueuedCall> {
        let mut state = self.state.lock().unwrap();

        if state.closed {
            return Err(call);
        }

        state.calls.push_back(call);
        Ok(())
    }

    /// Schedules `call` to be moved to the FIFO once `due` has passed. A
    /// `None` due time never comes; the call is kept until the queue closes.
    ///
    /// # Errors
    /// Gives `call` back if the queue is closed.
    pub(crate) fn push_timed(
        &self,
        call: QueuedCall,
        due: Option<Instant>,
    ) -> Result<(), QueuedCall> {
        let mut state = self.state.lock().unwrap();

        if state.closed {
            return Err(call);
        }

        let Some(due) = due else {
            state.never_due.push(call);
            return Ok(());
        };

        let sequence = state.sequence;
        state.sequence += 1;
        state.timed.push(TimedCall { due, sequence, call });
        Ok(())
    }

    /// Moves every timed call due at `now` to the FIFO, earliest first.
    ///
    /// # Returns
    /// The number of calls promoted.
    pub(crate) fn promote_due(&self, now: Instant) -> usize {
        let mut state = self.state.lock().unwrap();
        let mut promoted = 0;

        while state.timed.peek().is_some_and(|timed| timed.due <= now) {
            if let Some(timed) = state.timed.pop() {
                state.calls.push_back(timed.call);
                promoted += 1;
            }
        }

        promoted
    }

    /// Dequeues the call at the head of the FIFO.
    pub(crate) fn pop(&self) -> Option<QueuedCall> {
        self.state.lock().unwrap().calls.pop_front()
    }

    /// Number of calls ready to run.
    pub(crate) fn ready_len(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    /// Total number of queued calls, timed ones included.
    pub(crate) fn len(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.calls.len() + state.timed.len() + state.never_due.len()
    }

    /// How long the owning thread may block.
    ///
    /// # Returns
    /// Zero when calls are ready, the delay until the nearest timed call, or
    /// `None` when nothing is queued.
    pub(crate) fn wait_timeout(&self, now: Instant) -> Option<Duration> {
        let state = self.state.lock().unwrap();

        if !state.calls.is_empty() {
            return Some(Duration::ZERO);
        }

        state
            .timed
            .peek()
            .map(|timed| timed.due.saturating_duration_since(now))
    }

    /// Rejects later pushes and removes every queued call. The caller drops
    /// them outside the lock.
    pub(crate) fn close(&self) -> Vec<QueuedCall> {
        let mut state = self.state.lock().unwrap();
        state.closed = true;

        let mut calls: Vec<QueuedCall> = state.calls.drain(..).collect();
        calls.extend(state.timed.drain().map(|timed| timed.call));
        calls.append(&mut state.never_due);
        calls
    }

    /// Accepts pushes again after [`close`](Self::close).
    pub(crate) fn reopen(&self) {
        self.state.lock().unwrap().closed = false;
    }
}
