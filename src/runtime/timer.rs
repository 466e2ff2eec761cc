//! Deadline timer backing promise timeouts.
//!
//! One background thread per [`Timer`] sleeps until the earliest deadline in
//! a min-heap and runs the expired actions. Cancelled entries are dropped
//! lazily when they reach the top of the heap.

use crate::error::{Error, Result, ResultExt};
use crate::tracing_compat::{debug, trace, warn};
use crate::types::PanicPayload;
use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

type Action = Box<dyn FnOnce() + Send + 'static>;

/// A timer entry in the heap.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct TimerEntry {
    deadline: Instant,
    /// Insertion order; breaks deadline ties and keys the action table.
    generation: u64,
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earliest deadline first)
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.generation.cmp(&self.generation))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct TimerState {
    heap: BinaryHeap<TimerEntry>,
    actions: HashMap<u64, Action>,
    next_generation: u64,
    thread_started: bool,
    shutdown: bool,
}

impl TimerState {
    /// Pops expired entries whose actions are still registered.
    fn pop_expired(&mut self, now: Instant) -> Vec<Action> {
        let mut expired = Vec::new();
        while let Some(entry) = self.heap.peek().copied() {
            if entry.deadline > now {
                break;
            }
            self.heap.pop();
            if let Some(action) = self.actions.remove(&entry.generation) {
                expired.push(action);
            }
        }
        expired
    }

    fn peek_deadline(&mut self) -> Option<Instant> {
        // Skip cancelled entries so the thread does not wake for them.
        while let Some(entry) = self.heap.peek() {
            if self.actions.contains_key(&entry.generation) {
                return Some(entry.deadline);
            }
            self.heap.pop();
        }
        None
    }
}

struct TimerInner {
    state: Mutex<TimerState>,
    condvar: Condvar,
    thread_name: String,
}

/// Runs actions after a delay on a dedicated thread.
pub struct Timer {
    inner: Arc<TimerInner>,
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Timer")
            .field("pending", &state.actions.len())
            .field("shutdown", &state.shutdown)
            .finish()
    }
}

/// Handle to one scheduled action.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    inner: std::sync::Weak<TimerInner>,
    generation: u64,
}

impl TimerHandle {
    /// Cancels the action. Returns false if it already ran or was cancelled.
    pub fn cancel(&self) -> bool {
        self.inner.upgrade().is_some_and(|inner| {
            inner
                .state
                .lock()
                .actions
                .remove(&self.generation)
                .is_some()
        })
    }
}

impl fmt::Debug for TimerInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerInner")
            .field("thread_name", &self.thread_name)
            .finish_non_exhaustive()
    }
}

impl Timer {
    /// Creates a timer; its thread starts on the first [`schedule`](Self::schedule).
    #[must_use]
    pub fn new(thread_name_prefix: &str) -> Self {
        Self {
            inner: Arc::new(TimerInner {
                state: Mutex::new(TimerState::default()),
                condvar: Condvar::new(),
                thread_name: format!("{thread_name_prefix}-timer"),
            }),
        }
    }

    /// Runs `action` on the timer thread once `delay` has elapsed.
    ///
    /// A delay too large to express as a deadline never elapses: `action` is
    /// dropped unrun and the handle has nothing to cancel.
    pub fn schedule(
        &self,
        delay: Duration,
        action: impl FnOnce() + Send + 'static,
    ) -> Result<TimerHandle> {
        let deadline = Instant::now().checked_add(delay);
        let mut state = self.inner.state.lock();
        if state.shutdown {
            return Err(Error::executor_shutdown("timer"));
        }
        let generation = state.next_generation;
        state.next_generation += 1;
        let handle = TimerHandle {
            inner: Arc::downgrade(&self.inner),
            generation,
        };
        let Some(deadline) = deadline else {
            trace!(?delay, "delay never elapses, action dropped");
            return Ok(handle);
        };
        if !state.thread_started {
            let inner = Arc::clone(&self.inner);
            thread::Builder::new()
                .name(self.inner.thread_name.clone())
                .spawn(move || timer_loop(&inner))
                .context("spawning timer thread")?;
            state.thread_started = true;
            debug!(thread = %self.inner.thread_name, "timer thread started");
        }
        state.actions.insert(generation, Box::new(action));
        let earliest = state.heap.peek().map_or(true, |e| deadline < e.deadline);
        state.heap.push(TimerEntry {
            deadline,
            generation,
        });
        drop(state);
        if earliest {
            self.inner.condvar.notify_one();
        }
        Ok(handle)
    }

    /// Number of scheduled, not yet run or cancelled, actions.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.state.lock().actions.len()
    }

    /// Stops the thread and drops pending actions without running them.
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        state.shutdown = true;
        state.actions.clear();
        state.heap.clear();
        drop(state);
        self.inner.condvar.notify_all();
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn timer_loop(inner: &TimerInner) {
    let mut state = inner.state.lock();
    loop {
        if state.shutdown {
            break;
        }
        let now = Instant::now();
        let expired = state.pop_expired(now);
        if !expired.is_empty() {
            drop(state);
            for action in expired {
                if let Err(panic) = catch_unwind(AssertUnwindSafe(action)) {
                    let payload = PanicPayload::from_panic(panic.as_ref());
                    warn!(panic = %payload.message(), "timer action panicked");
                }
            }
            state = inner.state.lock();
            continue;
        }
        match state.peek_deadline() {
            Some(deadline) => {
                inner.condvar.wait_until(&mut state, deadline);
            }
            None => inner.condvar.wait(&mut state),
        }
    }
    debug!(thread = %inner.thread_name, "timer thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn earliest_first() {
        let timer = Timer::new("test");
        let (tx, rx) = mpsc::channel();
        for (label, ms) in [("b", 60_u64), ("a", 20), ("c", 100)] {
            let tx = tx.clone();
            timer
                .schedule(Duration::from_millis(ms), move || tx.send(label).unwrap())
                .unwrap();
        }
        let order: Vec<_> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(order, ["a", "b", "c"]);
    }

    #[test]
    fn cancelled_action_never_runs() {
        let timer = Timer::new("test");
        let (tx, rx) = mpsc::channel();
        let tx2 = tx.clone();
        let handle = timer
            .schedule(Duration::from_millis(20), move || tx.send("cancelled").unwrap())
            .unwrap();
        timer
            .schedule(Duration::from_millis(40), move || tx2.send("kept").unwrap())
            .unwrap();
        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "kept");
        assert_eq!(timer.pending(), 0);
    }

    #[test]
    fn unrepresentable_delay_never_fires() {
        let timer = Timer::new("test");
        let (tx, rx) = mpsc::channel::<()>();
        let handle = timer.schedule(Duration::MAX, move || tx.send(()).unwrap()).unwrap();
        assert_eq!(timer.pending(), 0);
        assert!(!handle.cancel());
        assert!(rx.recv_timeout(Duration::from_millis(20)).is_err());
    }

    #[test]
    fn shutdown_rejects_new_actions() {
        let timer = Timer::new("test");
        timer.shutdown();
        assert!(timer.schedule(Duration::ZERO, || {}).is_err());
    }

    #[test]
    fn panicking_action_keeps_timer_alive() {
        crate::test_utils::init_test_logging();
        let timer = Timer::new("test");
        timer
            .schedule(Duration::ZERO, || panic!("action failed"))
            .unwrap();
        let (tx, rx) = mpsc::channel();
        timer
            .schedule(Duration::from_millis(10), move || tx.send(1).unwrap())
            .unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);
    }
}
