//! Cooperative interruption of running work.
//!
//! Cancelling a promise with `force = true` while its producer work or a
//! composed transform is executing raises an interruption signal for the
//! executing thread. Work is never preempted: it observes the signal at
//! explicit checkpoints.
//!
//! ```ignore
//! let promise = Promise::spawn(|| {
//!     pledge::cancel::sleep(Duration::from_millis(100))?; // returns Err once interrupted
//!     write_report();                                      // skipped after a forced cancel
//!     Ok(42)
//! });
//! promise.cancel(true);
//! ```
//!
//! The signal is scoped to the unit of work the runtime dispatched, not to
//! the thread: a pool thread picking up the next job starts uninterrupted.

use crate::types::{CancelReason, Failure};
use parking_lot::Mutex;
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, Thread};
use std::time::{Duration, Instant};

thread_local! {
    static CURRENT: RefCell<Option<Arc<Interrupt>>> = const { RefCell::new(None) };
}

/// Interruption flag for one dispatched unit of work.
#[derive(Debug, Default)]
pub struct Interrupt {
    requested: AtomicBool,
    runner: Mutex<Option<Thread>>,
}

impl Interrupt {
    /// Creates an unsignalled token.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns true once [`signal`](Self::signal) has been called.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Raises the signal and wakes the executing thread if it is parked.
    ///
    /// A signal raised by the executing thread itself is ignored.
    pub fn signal(&self) {
        let runner = self.runner.lock();
        if let Some(thread) = runner.as_ref() {
            if thread.id() == thread::current().id() {
                return;
            }
            self.requested.store(true, Ordering::Release);
            thread.unpark();
        } else {
            self.requested.store(true, Ordering::Release);
        }
    }

    /// Returns true while some thread is executing work under this token.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.runner.lock().is_some()
    }
}

/// Restores the previous token when the work returns or unwinds.
struct Scope {
    token: Arc<Interrupt>,
    previous: Option<Arc<Interrupt>>,
}

impl Drop for Scope {
    fn drop(&mut self) {
        *self.token.runner.lock() = None;
        let previous = self.previous.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}

/// Runs `f` with `token` installed as the current thread's interruption token.
pub(crate) fn run_interruptible<R>(token: &Arc<Interrupt>, f: impl FnOnce() -> R) -> R {
    *token.runner.lock() = Some(thread::current());
    let previous = CURRENT.with(|current| current.borrow_mut().replace(Arc::clone(token)));
    let _scope = Scope {
        token: Arc::clone(token),
        previous,
    };
    f()
}

/// Returns true if the work running on this thread has been interrupted.
#[must_use]
pub fn is_interrupted() -> bool {
    CURRENT.with(|current| {
        current
            .borrow()
            .as_ref()
            .is_some_and(|token| token.is_requested())
    })
}

/// Returns the cancellation marker if the current work has been interrupted.
pub fn checkpoint() -> Result<(), Failure> {
    if is_interrupted() {
        Err(Failure::cancelled(CancelReason::interrupted()))
    } else {
        Ok(())
    }
}

/// Sleeps for `duration`, returning early with the cancellation marker if the
/// current work is interrupted.
///
/// A duration too large to express as a deadline sleeps until interrupted.
pub fn sleep(duration: Duration) -> Result<(), Failure> {
    let deadline = Instant::now().checked_add(duration);
    loop {
        checkpoint()?;
        match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Ok(());
                }
                thread::park_timeout(remaining);
            }
            None => thread::park(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_outside_work_is_ok() {
        assert!(!is_interrupted());
        assert!(checkpoint().is_ok());
    }

    fn signal_from_other_thread(token: &Interrupt) {
        thread::scope(|s| {
            s.spawn(|| token.signal());
        });
    }

    #[test]
    fn signal_is_visible_inside_scope() {
        let token = Interrupt::new();
        let observed = run_interruptible(&token, || {
            assert!(token.is_running());
            signal_from_other_thread(&token);
            checkpoint()
        });
        let failure = observed.expect_err("interrupted");
        assert!(failure.is_cancellation());
        assert!(!token.is_running());
        assert!(!is_interrupted(), "scope must be restored");
    }

    #[test]
    fn signal_from_executing_thread_is_ignored() {
        let token = Interrupt::new();
        let observed = run_interruptible(&token, || {
            token.signal();
            checkpoint()
        });
        assert!(observed.is_ok());
        assert!(!token.is_requested());
    }

    #[test]
    fn signal_before_work_starts_is_kept() {
        let token = Interrupt::new();
        token.signal();
        assert!(token.is_requested());
        assert!(run_interruptible(&token, checkpoint).is_err());
    }

    #[test]
    fn nested_scopes_restore_outer_token() {
        let outer = Interrupt::new();
        let inner = Interrupt::new();
        run_interruptible(&outer, || {
            run_interruptible(&inner, || signal_from_other_thread(&inner));
            assert!(!is_interrupted());
            signal_from_other_thread(&outer);
            assert!(is_interrupted());
        });
    }

    #[test]
    fn sleep_wakes_on_signal_from_other_thread() {
        let token = Interrupt::new();
        let remote = Arc::clone(&token);
        let signaller = thread::spawn(move || {
            while !remote.is_running() {
                thread::yield_now();
            }
            thread::sleep(Duration::from_millis(10));
            remote.signal();
        });
        let start = Instant::now();
        let result = run_interruptible(&token, || sleep(Duration::from_secs(5)));
        signaller.join().expect("signaller panicked");
        assert!(result.is_err());
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn unbounded_sleep_waits_for_signal() {
        let token = Interrupt::new();
        let remote = Arc::clone(&token);
        let signaller = thread::spawn(move || {
            while !remote.is_running() {
                thread::yield_now();
            }
            thread::sleep(Duration::from_millis(10));
            remote.signal();
        });
        let result = run_interruptible(&token, || sleep(Duration::MAX));
        signaller.join().expect("signaller panicked");
        assert!(result.expect_err("interrupted").is_cancellation());
    }

    #[test]
    fn sleep_completes_without_signal() {
        let token = Interrupt::new();
        let result = run_interruptible(&token, || sleep(Duration::from_millis(5)));
        assert!(result.is_ok());
    }
}
