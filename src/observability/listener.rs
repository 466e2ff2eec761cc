//! Composition listeners.
//!
//! A [`CompositionListener`] wraps every continuation dispatch. Its
//! [`capture`](CompositionListener::capture) hook runs on the thread that
//! composes a promise (for example, inside `map`), and the captured value is
//! handed to [`enter`](CompositionListener::enter) on whichever thread later
//! runs the continuation. [`exit`](CompositionListener::exit) runs after the
//! continuation returns or unwinds.
//!
//! Listeners live in a process-wide set. Registration is idempotent per
//! `Arc` identity: registering the same listener twice is a usage error.
//!
//! # Failure isolation
//!
//! - A capture or enter failure (error or panic) skips only that listener's
//!   wrapper; other listeners and the continuation still run.
//! - Exit failures are swallowed.
//!
//! Both are reported to the [diagnostic sink](super::diagnostics).

use super::diagnostics::{report_listener_failure, ListenerPhase};
use crate::error::{Error, ErrorKind, Result};
use crate::types::Failure;
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Value captured on the composing thread.
pub type Captured = Box<dyn Any + Send>;

/// Value produced by `enter` and consumed by `exit` on the dispatch thread.
pub type Restore = Box<dyn Any>;

/// Observer wrapping every continuation dispatch.
pub trait CompositionListener: Send + Sync + 'static {
    /// Name used in diagnostics.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Snapshots ambient state on the composing thread.
    fn capture(&self) -> Captured;

    /// Installs the captured state before the continuation runs.
    fn enter(&self, captured: &Captured) -> core::result::Result<Restore, Failure>;

    /// Restores the dispatch thread's previous state.
    fn exit(&self, restore: Restore) -> core::result::Result<(), Failure> {
        drop(restore);
        Ok(())
    }
}

static LISTENERS: RwLock<Vec<Arc<dyn CompositionListener>>> = parking_lot::const_rwlock(Vec::new());

fn same_listener(a: &Arc<dyn CompositionListener>, b: &Arc<dyn CompositionListener>) -> bool {
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}

/// Adds a listener to the process-wide set.
///
/// Returns [`ErrorKind::AlreadyRegistered`] if this exact listener is already
/// registered.
pub fn register_listener(listener: Arc<dyn CompositionListener>) -> Result<()> {
    let mut listeners = LISTENERS.write();
    if listeners.iter().any(|l| same_listener(l, &listener)) {
        return Err(Error::new(ErrorKind::AlreadyRegistered)
            .with_message(format!("listener {} is already registered", listener.name())));
    }
    listeners.push(listener);
    Ok(())
}

/// Removes a listener. Returns false if it was not registered.
pub fn unregister_listener(listener: &Arc<dyn CompositionListener>) -> bool {
    let mut listeners = LISTENERS.write();
    let before = listeners.len();
    listeners.retain(|l| !same_listener(l, listener));
    listeners.len() != before
}

/// Removes every listener, returning how many were registered.
pub fn clear_listeners() -> usize {
    let mut listeners = LISTENERS.write();
    let count = listeners.len();
    listeners.clear();
    count
}

/// Number of registered listeners.
#[must_use]
pub fn listener_count() -> usize {
    LISTENERS.read().len()
}

/// Listener snapshots taken when a continuation was composed.
pub(crate) struct DispatchContext {
    captured: SmallVec<[(Arc<dyn CompositionListener>, Captured); 2]>,
}

impl DispatchContext {
    /// Captures every registered listener on the current thread.
    pub(crate) fn capture() -> Self {
        let listeners = LISTENERS.read().clone();
        Self::capture_from(&listeners)
    }

    pub(crate) fn capture_from(listeners: &[Arc<dyn CompositionListener>]) -> Self {
        let mut captured = SmallVec::new();
        for listener in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener.capture())) {
                Ok(value) => captured.push((Arc::clone(listener), value)),
                Err(panic) => report_listener_failure(
                    listener.name(),
                    ListenerPhase::Capture,
                    &Failure::panicked(panic),
                ),
            }
        }
        Self { captured }
    }

    /// Runs `f` wrapped in every listener's enter/exit pair.
    pub(crate) fn run<R>(self, f: impl FnOnce() -> R) -> R {
        if self.captured.is_empty() {
            return f();
        }
        let mut guard = ExitGuard {
            entered: SmallVec::new(),
        };
        for (listener, captured) in &self.captured {
            let entered = match catch_unwind(AssertUnwindSafe(|| listener.enter(captured))) {
                Ok(result) => result,
                Err(panic) => Err(Failure::panicked(panic)),
            };
            match entered {
                Ok(restore) => guard.entered.push((Arc::clone(listener), restore)),
                Err(failure) => {
                    report_listener_failure(listener.name(), ListenerPhase::Enter, &failure);
                }
            }
        }
        f()
    }
}

/// Runs exits in reverse order, also when the continuation unwinds.
struct ExitGuard {
    entered: SmallVec<[(Arc<dyn CompositionListener>, Restore); 2]>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        while let Some((listener, restore)) = self.entered.pop() {
            let exited = match catch_unwind(AssertUnwindSafe(|| listener.exit(restore))) {
                Ok(result) => result,
                Err(panic) => Err(Failure::panicked(panic)),
            };
            if let Err(failure) = exited {
                report_listener_failure(listener.name(), ListenerPhase::Exit, &failure);
            }
        }
    }
}
