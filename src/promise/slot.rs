//! Single-assignment completion state shared by a promise and its deferred.
//!
//! The terminal pair lives in a `OnceLock`, so reads after completion never
//! take the lock. Completion, callback registration, cancel-hook updates and
//! blocking waits all go through one critical section, which is what makes
//! "register while completing" race-free: a callback is either appended
//! before the winning completion drains the list, or it observes the
//! terminal pair and runs immediately.

use crate::cancel::Interrupt;
use crate::observability::diagnostics::report_callback_panic;
use crate::tracing_compat::trace;
use crate::types::{CancelKind, CancelReason, Failure, PanicPayload, PromiseValue, State};
use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// The terminal pair of a promise.
pub(crate) type Outcome<V> = Result<V, Failure>;

/// A completion callback, invoked exactly once with the terminal pair.
pub(crate) type Callback<V> = Box<dyn FnOnce(&Outcome<V>) + Send + 'static>;

/// Type-erased cancellation target for forwarding.
pub(crate) trait Cancellable: Send + Sync + 'static {
    fn cancel_with(&self, reason: CancelReason, force: bool) -> bool;
}

/// What a cancellation does besides completing the promise.
pub(crate) enum CancelHook {
    /// Nothing is running on behalf of the promise.
    Idle,
    /// Work is executing under this token; forced cancellation signals it.
    Interrupt(Arc<Interrupt>),
    /// Completion is driven by another promise; cancellation is forwarded.
    Forward(Arc<dyn Cancellable>),
}

impl CancelHook {
    fn apply(self, force: bool) {
        match self {
            Self::Idle => {}
            Self::Interrupt(token) => {
                if force {
                    trace!("signalling running work");
                    token.signal();
                }
            }
            Self::Forward(target) => {
                let kind = if force {
                    CancelKind::Forced
                } else {
                    CancelKind::Propagated
                };
                target.cancel_with(CancelReason::new(kind), force);
            }
        }
    }
}

struct Guarded<V> {
    callbacks: SmallVec<[Callback<V>; 2]>,
    hook: CancelHook,
    /// `Some(force)` once a cancellation won the completion race.
    cancel_request: Option<bool>,
}

pub(crate) struct Core<V> {
    outcome: OnceLock<Outcome<V>>,
    guarded: Mutex<Guarded<V>>,
    waiters: Condvar,
}

impl<V: PromiseValue> Core<V> {
    pub(crate) fn new() -> Self {
        Self {
            outcome: OnceLock::new(),
            guarded: Mutex::new(Guarded {
                callbacks: SmallVec::new(),
                hook: CancelHook::Idle,
                cancel_request: None,
            }),
            waiters: Condvar::new(),
        }
    }

    pub(crate) fn with_outcome(outcome: Outcome<V>) -> Self {
        let core = Self::new();
        let _ = core.outcome.set(outcome);
        core
    }

    pub(crate) fn outcome(&self) -> Option<&Outcome<V>> {
        self.outcome.get()
    }

    pub(crate) fn is_done(&self) -> bool {
        self.outcome.get().is_some()
    }

    pub(crate) fn state(&self) -> State {
        match self.outcome.get() {
            None => State::Pending,
            Some(Ok(_)) => State::Resolved,
            Some(Err(_)) => State::Rejected,
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        matches!(self.outcome.get(), Some(Err(f)) if f.is_cancellation())
    }

    /// Completes with `outcome` if still pending. Returns true for the winner.
    pub(crate) fn complete(&self, outcome: Outcome<V>) -> bool {
        self.finish(outcome, None)
    }

    fn finish(&self, outcome: Outcome<V>, cancel: Option<bool>) -> bool {
        let mut guarded = self.guarded.lock();
        if self.outcome.set(outcome).is_err() {
            return false;
        }
        guarded.cancel_request = cancel;
        let callbacks = std::mem::take(&mut guarded.callbacks);
        let hook = std::mem::replace(&mut guarded.hook, CancelHook::Idle);
        drop(guarded);
        self.waiters.notify_all();

        if let Some(force) = cancel {
            hook.apply(force);
        }
        if let Some(outcome) = self.outcome.get() {
            for callback in callbacks {
                invoke(callback, outcome);
            }
        }
        true
    }

    /// Registers a callback, or runs it now if already terminal.
    pub(crate) fn register(&self, callback: Callback<V>) {
        if let Some(outcome) = self.outcome.get() {
            invoke(callback, outcome);
            return;
        }
        let mut guarded = self.guarded.lock();
        match self.outcome.get() {
            Some(outcome) => {
                drop(guarded);
                invoke(callback, outcome);
            }
            None => guarded.callbacks.push(callback),
        }
    }

    /// Installs a cancel hook while pending.
    ///
    /// Returns false if the promise is already terminal; if it was cancelled,
    /// the hook is applied immediately so late-starting work still observes
    /// the cancellation.
    pub(crate) fn set_hook(&self, hook: CancelHook) -> bool {
        let mut guarded = self.guarded.lock();
        if self.outcome.get().is_none() {
            guarded.hook = hook;
            return true;
        }
        let request = guarded.cancel_request;
        drop(guarded);
        if let Some(force) = request {
            hook.apply(force);
        }
        false
    }

    pub(crate) fn cancel(&self, force: bool) -> bool {
        self.cancel_with(CancelReason::requested(force), force)
    }

    pub(crate) fn wait(&self) -> Outcome<V> {
        if let Some(outcome) = self.outcome.get() {
            return outcome.clone();
        }
        let mut guarded = self.guarded.lock();
        loop {
            if let Some(outcome) = self.outcome.get() {
                return outcome.clone();
            }
            self.waiters.wait(&mut guarded);
        }
    }

    pub(crate) fn wait_timeout(&self, timeout: Duration) -> Option<Outcome<V>> {
        if let Some(outcome) = self.outcome.get() {
            return Some(outcome.clone());
        }
        let deadline = Instant::now().checked_add(timeout);
        let mut guarded = self.guarded.lock();
        loop {
            if let Some(outcome) = self.outcome.get() {
                return Some(outcome.clone());
            }
            match deadline {
                Some(deadline) => {
                    if self.waiters.wait_until(&mut guarded, deadline).timed_out() {
                        return self.outcome.get().cloned();
                    }
                }
                None => self.waiters.wait(&mut guarded),
            }
        }
    }
}

impl<V: PromiseValue> Cancellable for Core<V> {
    fn cancel_with(&self, reason: CancelReason, force: bool) -> bool {
        self.finish(Err(Failure::cancelled(reason)), Some(force))
    }
}

fn invoke<V>(callback: Callback<V>, outcome: &Outcome<V>) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(outcome))) {
        report_callback_panic(&PanicPayload::from_panic(panic.as_ref()));
    }
}
