//! Promises and their producer-side capability.
//!
//! A [`Promise`] is a single-assignment container that eventually holds
//! either a value or a [`Failure`]. It is created together with a
//! [`Deferred`], the only handle able to complete it:
//!
//! ```
//! use pledge::promise::deferred;
//!
//! let (producer, promise) = deferred::<u32>();
//! std::thread::spawn(move || {
//!     producer.resolve(42);
//! });
//! assert_eq!(promise.wait().unwrap(), 42);
//! ```
//!
//! # State machine
//!
//! ```text
//! PENDING ──resolve──▶ RESOLVED
//!    │
//!    ├─────reject────▶ REJECTED
//!    │
//!    └─────cancel────▶ REJECTED (cancellation marker)
//! ```
//!
//! Exactly one transition wins; every later attempt returns `false` and
//! changes nothing. Callbacks registered before or after completion observe
//! the same terminal pair exactly once.

pub mod compose;
pub mod future;
pub mod rejection;
mod slot;
pub mod timeout;

use self::slot::{CancelHook, Core};
use crate::cancel::{run_interruptible, Interrupt};
use crate::runtime::{self, ExecutorRef};
use crate::tracing_compat::trace;
use crate::types::{CancelReason, Failure, PromiseValue, State, WaitError};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

pub use future::PromiseFuture;
pub use rejection::RejectionFilter;

/// Read side of a single-assignment result. Cheap to clone; clones observe
/// the same state.
pub struct Promise<V> {
    pub(crate) core: Arc<Core<V>>,
}

impl<V> Clone for Promise<V> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<V: PromiseValue + fmt::Debug> fmt::Debug for Promise<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Promise");
        d.field("state", &self.core.state());
        if let Some(outcome) = self.core.outcome() {
            d.field("outcome", outcome);
        }
        d.finish()
    }
}

impl<V: PromiseValue> Promise<V> {
    /// A promise already resolved with `value`.
    #[must_use]
    pub fn resolved(value: V) -> Self {
        Self::from_outcome(Ok(value))
    }

    /// A promise already rejected with `failure`.
    #[must_use]
    pub fn rejected(failure: impl Into<Failure>) -> Self {
        Self::from_outcome(Err(failure.into()))
    }

    /// A promise already cancelled.
    #[must_use]
    pub fn cancelled() -> Self {
        Self::from_outcome(Err(Failure::cancelled(CancelReason::requested(false))))
    }

    pub(crate) fn from_outcome(outcome: Result<V, Failure>) -> Self {
        Self {
            core: Arc::new(Core::with_outcome(outcome)),
        }
    }

    /// Runs `work` on the default-role executor and resolves with its result.
    ///
    /// The work can observe a forced [`cancel`](Self::cancel) through
    /// [`cancel::checkpoint`](crate::cancel::checkpoint) and
    /// [`cancel::sleep`](crate::cancel::sleep).
    pub fn spawn<F>(work: F) -> Self
    where
        F: FnOnce() -> Result<V, Failure> + Send + 'static,
    {
        Self::spawn_on(&runtime::current().default_executor(), work)
    }

    /// [`spawn`](Self::spawn) on an explicit executor.
    pub fn spawn_on<F>(executor: &ExecutorRef, work: F) -> Self
    where
        F: FnOnce() -> Result<V, Failure> + Send + 'static,
    {
        let core = Arc::new(Core::new());
        let target = Arc::clone(&core);
        let submitted = executor.submit(Box::new(move || {
            let token = Interrupt::new();
            if !target.set_hook(CancelHook::Interrupt(Arc::clone(&token))) {
                trace!("producer work skipped, promise already done");
                return;
            }
            let result = run_interruptible(&token, || catch_unwind(AssertUnwindSafe(work)));
            target.complete(result.unwrap_or_else(|panic| Err(Failure::panicked(panic))));
        }));
        if let Err(err) = submitted {
            core.complete(Err(Failure::from(err)));
        }
        Self { core }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> State {
        self.core.state()
    }

    /// Returns true once resolved or rejected.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.core.is_done()
    }

    /// Returns true if rejected with the cancellation marker.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.core.is_cancelled()
    }

    /// Blocks until terminal and returns the outcome.
    pub fn wait(&self) -> Result<V, Failure> {
        self.core.wait()
    }

    /// Blocks up to `timeout`. Elapsing returns [`WaitError::TimedOut`] and
    /// leaves the promise pending.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<V, WaitError> {
        match self.core.wait_timeout(timeout) {
            Some(Ok(value)) => Ok(value),
            Some(Err(failure)) => Err(WaitError::Rejected(failure)),
            None => Err(WaitError::TimedOut(timeout)),
        }
    }

    /// The value if resolved; `default` while pending or when rejected.
    #[must_use]
    pub fn peek(&self, default: V) -> V {
        match self.core.outcome() {
            Some(Ok(value)) => value.clone(),
            _ => default,
        }
    }

    /// The outcome if terminal, without blocking.
    #[must_use]
    pub fn try_result(&self) -> Option<Result<V, Failure>> {
        self.core.outcome().cloned()
    }

    /// Registers `callback` for the terminal pair.
    ///
    /// While pending, the callback runs on the completing thread; once
    /// terminal, it runs immediately on the calling thread. A panicking
    /// callback is reported to the diagnostic sink and affects nothing else.
    pub fn on_complete<F>(&self, callback: F)
    where
        F: FnOnce(&Result<V, Failure>) + Send + 'static,
    {
        self.core.register(Box::new(callback));
    }

    /// Cancels the promise if still pending.
    ///
    /// With `force`, work currently executing on the promise's behalf is
    /// interrupted if it runs on another thread. A promise forwarding to a
    /// dependent promise cancels that one too. Returns false if already
    /// terminal.
    pub fn cancel(&self, force: bool) -> bool {
        self.core.cancel(force)
    }
}

/// Write side of a promise.
///
/// The first `resolve` or `reject` wins. Dropping every `Deferred` without
/// completing leaves the promise pending forever.
pub struct Deferred<V> {
    pub(crate) core: Arc<Core<V>>,
}

impl<V> Clone for Deferred<V> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<V: PromiseValue> fmt::Debug for Deferred<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("state", &self.core.state())
            .finish()
    }
}

impl<V: PromiseValue> Deferred<V> {
    /// Creates a pending promise and its write capability.
    #[must_use]
    pub fn pair() -> (Self, Promise<V>) {
        let core = Arc::new(Core::new());
        (
            Self {
                core: Arc::clone(&core),
            },
            Promise { core },
        )
    }

    /// Resolves with `value`. Returns true only for the winning completion.
    pub fn resolve(&self, value: V) -> bool {
        self.core.complete(Ok(value))
    }

    /// Rejects with `failure`. Returns true only for the winning completion.
    pub fn reject(&self, failure: impl Into<Failure>) -> bool {
        self.core.complete(Err(failure.into()))
    }

    /// Completes with an outcome. Returns true only for the winning completion.
    pub fn complete(&self, outcome: Result<V, Failure>) -> bool {
        self.core.complete(outcome)
    }

    /// A read handle for the promise.
    #[must_use]
    pub fn promise(&self) -> Promise<V> {
        Promise {
            core: Arc::clone(&self.core),
        }
    }

    /// Returns true once the promise is terminal.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.core.is_done()
    }

    /// Returns true if a consumer cancelled the promise.
    ///
    /// Producers can poll this to stop work nobody is waiting for.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.core.is_cancelled()
    }
}

/// Creates a pending promise and its write capability.
#[must_use]
pub fn deferred<V: PromiseValue>() -> (Deferred<V>, Promise<V>) {
    Deferred::pair()
}
