//! Rejection reasons.
//!
//! A rejected promise stores a [`Failure`]: a cloneable, type-erased
//! `std::error::Error`. Every consumer of the promise observes the same
//! failure, so it is shared behind an `Arc` rather than moved.
//!
//! Any error type converts into a `Failure` with `?`, which is why `Failure`
//! itself does not implement `std::error::Error` (the blanket `From` would
//! otherwise overlap with the reflexive one).

use super::cancel::{CancelReason, Cancelled};
use core::fmt;
use std::any::Any;
use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

/// Values a promise can carry.
///
/// Every registered callback and every waiter receives its own copy of the
/// terminal value, hence `Clone`.
pub trait PromiseValue: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> PromiseValue for T {}

/// The failure reason of a rejected promise.
#[derive(Clone)]
pub struct Failure {
    inner: Arc<dyn StdError + Send + Sync + 'static>,
}

impl Failure {
    /// Wraps an error.
    #[must_use]
    pub fn new<E: StdError + Send + Sync + 'static>(error: E) -> Self {
        Self {
            inner: Arc::new(error),
        }
    }

    /// Wraps an already boxed error.
    #[must_use]
    pub fn from_boxed(error: Box<dyn StdError + Send + Sync + 'static>) -> Self {
        Self {
            inner: Arc::from(error),
        }
    }

    /// Creates a failure carrying only a message.
    #[must_use]
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(Message(message.into()))
    }

    /// Creates the cancellation marker for a reason.
    #[must_use]
    pub fn cancelled(reason: CancelReason) -> Self {
        Self::new(Cancelled::new(reason))
    }

    /// Creates a failure from a caught panic.
    #[must_use]
    pub fn panicked(payload: Box<dyn Any + Send>) -> Self {
        Self::new(PanicPayload::from_panic(payload.as_ref()))
    }

    /// Returns true if this is the cancellation marker.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        self.inner.is::<Cancelled>()
    }

    /// Returns the cancellation reason, if this is the cancellation marker.
    #[must_use]
    pub fn cancel_reason(&self) -> Option<&CancelReason> {
        self.inner.downcast_ref::<Cancelled>().map(|c| &c.reason)
    }

    /// Returns true if the reason itself has type `E`.
    #[must_use]
    pub fn is<E: StdError + 'static>(&self) -> bool {
        self.inner.is::<E>()
    }

    /// Downcasts the reason itself to `E`.
    #[must_use]
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }

    /// Finds the first `E` in the reason or its `source()` chain.
    #[must_use]
    pub fn find<E: StdError + 'static>(&self) -> Option<&E> {
        self.chain().find_map(|err| err.downcast_ref::<E>())
    }

    /// Returns true if the reason or anything it wraps has type `E`.
    #[must_use]
    pub fn matches<E: StdError + 'static>(&self) -> bool {
        self.find::<E>().is_some()
    }

    /// Iterates the reason followed by its `source()` chain.
    pub fn chain(&self) -> impl Iterator<Item = &(dyn StdError + 'static)> {
        let first: &(dyn StdError + 'static) = self.inner.as_ref();
        std::iter::successors(Some(first), |&err| err.source())
    }

    /// Borrows the underlying error.
    #[must_use]
    pub fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.inner.as_ref()
    }

    /// Returns true if both failures share the same underlying error.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<E> From<E> for Failure
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl AsRef<dyn StdError + Send + Sync + 'static> for Failure {
    fn as_ref(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.inner.as_ref()
    }
}

/// A failure carrying only a message, created by [`Failure::msg`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct Message(pub String);

/// Payload from a caught panic.
///
/// This wraps the panic value for safe transport across threads.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("panic: {message}")]
pub struct PanicPayload {
    message: String,
}

impl PanicPayload {
    /// Creates a new panic payload with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Extracts the message from a value caught by `catch_unwind`.
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        if let Some(s) = payload.downcast_ref::<&'static str>() {
            Self::new(*s)
        } else if let Some(s) = payload.downcast_ref::<String>() {
            Self::new(s.clone())
        } else {
            Self::new("non-string panic payload")
        }
    }

    /// Returns the panic message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Rejection reason of a promise derived with `or_timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("timed out after {after:?}")]
pub struct TimeoutError {
    /// The configured timeout.
    pub after: Duration,
}

/// Outcome of a bounded blocking wait that did not yield a value.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WaitError {
    /// The promise is rejected with this reason.
    #[error("{0}")]
    Rejected(Failure),
    /// The wait elapsed; the promise is still pending.
    #[error("wait timed out after {0:?}")]
    TimedOut(Duration),
}

impl WaitError {
    /// Returns true if the wait elapsed without an outcome.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut(_))
    }

    /// Returns the rejection reason, if the promise was rejected.
    #[must_use]
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Rejected(f) => Some(f),
            Self::TimedOut(_) => None,
        }
    }
}

/// Every input of a combinator failed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{} of {} inputs failed", .failures.len(), .total)]
pub struct AggregateFailure {
    /// Failures in input order.
    pub failures: Vec<Failure>,
    /// Number of inputs.
    pub total: usize,
}
