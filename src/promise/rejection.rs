//! Typed rejection routing.
//!
//! A rejection carries one untyped [`Failure`]. A [`RejectionFilter`] decides
//! whether a handler bound to a category of failures should see it.
//! [`RejectionFilter::of`] matches on the reason's own type only; an
//! application error that wraps an `io::Error` is not an `io::Error`.
//! [`RejectionFilter::wrapping`] opts into searching the `source()` chain.

use crate::types::Failure;
use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

type Predicate = Arc<dyn Fn(&Failure) -> bool + Send + Sync>;

/// Selects which rejections a handler applies to.
#[derive(Clone)]
pub struct RejectionFilter {
    name: Cow<'static, str>,
    predicate: Predicate,
}

impl RejectionFilter {
    /// Matches failures whose reason is an `E`.
    #[must_use]
    pub fn of<E: StdError + 'static>() -> Self {
        Self {
            name: Cow::Borrowed(std::any::type_name::<E>()),
            predicate: Arc::new(Failure::is::<E>),
        }
    }

    /// Matches failures that are an `E` or carry one in their `source()` chain.
    #[must_use]
    pub fn wrapping<E: StdError + 'static>() -> Self {
        Self {
            name: Cow::Owned(format!("wrapping {}", std::any::type_name::<E>())),
            predicate: Arc::new(Failure::matches::<E>),
        }
    }

    /// Matches every failure.
    #[must_use]
    pub fn any() -> Self {
        Self {
            name: Cow::Borrowed("any"),
            predicate: Arc::new(|_| true),
        }
    }

    /// Matches only the cancellation marker.
    #[must_use]
    pub fn cancellation() -> Self {
        Self {
            name: Cow::Borrowed("cancellation"),
            predicate: Arc::new(Failure::is_cancellation),
        }
    }

    /// Matches failures accepted by `predicate`.
    pub fn when<F>(name: impl Into<Cow<'static, str>>, predicate: F) -> Self
    where
        F: Fn(&Failure) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Matches failures accepted by either filter.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        let name = format!("{} | {}", self.name, other.name);
        let (a, b) = (self.predicate, other.predicate);
        Self {
            name: Cow::Owned(name),
            predicate: Arc::new(move |f| a(f) || b(f)),
        }
    }

    /// Returns true if a handler behind this filter should run for `failure`.
    #[must_use]
    pub fn matches(&self, failure: &Failure) -> bool {
        (self.predicate)(failure)
    }

    /// Human-readable description.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for RejectionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RejectionFilter").field(&self.name).finish()
    }
}
