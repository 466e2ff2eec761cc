//! Deadline-bounded derived promises.

use super::slot::Core;
use super::Promise;
use crate::runtime::{self, Timer};
use crate::types::{Failure, PromiseValue, TimeoutError};
use std::sync::Arc;
use std::time::Duration;

impl<V: PromiseValue> Promise<V> {
    /// Returns a promise that mirrors `self`, or rejects with
    /// [`TimeoutError`] if `self` is still pending after `after`.
    ///
    /// `self` is never cancelled by the timeout.
    pub fn or_timeout(&self, after: Duration) -> Promise<V> {
        self.or_timeout_with(runtime::current().timer(), after)
    }

    /// [`or_timeout`](Self::or_timeout) on an explicit timer.
    pub fn or_timeout_with(&self, timer: &Timer, after: Duration) -> Promise<V> {
        self.bounded(timer, after, move || Err(Failure::new(TimeoutError { after })))
    }

    /// Returns a promise that mirrors `self`, or resolves with `value` if
    /// `self` is still pending after `after`.
    pub fn complete_on_timeout(&self, value: V, after: Duration) -> Promise<V> {
        self.complete_on_timeout_with(runtime::current().timer(), value, after)
    }

    /// [`complete_on_timeout`](Self::complete_on_timeout) on an explicit timer.
    pub fn complete_on_timeout_with(&self, timer: &Timer, value: V, after: Duration) -> Promise<V> {
        self.bounded(timer, after, move || Ok(value))
    }

    fn bounded(
        &self,
        timer: &Timer,
        after: Duration,
        on_expiry: impl FnOnce() -> Result<V, Failure> + Send + 'static,
    ) -> Promise<V> {
        if let Some(outcome) = self.core.outcome() {
            return Promise::from_outcome(outcome.clone());
        }
        let target = Arc::new(Core::new());
        let expiring = Arc::clone(&target);
        let handle = match timer.schedule(after, move || {
            expiring.complete(on_expiry());
        }) {
            Ok(handle) => Some(handle),
            Err(err) => {
                target.complete(Err(Failure::from(err)));
                None
            }
        };
        let mirrored = Arc::clone(&target);
        self.core.register(Box::new(move |outcome| {
            if let Some(handle) = handle {
                handle.cancel();
            }
            mirrored.complete(outcome.clone());
        }));
        Promise { core: target }
    }
}
