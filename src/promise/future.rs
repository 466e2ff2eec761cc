//! `std::future::Future` bridge.

use super::Promise;
use crate::types::{Failure, PromiseValue};
use parking_lot::Mutex;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

/// Future resolving to a promise's terminal pair.
///
/// Created by `.await`ing a [`Promise`] or calling `into_future()`. Any
/// async executor can drive it; the completing thread wakes the task.
#[must_use = "futures do nothing unless polled"]
pub struct PromiseFuture<V> {
    promise: Promise<V>,
    waker: Arc<Mutex<Option<Waker>>>,
    registered: bool,
}

impl<V: PromiseValue> Future for PromiseFuture<V> {
    type Output = Result<V, Failure>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(outcome) = this.promise.try_result() {
            return Poll::Ready(outcome);
        }
        {
            let mut slot = this.waker.lock();
            match slot.as_ref() {
                Some(existing) if existing.will_wake(cx.waker()) => {}
                _ => *slot = Some(cx.waker().clone()),
            }
        }
        if !this.registered {
            this.registered = true;
            let slot = Arc::clone(&this.waker);
            this.promise.on_complete(move |_| {
                if let Some(waker) = slot.lock().take() {
                    waker.wake();
                }
            });
        }
        // The promise may have completed before the waker was stored.
        match this.promise.try_result() {
            Some(outcome) => Poll::Ready(outcome),
            None => Poll::Pending,
        }
    }
}

impl<V: PromiseValue> IntoFuture for Promise<V> {
    type Output = Result<V, Failure>;
    type IntoFuture = PromiseFuture<V>;

    fn into_future(self) -> Self::IntoFuture {
        PromiseFuture {
            promise: self,
            waker: Arc::new(Mutex::new(None)),
            registered: false,
        }
    }
}
