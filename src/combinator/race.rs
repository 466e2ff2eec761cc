//! Race combinators: the first input to settle wins.
//!
//! # Semantics
//!
//! ```text
//! race_any_completed([a, b, c]) = outcome of whichever finishes first
//! race_any_resolved([a, b, c])  = value of the first to resolve,
//!                                 or AggregateFailure once all reject
//! ```
//!
//! Losers are left running. An empty `race_any_completed` never completes;
//! an empty `race_any_resolved` rejects with an empty aggregate.

use super::{notify_item, CombinatorState};
use crate::combinator::ItemCallback;
use crate::promise::{Deferred, Promise};
use crate::types::{AggregateFailure, Failure, PromiseValue};
use parking_lot::Mutex;
use std::sync::Arc;

/// Completes with the outcome of the first input to complete.
pub fn race_any_completed<V, I>(promises: I) -> Promise<V>
where
    V: PromiseValue,
    I: IntoIterator<Item = Promise<V>>,
{
    let (deferred, result) = Deferred::pair();
    let state = Arc::new(CombinatorState::new(0));
    for promise in promises {
        let deferred = deferred.clone();
        let state = Arc::clone(&state);
        promise.on_complete(move |outcome| {
            if state.claim() {
                deferred.complete(outcome.clone());
            }
        });
    }
    result
}

/// Resolves with the first value; rejects once every input has rejected.
///
/// The aggregate lists failures in input order, not arrival order.
pub fn race_any_resolved<V, I>(promises: I, on_item: Option<ItemCallback<V>>) -> Promise<V>
where
    V: PromiseValue,
    I: IntoIterator<Item = Promise<V>>,
{
    let promises: Vec<Promise<V>> = promises.into_iter().collect();
    let total = promises.len();
    let (deferred, result) = Deferred::pair();
    let state = Arc::new(CombinatorState::new(total));
    let failures: Arc<Mutex<Vec<Option<Failure>>>> = Arc::new(Mutex::new(vec![None; total]));

    let reject_all = {
        let deferred = deferred.clone();
        let failures = Arc::clone(&failures);
        Arc::new(move || {
            let failures = failures.lock().drain(..).flatten().collect();
            deferred.reject(AggregateFailure { failures, total });
        })
    };

    for (index, promise) in promises.iter().enumerate() {
        let state = Arc::clone(&state);
        let deferred = deferred.clone();
        let failures = Arc::clone(&failures);
        let reject_all = Arc::clone(&reject_all);
        let on_item = on_item.clone();
        promise.on_complete(move |outcome| {
            notify_item(on_item.as_ref(), index, outcome);
            match outcome {
                Ok(value) => {
                    if state.claim() {
                        deferred.resolve(value.clone());
                    }
                }
                Err(failure) => {
                    if let Some(slot) = failures.lock().get_mut(index) {
                        *slot = Some(failure.clone());
                    }
                }
            }
            if state.arrive() && state.claim() {
                reject_all();
            }
        });
    }
    if state.arrive() && state.claim() {
        reject_all();
    }
    result
}
