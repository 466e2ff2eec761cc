//! Quorum combinator: M-of-N successes.
//!
//! # Semantics
//!
//! [`at_least_resolved`] resolves with a vector of `Option<V>` in input
//! order once `min` inputs have resolved. Slots for inputs that had not
//! resolved at that moment are `None`. When so many inputs reject that
//! `min` is no longer reachable, it rejects with an [`AggregateFailure`]
//! of the failures seen so far, in input order.
//!
//! Critical invariant: the result is delivered exactly once. The snapshot
//! of values is taken under the same lock that records arrivals, so a value
//! arriving after the quorum is reached never appears in the result.

use super::{notify_item, CombinatorState, ItemCallback};
use crate::error::{Error, ErrorKind, Result};
use crate::promise::{Deferred, Promise};
use crate::types::{AggregateFailure, Failure, PromiseValue};
use parking_lot::Mutex;
use std::sync::Arc;

struct Tally<V> {
    values: Vec<Option<V>>,
    failures: Vec<Option<Failure>>,
    resolved: usize,
    rejected: usize,
}

/// Resolves once `min` inputs have resolved.
///
/// `min == 0` resolves immediately with all slots empty.
///
/// # Errors
///
/// Returns [`ErrorKind::InvalidSetting`] when `min` exceeds the number of
/// inputs.
pub fn at_least_resolved<V, I>(
    min: usize,
    promises: I,
    on_item: Option<ItemCallback<V>>,
) -> Result<Promise<Vec<Option<V>>>>
where
    V: PromiseValue,
    I: IntoIterator<Item = Promise<V>>,
{
    let promises: Vec<Promise<V>> = promises.into_iter().collect();
    let total = promises.len();
    if min > total {
        return Err(Error::new(ErrorKind::InvalidSetting).with_message(format!(
            "quorum of {min} cannot be met by {total} inputs"
        )));
    }
    if min == 0 {
        return Ok(Promise::resolved(vec![None; total]));
    }

    let (deferred, result) = Deferred::pair();
    let state = Arc::new(CombinatorState::new(total));
    let tally = Arc::new(Mutex::new(Tally {
        values: vec![None; total],
        failures: vec![None; total],
        resolved: 0,
        rejected: 0,
    }));

    for (index, promise) in promises.iter().enumerate() {
        let state = Arc::clone(&state);
        let deferred: Deferred<Vec<Option<V>>> = deferred.clone();
        let tally = Arc::clone(&tally);
        let on_item = on_item.clone();
        promise.on_complete(move |outcome| {
            notify_item(on_item.as_ref(), index, outcome);
            let mut tally = tally.lock();
            if state.is_claimed() {
                return;
            }
            match outcome {
                Ok(value) => {
                    tally.values[index] = Some(value.clone());
                    tally.resolved += 1;
                    if tally.resolved >= min && state.claim() {
                        let values = tally.values.clone();
                        drop(tally);
                        deferred.resolve(values);
                    }
                }
                Err(failure) => {
                    tally.failures[index] = Some(failure.clone());
                    tally.rejected += 1;
                    if total - tally.rejected < min && state.claim() {
                        let failures = tally.failures.iter().flatten().cloned().collect();
                        drop(tally);
                        deferred.reject(AggregateFailure { failures, total });
                    }
                }
            }
        });
    }
    Ok(result)
}
