//! Join combinators: wait for every input.
//!
//! # Semantics
//!
//! - [`join_all_completed`] resolves once every input is terminal,
//!   whatever the outcomes.
//! - [`join_all_resolved`] additionally requires every input to resolve. The
//!   first observed failure rejects the result right away; later failures
//!   are ignored and unfinished inputs keep running.
//! - [`join_all_values`] is `join_all_resolved` that also collects the
//!   values in input order.
//!
//! An empty input resolves immediately.

use super::{notify_item, CombinatorState};
use crate::error::Error;
use crate::promise::{Deferred, Promise};
use crate::types::{Failure, PromiseValue};
use parking_lot::Mutex;
use std::sync::Arc;

/// Invoked with each input's index and outcome as it completes.
pub type ItemCallback<V> = Arc<dyn Fn(usize, &Result<V, Failure>) + Send + Sync>;

/// Resolves once every input is terminal.
pub fn join_all_completed<V, I>(promises: I, on_item: Option<ItemCallback<V>>) -> Promise<()>
where
    V: PromiseValue,
    I: IntoIterator<Item = Promise<V>>,
{
    join_all(promises, on_item, false)
}

/// Resolves once every input resolves; rejects with the first failure.
pub fn join_all_resolved<V, I>(promises: I, on_item: Option<ItemCallback<V>>) -> Promise<()>
where
    V: PromiseValue,
    I: IntoIterator<Item = Promise<V>>,
{
    join_all(promises, on_item, true)
}

fn join_all<V, I>(promises: I, on_item: Option<ItemCallback<V>>, fail_fast: bool) -> Promise<()>
where
    V: PromiseValue,
    I: IntoIterator<Item = Promise<V>>,
{
    let promises: Vec<Promise<V>> = promises.into_iter().collect();
    let (deferred, result) = Deferred::pair();
    let state = Arc::new(CombinatorState::new(promises.len()));
    for (index, promise) in promises.iter().enumerate() {
        let state = Arc::clone(&state);
        let deferred = deferred.clone();
        let on_item = on_item.clone();
        promise.on_complete(move |outcome| {
            notify_item(on_item.as_ref(), index, outcome);
            if fail_fast {
                if let Err(failure) = outcome {
                    if state.claim() {
                        deferred.reject(failure.clone());
                    }
                }
            }
            if state.arrive() && state.claim() {
                deferred.resolve(());
            }
        });
    }
    if state.arrive() && state.claim() {
        deferred.resolve(());
    }
    result
}

/// Resolves with every value in input order; rejects with the first failure.
pub fn join_all_values<V, I>(promises: I) -> Promise<Vec<V>>
where
    V: PromiseValue,
    I: IntoIterator<Item = Promise<V>>,
{
    let promises: Vec<Promise<V>> = promises.into_iter().collect();
    let (deferred, result) = Deferred::pair();
    let state = Arc::new(CombinatorState::new(promises.len()));
    let slots: Arc<Mutex<Vec<Option<V>>>> = Arc::new(Mutex::new(vec![None; promises.len()]));

    let finish = {
        let deferred = deferred.clone();
        let slots = Arc::clone(&slots);
        move || {
            let values: Option<Vec<V>> = slots.lock().drain(..).collect();
            match values {
                Some(values) => deferred.resolve(values),
                None => deferred.reject(Error::internal("join finished with an empty slot")),
            };
        }
    };
    let finish = Arc::new(finish);

    for (index, promise) in promises.iter().enumerate() {
        let state = Arc::clone(&state);
        let deferred = deferred.clone();
        let slots = Arc::clone(&slots);
        let finish = Arc::clone(&finish);
        promise.on_complete(move |outcome| {
            match outcome {
                Ok(value) => {
                    if let Some(slot) = slots.lock().get_mut(index) {
                        *slot = Some(value.clone());
                    }
                }
                Err(failure) => {
                    if state.claim() {
                        deferred.reject(failure.clone());
                    }
                }
            }
            if state.arrive() && state.claim() {
                finish();
            }
        });
    }
    if state.arrive() && state.claim() {
        finish();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::promise::deferred;
    use crate::types::State;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn empty_input_resolves_immediately() {
        assert_eq!(join_all_completed(Vec::<Promise<u8>>::new(), None).state(), State::Resolved);
        assert_eq!(join_all_resolved(Vec::<Promise<u8>>::new(), None).state(), State::Resolved);
        assert!(join_all_values(Vec::<Promise<u8>>::new()).wait().unwrap().is_empty());
    }

    #[test]
    fn completed_waits_for_every_outcome() {
        let (a, pa) = deferred::<u8>();
        let (b, pb) = deferred::<u8>();
        let joined = join_all_completed(vec![pa, pb], None);
        b.reject(Failure::msg("b failed"));
        assert_eq!(joined.state(), State::Pending);
        a.resolve(1);
        assert_eq!(joined.state(), State::Resolved);
    }

    #[test]
    fn resolved_rejects_with_first_failure_only() {
        let (a, pa) = deferred::<u8>();
        let (b, pb) = deferred::<u8>();
        let (c, pc) = deferred::<u8>();
        let joined = join_all_resolved(vec![pa, pb, pc], None);
        let first = Failure::msg("first");
        b.reject(first.clone());
        assert!(joined.wait().unwrap_err().ptr_eq(&first));
        c.reject(Failure::msg("second"));
        a.resolve(1);
        assert!(joined.wait().unwrap_err().ptr_eq(&first));
    }

    #[test]
    fn item_callback_sees_every_input_and_may_panic() {
        let _guard = crate::test_utils::global_lock();
        let seen = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&seen);
        let callback: ItemCallback<u8> = Arc::new(move |index: usize, _outcome: &Result<u8, Failure>| {
            s.fetch_add(1, Ordering::SeqCst);
            if index == 0 {
                panic!("item callback failed");
            }
        });
        let joined = join_all_completed(
            vec![Promise::resolved(1), Promise::rejected(Failure::msg("x")), Promise::resolved(3)],
            Some(callback),
        );
        assert_eq!(joined.state(), State::Resolved);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn values_are_in_input_order() {
        let (a, pa) = deferred::<&'static str>();
        let (b, pb) = deferred::<&'static str>();
        let joined = join_all_values(vec![pa, pb]);
        b.resolve("b");
        a.resolve("a");
        assert_eq!(joined.wait().unwrap(), vec!["a", "b"]);
    }
}
