//! Combinator scenarios with real delays.
//!
//! - join_all_resolved fails fast on the first rejection
//! - join_all_completed waits for every outcome
//! - race_any_resolved takes the fastest value; later arrivals are ignored
//! - at_least_resolved reports which inputs made the quorum

#[macro_use]
mod common;

use common::*;
use pledge::runtime::{ExecutorRef, NewThread};
use pledge::combinator::ItemCallback;
use pledge::types::AggregateFailure;
use pledge::{
    at_least_resolved, join_all_completed, join_all_resolved, join_all_values,
    race_any_completed, race_any_resolved, Failure, Promise, State,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn threads() -> ExecutorRef {
    Arc::new(NewThread::new("combinator-test"))
}

fn after(executor: &ExecutorRef, delay_ms: u64, value: &'static str) -> Promise<&'static str> {
    Promise::spawn_on(executor, move || {
        thread::sleep(Duration::from_millis(delay_ms));
        Ok(value)
    })
}

fn staggered(executor: &ExecutorRef) -> Vec<Promise<&'static str>> {
    vec![
        after(executor, 100, "A"),
        after(executor, 150, "B"),
        after(executor, 200, "C"),
        Promise::rejected(Failure::msg("X")),
    ]
}

#[test]
fn join_resolved_rejects_with_first_failure_immediately() {
    init_test_logging();
    test_phase!("join_resolved_rejects_with_first_failure_immediately");

    let executor = threads();
    let inputs = staggered(&executor);
    let started = Instant::now();
    let joined = join_all_resolved(inputs.clone(), None);
    let failure = joined.wait().unwrap_err();
    assert_eq!(failure.to_string(), "X");
    assert!(started.elapsed() < Duration::from_millis(100), "did not fail fast");
    assert!(inputs[..3].iter().any(|p| p.state() == State::Pending));

    test_complete!("join_resolved_rejects_with_first_failure_immediately");
}

#[test]
fn join_completed_waits_for_all_four() {
    init_test_logging();
    let executor = threads();
    let inputs = staggered(&executor);
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let callback: ItemCallback<&'static str> =
        Arc::new(move |_: usize, _: &Result<&'static str, Failure>| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    let joined = join_all_completed(inputs.clone(), Some(callback));
    joined.wait_timeout(Duration::from_secs(5)).unwrap();
    assert!(inputs.iter().all(Promise::is_done));
    assert_eq!(seen.load(Ordering::SeqCst), 4);
}

#[test]
fn join_values_keeps_input_order() {
    init_test_logging();
    let executor = threads();
    let inputs = vec![after(&executor, 60, "A"), after(&executor, 10, "B"), after(&executor, 30, "C")];
    let values = join_all_values(inputs).wait_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(values, vec!["A", "B", "C"]);
}

#[test]
fn race_takes_fast_value_and_ignores_slow() {
    init_test_logging();
    test_phase!("race_takes_fast_value_and_ignores_slow");

    let executor = threads();
    let slow = after(&executor, 100, "slow");
    let fast = after(&executor, 10, "fast");
    let raced = race_any_resolved(vec![slow.clone(), fast], None);
    assert_eq!(raced.wait_timeout(Duration::from_secs(5)).unwrap(), "fast");

    assert_eq!(slow.wait().unwrap(), "slow");
    assert_eq!(raced.wait().unwrap(), "fast");

    test_complete!("race_takes_fast_value_and_ignores_slow");
}

#[test]
fn race_of_failures_aggregates_in_input_order() {
    init_test_logging();
    let executor = threads();
    let late = Promise::<u8>::spawn_on(&executor, || {
        thread::sleep(Duration::from_millis(30));
        Err(Failure::msg("late"))
    });
    let early = Promise::<u8>::rejected(Failure::msg("early"));
    let failure = race_any_resolved(vec![late, early], None)
        .wait_timeout(Duration::from_secs(5))
        .unwrap_err();
    let failure = failure.failure().unwrap();
    let aggregate = failure.downcast_ref::<AggregateFailure>().unwrap();
    let messages: Vec<String> = aggregate.failures.iter().map(ToString::to_string).collect();
    assert_eq!(messages, vec!["late", "early"]);
}

#[test]
fn race_completed_accepts_a_fast_rejection() {
    init_test_logging();
    let executor = threads();
    let slow = after(&executor, 100, "slow");
    let failing = Promise::spawn_on(&executor, || {
        thread::sleep(Duration::from_millis(10));
        Err(Failure::msg("fast failure"))
    });
    let raced = race_any_completed(vec![slow, failing]);
    let failure = raced.wait_timeout(Duration::from_secs(5)).unwrap_err();
    assert_eq!(failure.failure().unwrap().to_string(), "fast failure");
}

#[test]
fn quorum_of_two_out_of_three() {
    init_test_logging();
    let executor = threads();
    let inputs = vec![after(&executor, 10, "A"), after(&executor, 300, "B"), after(&executor, 20, "C")];
    let result = at_least_resolved(2, inputs, None).unwrap();
    let slots = result.wait_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(slots, vec![Some("A"), None, Some("C")]);
}
