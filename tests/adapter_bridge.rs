//! Foreign sources bridged into promises.

#[macro_use]
mod common;

use common::*;
use pledge::adapter::{adapt, clear_adapters, register_adapter, ForeignAdapter, FutureSource};
use pledge::{Failure, Promise};
use std::any::Any;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

/// A promise-like handle from some other library.
struct LegacyHandle {
    value: u64,
}

impl pledge::BlockingSource<u64> for LegacyHandle {
    fn wait(self) -> Result<u64, Failure> {
        Ok(self.value)
    }
}

/// Converts `LegacyHandle` without going through a bridge thread.
struct LegacyAdapter;

impl ForeignAdapter for LegacyAdapter {
    fn adapt(&self, foreign: Box<dyn Any + Send>) -> Result<Box<dyn Any + Send>, Box<dyn Any + Send>> {
        let handle = foreign.downcast::<LegacyHandle>()?;
        let promise: Promise<u64> = Promise::resolved(handle.value * 2);
        Ok(Box::new(promise))
    }
}

#[test]
fn bridge_runs_on_a_dedicated_thread() {
    let _guard = global_lock();
    init_test_logging();
    test_phase!("bridge_runs_on_a_dedicated_thread");
    clear_adapters();

    let scheduling = small_scheduling("adapter-bridge");
    let previous = pledge::runtime::install(scheduling.clone());

    let (tx, rx) = mpsc::channel::<String>();
    let promise = adapt(rx);
    let name = thread::current().name().map(str::to_string);
    tx.send("relayed".to_string()).unwrap();
    assert_eq!(promise.wait_timeout(Duration::from_secs(5)).unwrap(), "relayed");
    let bridged_on = adapt(FutureSource(async { Ok::<_, Failure>(thread::current().name().map(str::to_string)) }))
        .wait_timeout(Duration::from_secs(5))
        .unwrap()
        .unwrap_or_default();
    assert!(bridged_on.starts_with("adapter-bridge-bridge-"), "ran on {bridged_on}");
    assert_ne!(Some(bridged_on), name);

    pledge::runtime::clear();
    if let Some(previous) = previous {
        pledge::runtime::install(previous);
    }
    scheduling.shutdown();
    test_complete!("bridge_runs_on_a_dedicated_thread");
}

#[test]
fn adapters_are_tried_before_the_bridge() {
    let _guard = global_lock();
    init_test_logging();
    clear_adapters();
    register_adapter(Arc::new(LegacyAdapter));

    assert_eq!(adapt(LegacyHandle { value: 21 }).wait().unwrap(), 42);
    let joined = adapt(thread::spawn(|| Ok::<_, Failure>(5u64)));
    assert_eq!(joined.wait_timeout(Duration::from_secs(5)).unwrap(), 5);

    assert_eq!(clear_adapters(), 1);
}
