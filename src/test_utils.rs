//! Test utilities for pledge.
//!
//! - Consistent tracing-based logging initialization
//! - A process-wide lock for tests that touch global state
//! - Polling for conditions reached on other threads
//!
//! The listener set, the adapter registry, the diagnostic sink, the installed
//! [`Scheduling`](crate::runtime::Scheduling) and `PLEDGE_*` environment
//! variables are all process-wide. Tests that mutate any of them hold
//! [`global_lock`] for their whole body.

use parking_lot::{Mutex, MutexGuard};
use std::sync::Once;
use std::time::{Duration, Instant};
use tracing_subscriber::fmt::format::FmtSpan;

static INIT_LOGGING: Once = Once::new();
static GLOBAL_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// Initialize test logging with trace-level output.
///
/// Safe to call multiple times; only initializes once.
pub(crate) fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

/// Serializes tests that mutate process-wide state.
pub(crate) fn global_lock() -> MutexGuard<'static, ()> {
    GLOBAL_LOCK.lock()
}

/// Polls `condition` until it holds or `timeout` elapses.
pub(crate) fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
