//! Diagnostic sink for failures the runtime swallows.
//!
//! Completion callbacks, listener hooks and executor resolution never fail
//! the operation that triggered them. Their failures are reported here
//! instead of being dropped. Without an installed sink, reports are logged
//! at `warn`.

use crate::error::Error;
use crate::tracing_compat::warn;
use crate::types::{Failure, PanicPayload};
use core::fmt;
use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

static SINK: RwLock<Option<Arc<dyn DiagnosticSink>>> = parking_lot::const_rwlock(None);

/// Which listener hook failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerPhase {
    /// Snapshot on the composing thread.
    Capture,
    /// Setup before the continuation runs.
    Enter,
    /// Teardown after the continuation ran.
    Exit,
}

impl fmt::Display for ListenerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Capture => write!(f, "capture"),
            Self::Enter => write!(f, "enter"),
            Self::Exit => write!(f, "exit"),
        }
    }
}

/// Receiver of swallowed failures.
pub trait DiagnosticSink: Send + Sync + 'static {
    /// A completion callback panicked while the registry was drained.
    fn callback_panicked(&self, payload: &PanicPayload);

    /// A composition listener hook failed or panicked.
    fn listener_failed(&self, listener: &str, phase: ListenerPhase, failure: &Failure);

    /// An executor setting could not be resolved and the default was used.
    fn executor_fallback(&self, role: &str, setting: &str, error: &Error) {
        TracingSink.executor_fallback(role, setting, error);
    }
}

/// Sink that logs every report through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn callback_panicked(&self, payload: &PanicPayload) {
        warn!(panic = %payload.message(), "completion callback panicked");
    }

    fn listener_failed(&self, listener: &str, phase: ListenerPhase, failure: &Failure) {
        warn!(
            listener = %listener,
            phase = %phase,
            error = %failure,
            "composition listener failed"
        );
    }

    fn executor_fallback(&self, role: &str, setting: &str, error: &Error) {
        warn!(
            role = %role,
            setting = %setting,
            error = %error,
            "executor setting not resolved, using default"
        );
    }
}

/// Installs a process-wide sink, returning the previous one.
pub fn set_sink(sink: Arc<dyn DiagnosticSink>) -> Option<Arc<dyn DiagnosticSink>> {
    SINK.write().replace(sink)
}

/// Removes the installed sink, restoring logging-only reports.
pub fn clear_sink() -> Option<Arc<dyn DiagnosticSink>> {
    SINK.write().take()
}

fn with_sink(report: impl FnOnce(&dyn DiagnosticSink)) {
    let installed = SINK.read().clone();
    // A panicking sink must not escape into the completing thread.
    let _ = catch_unwind(AssertUnwindSafe(|| match installed {
        Some(sink) => report(sink.as_ref()),
        None => report(&TracingSink),
    }));
}

pub(crate) fn report_callback_panic(payload: &PanicPayload) {
    with_sink(|sink| sink.callback_panicked(payload));
}

pub(crate) fn report_listener_failure(listener: &str, phase: ListenerPhase, failure: &Failure) {
    with_sink(|sink| sink.listener_failed(listener, phase, failure));
}

pub(crate) fn report_executor_fallback(role: &str, setting: &str, error: &Error) {
    with_sink(|sink| sink.executor_fallback(role, setting, error));
}
