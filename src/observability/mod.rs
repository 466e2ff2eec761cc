//! Composition observability.
//!
//! Two facilities live here:
//!
//! - **Listeners** ([`CompositionListener`]) wrap every continuation
//!   dispatch with capture/enter/exit hooks, which lets ambient per-thread
//!   state (log context, tracing spans, request ids) follow work across
//!   executor threads.
//! - **Diagnostics** ([`DiagnosticSink`]) receive failures the runtime
//!   swallows: panicking completion callbacks, failing listener hooks and
//!   executor settings that fell back to the default.
//!
//! # Example
//!
//! ```ignore
//! use pledge::observability::{register_listener, TracingSpanListener};
//! use std::sync::Arc;
//!
//! register_listener(Arc::new(TracingSpanListener))?;
//! let span = tracing::info_span!("request", id = 42);
//! let _entered = span.enter();
//! // Events inside the closure nest under `request`, on whatever thread runs it.
//! promise.map(|v| { tracing::info!("transforming"); v + 1 });
//! ```

pub mod diagnostics;
pub mod listener;
#[cfg(feature = "tracing-integration")]
pub mod span;

pub use diagnostics::{clear_sink, set_sink, DiagnosticSink, ListenerPhase, TracingSink};
pub use listener::{
    clear_listeners, listener_count, register_listener, unregister_listener, Captured,
    CompositionListener, Restore,
};
#[cfg(feature = "tracing-integration")]
pub use span::TracingSpanListener;
