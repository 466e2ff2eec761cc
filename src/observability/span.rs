//! Span propagation across continuation dispatch.

use super::listener::{Captured, CompositionListener, Restore};
use crate::types::Failure;
use tracing::Span;

/// Listener that carries the composing thread's current `tracing` span into
/// each continuation.
///
/// Events logged inside a `map` closure therefore nest under the span that
/// was active when `map` was called, regardless of which executor thread
/// runs it.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSpanListener;

impl CompositionListener for TracingSpanListener {
    fn name(&self) -> &str {
        "tracing-span"
    }

    fn capture(&self) -> Captured {
        Box::new(Span::current())
    }

    fn enter(&self, captured: &Captured) -> Result<Restore, Failure> {
        let span = captured
            .downcast_ref::<Span>()
            .cloned()
            .ok_or_else(|| Failure::msg("captured value is not a span"))?;
        Ok(Box::new(span.entered()))
    }
}
