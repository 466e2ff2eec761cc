//! Bulk combinators over many promises.
//!
//! - [`join`]: wait for every input ([`join_all_completed`], [`join_all_resolved`],
//!   [`join_all_values`])
//! - [`race`]: first input wins ([`race_any_completed`], [`race_any_resolved`])
//! - [`quorum`]: M-of-N successes ([`at_least_resolved`])
//!
//! # Counting
//!
//! Every call shares one [`CombinatorState`] between the callbacks it
//! registers. The countdown starts at `1 + inputs`: the extra unit is
//! released only after every callback has been registered, so inputs that
//! are already terminal cannot finish the combinator while the input list
//! is still being walked.
//!
//! Inputs are never cancelled by a combinator. Unfinished siblings keep
//! running after the combined promise is delivered.

pub mod join;
pub mod quorum;
pub mod race;

pub use join::{join_all_completed, join_all_resolved, join_all_values, ItemCallback};
pub use quorum::at_least_resolved;
pub use race::{race_any_completed, race_any_resolved};

use crate::observability::diagnostics::report_callback_panic;
use crate::types::{Failure, PanicPayload};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Countdown and delivery guard shared by one combinator call.
#[derive(Debug)]
pub(crate) struct CombinatorState {
    remaining: AtomicUsize,
    done: AtomicBool,
}

impl CombinatorState {
    /// State for `inputs` inputs plus the registration unit.
    pub(crate) fn new(inputs: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(inputs + 1),
            done: AtomicBool::new(false),
        }
    }

    /// Counts one arrival. Returns true for the arrival that reaches zero.
    pub(crate) fn arrive(&self) -> bool {
        self.remaining.fetch_sub(1, Ordering::AcqRel) == 1
    }

    /// Claims delivery. Returns true exactly once.
    pub(crate) fn claim(&self) -> bool {
        !self.done.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn is_claimed(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

/// Runs a per-item callback, containing its panic.
pub(crate) fn notify_item<V>(
    callback: Option<&ItemCallback<V>>,
    index: usize,
    outcome: &Result<V, Failure>,
) {
    if let Some(callback) = callback {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(index, outcome))) {
            report_callback_panic(&PanicPayload::from_panic(panic.as_ref()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn countdown_includes_registration_unit() {
        let state = CombinatorState::new(2);
        assert!(!state.arrive());
        assert!(!state.arrive());
        assert!(state.arrive());
    }

    #[test]
    fn claim_is_exactly_once() {
        let state = CombinatorState::new(0);
        assert!(!state.is_claimed());
        assert!(state.claim());
        assert!(!state.claim());
        assert!(state.is_claimed());
    }
}
