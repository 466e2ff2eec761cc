//! Core types for the promise runtime.
//!
//! - [`State`]: the three observable promise states
//! - [`Failure`]: type-erased, shareable rejection reason
//! - [`Cancelled`], [`CancelReason`], [`CancelKind`]: the cancellation marker
//! - [`PanicPayload`], [`TimeoutError`], [`WaitError`], [`AggregateFailure`]:
//!   reasons produced by the runtime itself

pub mod cancel;
pub mod failure;
pub mod state;

pub use cancel::{CancelKind, CancelReason, Cancelled};
pub use failure::{
    AggregateFailure, Failure, Message, PanicPayload, PromiseValue, TimeoutError, WaitError,
};
pub use state::State;
