//! Pledge: single-assignment promises with composition, typed rejection
//! routing, cooperative cancellation and pluggable executors.
//!
//! # Overview
//!
//! A [`Promise`] eventually holds either a value or a [`Failure`]. Work is
//! attached to it through continuations (`map`, `and_then`, `rescue`, ...)
//! that run on an [`Executor`] chosen per role from the current
//! [`Scheduling`](runtime::Scheduling). Cancelling a derived promise reaches
//! back to the work currently producing it.
//!
//! # Core Guarantees
//!
//! - **Single assignment**: the first of resolve, reject or cancel wins; later attempts return `false`
//! - **Exactly-once delivery**: every callback sees the terminal pair once, whenever it registered
//! - **Panic containment**: panics in producers, transforms and callbacks never escape to the completing thread
//! - **Ambient context**: composition listeners carry per-thread state across executor hops
//!
//! # Module Structure
//!
//! - [`promise`]: `Promise`, `Deferred` and the composition engine
//! - [`types`]: failure, cancellation and state types
//! - [`cancel`]: cooperative interruption for running work
//! - [`runtime`]: executors, executor resolution, scheduling configuration, timer
//! - [`combinator`]: join, race and quorum over many promises
//! - [`observability`]: composition listeners and the diagnostic sink
//! - [`adapter`]: bridging foreign sources (threads, channels, futures)
//! - [`error`]: runtime error types
//!
//! # Example
//!
//! ```
//! use pledge::deferred;
//!
//! let (producer, promise) = deferred::<u32>();
//! let doubled = promise.map(|v| v * 2).rescue::<std::num::ParseIntError, _>(|_| 0);
//! producer.resolve(21);
//! assert_eq!(doubled.wait().unwrap(), 42);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::needless_pass_by_value)]

pub mod adapter;
pub mod cancel;
pub mod combinator;
pub mod error;
pub mod observability;
pub mod promise;
pub mod runtime;
pub mod tracing_compat;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;

pub use adapter::{adapt, BlockingSource, ForeignAdapter, FutureSource};
pub use combinator::{
    at_least_resolved, join_all_completed, join_all_resolved, join_all_values,
    race_any_completed, race_any_resolved,
};
pub use error::{Error, ErrorCategory, ErrorKind, Result, ResultExt};
pub use observability::{register_listener, CompositionListener, DiagnosticSink};
pub use promise::{deferred, Deferred, Promise, RejectionFilter};
pub use runtime::{Executor, ExecutorRef, Role, Scheduling, SchedulingConfig};
pub use types::{
    AggregateFailure, CancelKind, CancelReason, Cancelled, Failure, PromiseValue, State,
    TimeoutError, WaitError,
};
