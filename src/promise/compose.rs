//! Composition engine.
//!
//! `compose_step(A, executor, step)` returns a promise B driven by A. When A
//! completes, a continuation is submitted to `executor`; it runs inside the
//! listener context captured when B was composed and applies `step` to A's
//! outcome. Failing to submit rejects B with the submission error.
//!
//! Cancelling B:
//!
//! - before the continuation runs suppresses it;
//! - while the step executes records the cancellation and, when forced,
//!   interrupts the executing thread;
//! - after a flat-map produced C forwards the cancellation to C.

use super::slot::{CancelHook, Core, Outcome};
use super::rejection::RejectionFilter;
use super::{Deferred, Promise};
use crate::cancel::{run_interruptible, Interrupt};
use crate::observability::listener::DispatchContext;
use crate::runtime::{self, ExecutorRef, Job};
use crate::tracing_compat::trace;
use crate::types::{Failure, PromiseValue};
use std::error::Error as StdError;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// What a step produces for the downstream promise.
pub(crate) enum Next<U> {
    /// Complete downstream with this value.
    Value(U),
    /// Complete downstream when this promise completes.
    Promise(Promise<U>),
}

type MapFn<V, U> = Box<dyn FnOnce(V) -> Result<U, Failure> + Send>;
type FlatMapFn<V, U> = Box<dyn FnOnce(V) -> Result<Promise<U>, Failure> + Send>;
type SettleFn<V, U> = Box<dyn FnOnce(Outcome<V>) -> Result<Next<U>, Failure> + Send>;
type RescueFn<U> = Box<dyn FnOnce(Failure) -> Result<Next<U>, Failure> + Send>;

/// The transform applied by one continuation.
pub(crate) enum Step<V, U> {
    /// Transform the value; rejections pass through.
    Map(MapFn<V, U>),
    /// Produce a dependent promise from the value; rejections pass through.
    FlatMap(FlatMapFn<V, U>),
    /// Handle either outcome.
    Settle(SettleFn<V, U>),
    /// Handle rejections accepted by `filter`; others pass through.
    Rescue {
        filter: RejectionFilter,
        on_value: Box<dyn FnOnce(V) -> U + Send>,
        handler: RescueFn<U>,
    },
}

impl<V, U> Step<V, U> {
    fn kind(&self) -> &'static str {
        match self {
            Self::Map(_) => "map",
            Self::FlatMap(_) => "flat-map",
            Self::Settle(_) => "settle",
            Self::Rescue { .. } => "rescue",
        }
    }

    fn apply(self, outcome: Outcome<V>) -> Result<Next<U>, Failure> {
        match self {
            Self::Map(f) => f(outcome?).map(Next::Value),
            Self::FlatMap(f) => f(outcome?).map(Next::Promise),
            Self::Settle(f) => f(outcome),
            Self::Rescue {
                filter,
                on_value,
                handler,
            } => match outcome {
                Ok(value) => Ok(Next::Value(on_value(value))),
                Err(failure) if filter.matches(&failure) => handler(failure),
                Err(failure) => Err(failure),
            },
        }
    }
}

/// Builds the promise driven by `source` through `step` on `executor`.
pub(crate) fn compose_step<V, U>(
    source: &Promise<V>,
    executor: ExecutorRef,
    step: Step<V, U>,
) -> Promise<U>
where
    V: PromiseValue,
    U: PromiseValue,
{
    let target = Arc::new(Core::new());
    let context = DispatchContext::capture();
    let driven = Arc::clone(&target);
    source.core.register(Box::new(move |outcome: &Outcome<V>| {
        let outcome = outcome.clone();
        let job_target = Arc::clone(&driven);
        let job: Job = Box::new(move || dispatch(&job_target, context, step, outcome));
        if let Err(err) = executor.submit(job) {
            trace!(executor = %executor.name(), error = %err, "continuation not submitted");
            driven.complete(Err(Failure::from(err)));
        }
    }));
    Promise { core: target }
}

fn dispatch<V, U>(
    target: &Arc<Core<U>>,
    context: DispatchContext,
    step: Step<V, U>,
    outcome: Outcome<V>,
) where
    V: PromiseValue,
    U: PromiseValue,
{
    let kind = step.kind();
    let token = Interrupt::new();
    if !target.set_hook(CancelHook::Interrupt(Arc::clone(&token))) {
        trace!(step = kind, "continuation suppressed, downstream already done");
        return;
    }
    // Completion stays inside the listener scope: callbacks drained here
    // observe the same ambient state as the transform.
    context.run(|| {
        let result =
            run_interruptible(&token, || catch_unwind(AssertUnwindSafe(|| step.apply(outcome))));
        match result {
            Ok(Ok(Next::Value(value))) => {
                target.complete(Ok(value));
            }
            Ok(Ok(Next::Promise(next))) => forward(target, &next),
            Ok(Err(failure)) => {
                target.complete(Err(failure));
            }
            Err(panic) => {
                target.complete(Err(Failure::panicked(panic)));
            }
        }
    });
}

/// Completes `target` when `next` completes; cancelling `target` cancels `next`.
pub(crate) fn forward<U: PromiseValue>(target: &Arc<Core<U>>, next: &Promise<U>) {
    if !target.set_hook(CancelHook::Forward(next.core.clone())) {
        return;
    }
    let target = Arc::clone(target);
    next.core.register(Box::new(move |outcome| {
        target.complete(outcome.clone());
    }));
}

/// Like [`forward`] across a value conversion.
pub(crate) fn forward_map<U, W>(next: &Promise<U>, convert: fn(U) -> W) -> Promise<W>
where
    U: PromiseValue,
    W: PromiseValue,
{
    let (deferred, promise) = Deferred::<W>::pair();
    let target = deferred.core;
    if target.set_hook(CancelHook::Forward(next.core.clone())) {
        next.core.register(Box::new(move |outcome| {
            target.complete(outcome.clone().map(convert));
        }));
    }
    promise
}

fn composition_executor() -> ExecutorRef {
    runtime::current().composition_executor()
}

/// Composition operators.
///
/// Every operator returns a new promise and never blocks. The transform runs
/// on the composition executor of [`runtime::current()`] (or the executor
/// passed to the `_on` variant) once `self` completes. Panics inside a
/// transform reject the returned promise with a
/// [`PanicPayload`](crate::types::PanicPayload).
impl<V: PromiseValue> Promise<V> {
    /// Transforms the value. Rejections pass through unchanged.
    pub fn map<U, F>(&self, f: F) -> Promise<U>
    where
        U: PromiseValue,
        F: FnOnce(V) -> U + Send + 'static,
    {
        self.map_on(&composition_executor(), f)
    }

    /// [`map`](Self::map) on an explicit executor.
    pub fn map_on<U, F>(&self, executor: &ExecutorRef, f: F) -> Promise<U>
    where
        U: PromiseValue,
        F: FnOnce(V) -> U + Send + 'static,
    {
        compose_step(self, Arc::clone(executor), Step::Map(Box::new(move |v| Ok(f(v)))))
    }

    /// Transforms the value with a fallible function; an `Err` rejects the result.
    pub fn try_map<U, F>(&self, f: F) -> Promise<U>
    where
        U: PromiseValue,
        F: FnOnce(V) -> Result<U, Failure> + Send + 'static,
    {
        self.try_map_on(&composition_executor(), f)
    }

    /// [`try_map`](Self::try_map) on an explicit executor.
    pub fn try_map_on<U, F>(&self, executor: &ExecutorRef, f: F) -> Promise<U>
    where
        U: PromiseValue,
        F: FnOnce(V) -> Result<U, Failure> + Send + 'static,
    {
        compose_step(self, Arc::clone(executor), Step::Map(Box::new(f)))
    }

    /// Chains a dependent promise; the result completes when it does.
    pub fn and_then<U, F>(&self, f: F) -> Promise<U>
    where
        U: PromiseValue,
        F: FnOnce(V) -> Promise<U> + Send + 'static,
    {
        self.and_then_on(&composition_executor(), f)
    }

    /// [`and_then`](Self::and_then) on an explicit executor.
    pub fn and_then_on<U, F>(&self, executor: &ExecutorRef, f: F) -> Promise<U>
    where
        U: PromiseValue,
        F: FnOnce(V) -> Promise<U> + Send + 'static,
    {
        compose_step(
            self,
            Arc::clone(executor),
            Step::FlatMap(Box::new(move |v| Ok(f(v)))),
        )
    }

    /// Chains an optional dependent promise. `None` resolves the result with
    /// `None` right away.
    pub fn and_then_opt<U, F>(&self, f: F) -> Promise<Option<U>>
    where
        U: PromiseValue,
        F: FnOnce(V) -> Option<Promise<U>> + Send + 'static,
    {
        self.and_then_opt_on(&composition_executor(), f)
    }

    /// [`and_then_opt`](Self::and_then_opt) on an explicit executor.
    pub fn and_then_opt_on<U, F>(&self, executor: &ExecutorRef, f: F) -> Promise<Option<U>>
    where
        U: PromiseValue,
        F: FnOnce(V) -> Option<Promise<U>> + Send + 'static,
    {
        compose_step(
            self,
            Arc::clone(executor),
            Step::FlatMap(Box::new(move |v| {
                Ok(match f(v) {
                    Some(next) => forward_map(&next, Some),
                    None => Promise::resolved(None),
                })
            })),
        )
    }

    /// Handles either outcome, producing a value.
    pub fn handle<U, F>(&self, f: F) -> Promise<U>
    where
        U: PromiseValue,
        F: FnOnce(Result<V, Failure>) -> U + Send + 'static,
    {
        self.handle_on(&composition_executor(), f)
    }

    /// [`handle`](Self::handle) on an explicit executor.
    pub fn handle_on<U, F>(&self, executor: &ExecutorRef, f: F) -> Promise<U>
    where
        U: PromiseValue,
        F: FnOnce(Result<V, Failure>) -> U + Send + 'static,
    {
        compose_step(
            self,
            Arc::clone(executor),
            Step::Settle(Box::new(move |o| Ok(Next::Value(f(o))))),
        )
    }

    /// Observes the outcome and passes it through unchanged.
    pub fn inspect<F>(&self, f: F) -> Promise<V>
    where
        F: FnOnce(&Result<V, Failure>) + Send + 'static,
    {
        self.inspect_on(&composition_executor(), f)
    }

    /// [`inspect`](Self::inspect) on an explicit executor.
    pub fn inspect_on<F>(&self, executor: &ExecutorRef, f: F) -> Promise<V>
    where
        F: FnOnce(&Result<V, Failure>) + Send + 'static,
    {
        compose_step(
            self,
            Arc::clone(executor),
            Step::Settle(Box::new(move |o| {
                f(&o);
                o.map(Next::Value)
            })),
        )
    }

    /// Recovers from rejections whose reason is an `E`.
    ///
    /// Any other rejection passes through and `f` never runs, including one
    /// that only wraps an `E` as its source. Use
    /// [`rescue_if`](Self::rescue_if) with [`RejectionFilter::wrapping`] for that.
    pub fn rescue<E, F>(&self, f: F) -> Promise<V>
    where
        E: StdError + 'static,
        F: FnOnce(&E) -> V + Send + 'static,
    {
        self.rescue_on(&composition_executor(), f)
    }

    /// [`rescue`](Self::rescue) on an explicit executor.
    pub fn rescue_on<E, F>(&self, executor: &ExecutorRef, f: F) -> Promise<V>
    where
        E: StdError + 'static,
        F: FnOnce(&E) -> V + Send + 'static,
    {
        self.rescue_step(
            executor,
            RejectionFilter::of::<E>(),
            Box::new(move |failure| match failure.downcast_ref::<E>() {
                Some(err) => Ok(Next::Value(f(err))),
                None => Err(failure),
            }),
        )
    }

    /// Recovers from rejections whose reason is an `E` with a dependent promise.
    pub fn rescue_flat<E, F>(&self, f: F) -> Promise<V>
    where
        E: StdError + 'static,
        F: FnOnce(&E) -> Promise<V> + Send + 'static,
    {
        self.rescue_flat_on(&composition_executor(), f)
    }

    /// [`rescue_flat`](Self::rescue_flat) on an explicit executor.
    pub fn rescue_flat_on<E, F>(&self, executor: &ExecutorRef, f: F) -> Promise<V>
    where
        E: StdError + 'static,
        F: FnOnce(&E) -> Promise<V> + Send + 'static,
    {
        self.rescue_step(
            executor,
            RejectionFilter::of::<E>(),
            Box::new(move |failure| match failure.downcast_ref::<E>() {
                Some(err) => Ok(Next::Promise(f(err))),
                None => Err(failure),
            }),
        )
    }

    /// Recovers from rejections accepted by `filter`. Returning `Err` rejects
    /// the result with that failure instead.
    pub fn rescue_if<F>(&self, filter: RejectionFilter, f: F) -> Promise<V>
    where
        F: FnOnce(Failure) -> Result<V, Failure> + Send + 'static,
    {
        self.rescue_if_on(&composition_executor(), filter, f)
    }

    /// [`rescue_if`](Self::rescue_if) on an explicit executor.
    pub fn rescue_if_on<F>(&self, executor: &ExecutorRef, filter: RejectionFilter, f: F) -> Promise<V>
    where
        F: FnOnce(Failure) -> Result<V, Failure> + Send + 'static,
    {
        self.rescue_step(
            executor,
            filter,
            Box::new(move |failure| f(failure).map(Next::Value)),
        )
    }

    /// Recovers from any rejection, including cancellation.
    pub fn or_else<F>(&self, f: F) -> Promise<V>
    where
        F: FnOnce(Failure) -> Result<V, Failure> + Send + 'static,
    {
        self.rescue_if(RejectionFilter::any(), f)
    }

    /// [`or_else`](Self::or_else) on an explicit executor.
    pub fn or_else_on<F>(&self, executor: &ExecutorRef, f: F) -> Promise<V>
    where
        F: FnOnce(Failure) -> Result<V, Failure> + Send + 'static,
    {
        self.rescue_if_on(executor, RejectionFilter::any(), f)
    }

    fn rescue_step(
        &self,
        executor: &ExecutorRef,
        filter: RejectionFilter,
        handler: RescueFn<V>,
    ) -> Promise<V> {
        compose_step(
            self,
            Arc::clone(executor),
            Step::Rescue {
                filter,
                on_value: Box::new(|v| v),
                handler,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{Executor, Inline};
    use crate::types::{CancelKind, PanicPayload, State};
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn inline() -> ExecutorRef {
        Arc::new(Inline)
    }

    /// Queues jobs until `run_all` is called.
    #[derive(Default)]
    struct Manual {
        jobs: parking_lot::Mutex<Vec<Job>>,
    }

    impl Manual {
        fn run_all(&self) {
            let jobs = std::mem::take(&mut *self.jobs.lock());
            for job in jobs {
                job();
            }
        }
    }

    impl Executor for Manual {
        fn submit(&self, job: Job) -> crate::error::Result<()> {
            self.jobs.lock().push(job);
            Ok(())
        }

        fn name(&self) -> &str {
            "manual"
        }
    }

    struct Closed;

    impl Executor for Closed {
        fn submit(&self, _job: Job) -> crate::error::Result<()> {
            Err(crate::error::Error::executor_shutdown("closed"))
        }

        fn name(&self) -> &str {
            "closed"
        }
    }

    #[test]
    fn map_and_associativity() {
        let exec = inline();
        let source = Promise::resolved(3);
        let chained = source.map_on(&exec, |x| x + 1).map_on(&exec, |x| x * 10);
        let fused = source.map_on(&exec, |x| (x + 1) * 10);
        assert_eq!(chained.wait().unwrap(), fused.wait().unwrap());
    }

    #[test]
    fn map_passes_rejection_through_without_running() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let failure = Failure::msg("upstream");
        let mapped = Promise::<u8>::rejected(failure.clone()).map_on(&inline(), move |x| {
            c.fetch_add(1, Ordering::SeqCst);
            x
        });
        assert!(mapped.wait().unwrap_err().ptr_eq(&failure));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn try_map_error_and_panic_reject() {
        let exec = inline();
        let err = Promise::resolved(1)
            .try_map_on(&exec, |_| -> Result<u8, Failure> { Err(Failure::msg("bad")) })
            .wait()
            .unwrap_err();
        assert_eq!(err.to_string(), "bad");

        let panicked = Promise::resolved(1)
            .map_on(&exec, |_: i32| -> i32 { panic!("transform exploded") })
            .wait()
            .unwrap_err();
        assert_eq!(
            panicked.downcast_ref::<PanicPayload>().unwrap().message(),
            "transform exploded"
        );
    }

    #[test]
    fn and_then_forwards_dependent_outcome() {
        let exec = inline();
        let (inner_d, inner) = Deferred::<String>::pair();
        let chained = Promise::resolved(2).and_then_on(&exec, move |_| inner);
        assert_eq!(chained.state(), State::Pending);
        inner_d.resolve("done".to_string());
        assert_eq!(chained.wait().unwrap(), "done");
    }

    #[test]
    fn and_then_opt_none_resolves_empty() {
        let exec = inline();
        let none = Promise::resolved(1).and_then_opt_on(&exec, |_| None::<Promise<u8>>);
        assert_eq!(none.wait().unwrap(), None);
        let some = Promise::resolved(1).and_then_opt_on(&exec, |x| Some(Promise::resolved(x + 1)));
        assert_eq!(some.wait().unwrap(), Some(2));
    }

    #[test]
    fn cancel_before_dispatch_suppresses_transform() {
        let manual = Arc::new(Manual::default());
        let exec: ExecutorRef = manual.clone();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let (d, source) = Deferred::<u8>::pair();
        let mapped = source.map_on(&exec, move |x| {
            c.fetch_add(1, Ordering::SeqCst);
            x
        });
        d.resolve(1);
        assert!(mapped.cancel(false));
        manual.run_all();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(mapped.is_cancelled());
        assert_eq!(source.wait().unwrap(), 1);
    }

    #[test]
    fn cancel_while_forwarding_cancels_dependent() {
        let exec = inline();
        let (_inner_d, inner) = Deferred::<u8>::pair();
        let probe = inner.clone();
        let chained = Promise::resolved(()).and_then_on(&exec, move |()| inner);
        assert!(chained.cancel(false));
        let reason = probe.wait().unwrap_err().cancel_reason().cloned().unwrap();
        assert_eq!(reason.kind, CancelKind::Propagated);
    }

    #[test]
    fn cancel_while_forwarding_through_option() {
        let exec = inline();
        let (_inner_d, inner) = Deferred::<u8>::pair();
        let probe = inner.clone();
        let chained = Promise::resolved(()).and_then_opt_on(&exec, move |()| Some(inner));
        assert!(chained.cancel(true));
        assert!(probe.is_cancelled());
    }

    #[test]
    fn forced_cancel_interrupts_running_transform() {
        crate::test_utils::init_test_logging();
        let pool: ExecutorRef = Arc::new(crate::runtime::NewThread::new("compose-test"));
        let (started_tx, started_rx) = std::sync::mpsc::channel();
        let side_effects = Arc::new(AtomicUsize::new(0));
        let effects = Arc::clone(&side_effects);
        let mapped = Promise::resolved(()).try_map_on(&pool, move |()| {
            started_tx.send(()).unwrap();
            crate::cancel::sleep(Duration::from_secs(10))?;
            effects.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        });
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(mapped.cancel(true));
        assert!(mapped.is_cancelled());
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(side_effects.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn submission_failure_rejects() {
        crate::test_utils::init_test_logging();
        let closed: ExecutorRef = Arc::new(Closed);
        let err = Promise::resolved(1).map_on(&closed, |x| x).wait().unwrap_err();
        let runtime_err = err.downcast_ref::<crate::error::Error>().unwrap();
        assert_eq!(runtime_err.kind(), crate::error::ErrorKind::ExecutorShutdown);
    }

    #[test]
    fn typed_rescue_routes_by_type() {
        let exec = inline();
        let io_fail = Promise::<String>::rejected(io::Error::new(io::ErrorKind::Other, "disk"));
        let recovered = io_fail.rescue_on::<io::Error, _>(&exec, |e| format!("recovered {e}"));
        assert_eq!(recovered.wait().unwrap(), "recovered disk");

        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let original = Failure::msg("not io");
        let passthrough = Promise::<String>::rejected(original.clone())
            .rescue_on::<io::Error, _>(&exec, move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                String::new()
            });
        assert!(passthrough.wait().unwrap_err().ptr_eq(&original));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[derive(Debug, thiserror::Error)]
    #[error("config unreadable")]
    struct ConfigError {
        #[source]
        cause: io::Error,
    }

    #[test]
    fn rescue_skips_reason_that_only_wraps_the_type() {
        let exec = inline();
        let calls = Arc::new(AtomicUsize::new(0));
        let wrapped = Failure::new(ConfigError {
            cause: io::Error::new(io::ErrorKind::NotFound, "missing"),
        });

        let c = Arc::clone(&calls);
        let skipped = Promise::<String>::rejected(wrapped.clone()).rescue_on::<io::Error, _>(&exec, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            "handled".to_string()
        });
        assert!(skipped.wait().unwrap_err().ptr_eq(&wrapped));

        let c = Arc::clone(&calls);
        let (flat_tx, flat) = Deferred::<String>::pair();
        let skipped_flat = Promise::<String>::rejected(wrapped.clone())
            .rescue_flat_on::<io::Error, _>(&exec, move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                flat
            });
        assert!(skipped_flat.wait().unwrap_err().ptr_eq(&wrapped));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        drop(flat_tx);

        let opted_in = Promise::<String>::rejected(wrapped)
            .rescue_if_on(&exec, RejectionFilter::wrapping::<io::Error>(), |f| {
                Ok(f.find::<io::Error>().map(ToString::to_string).unwrap_or_default())
            });
        assert_eq!(opted_in.wait().unwrap(), "missing");
    }

    #[test]
    fn handle_and_inspect_see_both_outcomes() {
        let exec = inline();
        let seen = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&seen);
        let out = Promise::<u8>::rejected(Failure::msg("x"))
            .inspect_on(&exec, move |o| {
                assert!(o.is_err());
                s.fetch_add(1, Ordering::SeqCst);
            })
            .handle_on(&exec, |o| o.map_or(0, |v| v + 1));
        assert_eq!(out.wait().unwrap(), 0);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
