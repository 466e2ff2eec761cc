//! Bridging foreign asynchronous sources into promises.
//!
//! [`adapt`] first offers the source to every registered
//! [`ForeignAdapter`], in registration order. An adapter that recognises the
//! source returns a promise for it; otherwise it hands the source back
//! untouched. When no adapter claims the source, a blocking bridge waits on
//! it from the bridge-role executor (a fresh thread by default) and relays
//! the outcome.

use crate::error::{Error, ErrorKind};
use crate::promise::Promise;
use crate::runtime::{self, ExecutorRef};
use crate::tracing_compat::{debug, trace};
use crate::types::{Failure, PromiseValue};
use parking_lot::RwLock;
use std::any::{type_name, Any};
use std::future::Future;
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;

/// A foreign source that can be waited on from a blocking thread.
pub trait BlockingSource<V>: Send + 'static {
    /// Blocks until the source produces its outcome.
    fn wait(self) -> Result<V, Failure>;
}

impl<V, E> BlockingSource<V> for JoinHandle<Result<V, E>>
where
    V: Send + 'static,
    E: Into<Failure> + Send + 'static,
{
    fn wait(self) -> Result<V, Failure> {
        match self.join() {
            Ok(result) => result.map_err(Into::into),
            Err(panic) => Err(Failure::panicked(panic)),
        }
    }
}

impl<V: Send + 'static> BlockingSource<V> for mpsc::Receiver<V> {
    fn wait(self) -> Result<V, Failure> {
        self.recv().map_err(|_| {
            Failure::from(
                Error::new(ErrorKind::Disconnected)
                    .with_message("sender dropped before producing a value"),
            )
        })
    }
}

/// Wraps a [`Future`] so it can be bridged by blocking on it.
#[derive(Debug)]
pub struct FutureSource<F>(pub F);

impl<F, V, E> BlockingSource<V> for FutureSource<F>
where
    F: Future<Output = Result<V, E>> + Send + 'static,
    E: Into<Failure>,
{
    fn wait(self) -> Result<V, Failure> {
        futures_lite::future::block_on(self.0).map_err(Into::into)
    }
}

/// Converts recognised foreign sources into promises.
///
/// `adapt` receives the source type-erased. It returns `Ok` with a boxed
/// `Promise<V>` when it handles the source, or `Err` with the source handed
/// back when it does not.
pub trait ForeignAdapter: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str {
        type_name::<Self>()
    }

    /// Attempts to convert `foreign` into a boxed promise.
    fn adapt(&self, foreign: Box<dyn Any + Send>) -> Result<Box<dyn Any + Send>, Box<dyn Any + Send>>;
}

static ADAPTERS: RwLock<Vec<Arc<dyn ForeignAdapter>>> = parking_lot::const_rwlock(Vec::new());

/// Appends an adapter. Adapters are consulted in registration order.
pub fn register_adapter(adapter: Arc<dyn ForeignAdapter>) {
    debug!(adapter = adapter.name(), "registered foreign adapter");
    ADAPTERS.write().push(adapter);
}

/// Removes every adapter, returning how many were registered.
pub fn clear_adapters() -> usize {
    let mut adapters = ADAPTERS.write();
    let count = adapters.len();
    adapters.clear();
    count
}

/// Converts `source` into a promise.
///
/// If an adapter claims the source but yields something other than a
/// `Promise<V>`, the returned promise rejects with
/// [`ErrorKind::AdapterMismatch`].
pub fn adapt<V, S>(source: S) -> Promise<V>
where
    V: PromiseValue,
    S: BlockingSource<V>,
{
    let adapters: Vec<Arc<dyn ForeignAdapter>> = ADAPTERS.read().clone();
    let mut foreign: Box<dyn Any + Send> = Box::new(source);
    for adapter in adapters {
        match adapter.adapt(foreign) {
            Ok(adapted) => {
                trace!(adapter = adapter.name(), "foreign source adapted");
                return match adapted.downcast::<Promise<V>>() {
                    Ok(promise) => *promise,
                    Err(_) => Promise::rejected(Error::new(ErrorKind::AdapterMismatch).with_message(
                        format!("{} did not produce a Promise<{}>", adapter.name(), type_name::<V>()),
                    )),
                };
            }
            Err(returned) => foreign = returned,
        }
    }
    match foreign.downcast::<S>() {
        Ok(source) => bridge_on(&runtime::current().bridge_executor(), *source),
        Err(_) => Promise::rejected(Error::new(ErrorKind::AdapterMismatch).with_message(format!(
            "adapter declined {} but returned a different value",
            type_name::<S>()
        ))),
    }
}

/// Bridges `source` by blocking on it from `executor`.
pub fn bridge_on<V, S>(executor: &ExecutorRef, source: S) -> Promise<V>
where
    V: PromiseValue,
    S: BlockingSource<V>,
{
    Promise::spawn_on(executor, move || source.wait())
}
