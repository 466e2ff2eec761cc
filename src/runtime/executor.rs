//! The execution-context contract and the two thread-less built-ins.

use crate::error::{Result, ResultExt};
use crate::tracing_compat::trace;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

/// A unit of work submitted to an executor.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Shared handle to an executor.
pub type ExecutorRef = Arc<dyn Executor>;

/// Something that runs submitted work.
///
/// Submission must not block on the work itself. An executor that cannot
/// accept the job (shut down, thread spawn failed) returns an error; the
/// composition engine turns that error into a rejection of the promise the
/// job would have completed.
pub trait Executor: Send + Sync + 'static {
    /// Accepts a job for execution.
    fn submit(&self, job: Job) -> Result<()>;

    /// Name used in logs and diagnostics.
    fn name(&self) -> &str;
}

impl fmt::Debug for dyn Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Executor").field(&self.name()).finish()
    }
}

/// Runs every job immediately on the submitting thread.
///
/// Continuations dispatched inline run on whichever thread completed the
/// upstream promise, or on the composing thread if it was already done.
#[derive(Debug, Default, Clone, Copy)]
pub struct Inline;

impl Executor for Inline {
    fn submit(&self, job: Job) -> Result<()> {
        job();
        Ok(())
    }

    fn name(&self) -> &str {
        super::registry::CURRENT_THREAD
    }
}

/// Spawns a fresh, detached thread per job.
///
/// Meant for work that blocks for long stretches, such as bridging a foreign
/// future, where parking a shared worker would starve other continuations.
#[derive(Debug)]
pub struct NewThread {
    prefix: String,
    counter: AtomicU64,
}

impl NewThread {
    /// Creates a spawner naming threads `<prefix>-bridge-<n>`.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }
}

impl Default for NewThread {
    fn default() -> Self {
        Self::new("pledge")
    }
}

impl Executor for NewThread {
    fn submit(&self, job: Job) -> Result<()> {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-bridge-{n}", self.prefix);
        trace!(thread = %name, "spawning dedicated thread");
        thread::Builder::new()
            .name(name.clone())
            .spawn(job)
            .map(drop)
            .with_context(|| format!("spawning thread {name}"))
    }

    fn name(&self) -> &str {
        super::registry::NEW_THREAD
    }
}
