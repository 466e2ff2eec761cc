//! Shared worker pool.
//!
//! The default executor for producer work and composed continuations. It
//! supports:
//!
//! - **Capacity management**: min/max threads with on-demand scaling
//! - **Idle retirement**: threads above `min_threads` exit after `idle_timeout`
//! - **Panic isolation**: a panicking job never takes its worker down
//! - **Shutdown**: new submissions fail, queued jobs still drain
//!
//! # Thread lifecycle
//!
//! Threads are spawned lazily up to `max_threads` whenever queued work
//! outnumbers idle workers. `min_threads` workers are spawned eagerly and
//! park indefinitely when idle.
//!
//! # Example
//!
//! ```ignore
//! use pledge::runtime::{Executor, PoolConfig, SharedPool};
//!
//! let pool = SharedPool::new(&PoolConfig::default())?;
//! pool.submit(Box::new(|| println!("on a pool thread")))?;
//! pool.shutdown_and_wait(Duration::from_secs(1));
//! ```

use super::config::PoolConfig;
use super::executor::{Executor, Job};
use crate::error::{Error, ErrorKind, Result};
use crate::tracing_compat::{debug, warn};
use crate::types::PanicPayload;
use crossbeam_queue::SegQueue;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Bounded pool of worker threads, cheap to clone.
#[derive(Clone)]
pub struct SharedPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    min_threads: usize,
    max_threads: usize,
    idle_timeout: Duration,
    thread_name_prefix: String,
    /// Live worker threads.
    active_threads: AtomicUsize,
    /// Workers currently running a job.
    busy_threads: AtomicUsize,
    /// Jobs queued but not yet picked up.
    pending_count: AtomicUsize,
    next_thread_id: AtomicU64,
    queue: SegQueue<Job>,
    shutdown: AtomicBool,
    /// Workers park on this; submitters notify while holding `mutex`.
    condvar: Condvar,
    mutex: Mutex<()>,
    thread_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for SharedPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedPool")
            .field("min_threads", &self.inner.min_threads)
            .field("max_threads", &self.inner.max_threads)
            .field("active_threads", &self.active_threads())
            .field("pending_jobs", &self.pending_count())
            .finish()
    }
}

impl SharedPool {
    /// Creates a pool and eagerly spawns `min_threads` workers.
    ///
    /// `max_threads` is raised to at least `max(min_threads, 1)`.
    pub fn new(config: &PoolConfig) -> Result<Self> {
        let pool = Self::unstarted(config);
        for _ in 0..pool.inner.min_threads {
            spawn_worker(&pool.inner)?;
        }
        debug!(
            min = pool.inner.min_threads,
            max = pool.inner.max_threads,
            prefix = %pool.inner.thread_name_prefix,
            "shared pool started"
        );
        Ok(pool)
    }

    /// Creates a pool whose workers are all spawned on demand.
    pub(crate) fn unstarted(config: &PoolConfig) -> Self {
        let max_threads = config.max_threads.max(config.min_threads).max(1);
        Self {
            inner: Arc::new(PoolInner {
                min_threads: config.min_threads,
                max_threads,
                idle_timeout: config.idle_timeout,
                thread_name_prefix: config.thread_name_prefix.clone(),
                active_threads: AtomicUsize::new(0),
                busy_threads: AtomicUsize::new(0),
                pending_count: AtomicUsize::new(0),
                next_thread_id: AtomicU64::new(0),
                queue: SegQueue::new(),
                shutdown: AtomicBool::new(false),
                condvar: Condvar::new(),
                mutex: Mutex::new(()),
                thread_handles: Mutex::new(Vec::with_capacity(max_threads)),
            }),
        }
    }

    /// Number of live worker threads.
    #[must_use]
    pub fn active_threads(&self) -> usize {
        self.inner.active_threads.load(Ordering::Acquire)
    }

    /// Number of workers currently running a job.
    #[must_use]
    pub fn busy_threads(&self) -> usize {
        self.inner.busy_threads.load(Ordering::Relaxed)
    }

    /// Number of queued jobs not yet picked up.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending_count.load(Ordering::Relaxed)
    }

    /// Returns true once [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    /// Stops accepting jobs. Queued jobs still run.
    pub fn shutdown(&self) {
        if !self.inner.shutdown.swap(true, Ordering::AcqRel) {
            debug!(prefix = %self.inner.thread_name_prefix, "shared pool shutting down");
        }
        self.notify_all();
    }

    /// Shuts down and waits up to `timeout` for every worker to exit.
    /// `Duration::MAX` waits without a deadline.
    ///
    /// Returns false if workers were still running at the deadline.
    pub fn shutdown_and_wait(&self, timeout: Duration) -> bool {
        self.shutdown();
        let deadline = Instant::now().checked_add(timeout);
        while self.inner.active_threads.load(Ordering::Acquire) > 0 {
            let remaining = deadline.map_or(Duration::MAX, |deadline| {
                deadline.saturating_duration_since(Instant::now())
            });
            if remaining.is_zero() {
                return false;
            }
            self.notify_all();
            thread::sleep(Duration::from_millis(5).min(remaining));
        }
        let current = thread::current().id();
        for handle in self.inner.thread_handles.lock().drain(..) {
            // A job may shut its own pool down; never join the calling thread.
            if handle.thread().id() != current {
                let _ = handle.join();
            }
        }
        true
    }

    fn notify_all(&self) {
        let _guard = self.inner.mutex.lock();
        self.inner.condvar.notify_all();
    }

    fn maybe_spawn_worker(&self) -> Result<()> {
        let inner = &self.inner;
        let active = inner.active_threads.load(Ordering::Acquire);
        let idle = active.saturating_sub(inner.busy_threads.load(Ordering::Relaxed));
        let pending = inner.pending_count.load(Ordering::Relaxed);
        if active < inner.max_threads && pending > idle {
            if let Err(err) = spawn_worker(inner) {
                // Existing workers will still drain the queue.
                if inner.active_threads.load(Ordering::Acquire) == 0 {
                    return Err(err);
                }
                warn!(error = %err, "pool could not grow");
            }
        }
        Ok(())
    }
}

impl Executor for SharedPool {
    fn submit(&self, job: Job) -> Result<()> {
        if self.is_shutdown() {
            return Err(Error::executor_shutdown(self.name()));
        }
        self.inner.pending_count.fetch_add(1, Ordering::Relaxed);
        self.inner.queue.push(job);
        self.maybe_spawn_worker()?;
        let _guard = self.inner.mutex.lock();
        self.inner.condvar.notify_one();
        Ok(())
    }

    fn name(&self) -> &str {
        super::registry::COMMON_POOL
    }
}

fn spawn_worker(inner: &Arc<PoolInner>) -> Result<()> {
    let id = inner.next_thread_id.fetch_add(1, Ordering::Relaxed);
    let name = format!("{}-pool-{id}", inner.thread_name_prefix);
    inner.active_threads.fetch_add(1, Ordering::AcqRel);
    let worker = Arc::clone(inner);
    let spawned = thread::Builder::new().name(name).spawn(move || {
        if worker_loop(&worker) == Exit::Shutdown {
            worker.active_threads.fetch_sub(1, Ordering::AcqRel);
        }
    });
    match spawned {
        Ok(handle) => {
            let mut handles = inner.thread_handles.lock();
            handles.retain(|h| !h.is_finished());
            handles.push(handle);
            Ok(())
        }
        Err(err) => {
            inner.active_threads.fetch_sub(1, Ordering::AcqRel);
            Err(Error::new(ErrorKind::SpawnFailed).with_source(err))
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Exit {
    Shutdown,
    /// Already counted out of `active_threads`.
    Retired,
}

fn worker_loop(inner: &PoolInner) -> Exit {
    loop {
        if let Some(job) = inner.queue.pop() {
            // Busy before un-pending: submitters may overcount, never undercount.
            inner.busy_threads.fetch_add(1, Ordering::Relaxed);
            inner.pending_count.fetch_sub(1, Ordering::Relaxed);
            if let Err(panic) = catch_unwind(AssertUnwindSafe(job)) {
                let payload = PanicPayload::from_panic(panic.as_ref());
                warn!(panic = %payload.message(), "pool job panicked");
            }
            inner.busy_threads.fetch_sub(1, Ordering::Relaxed);
            continue;
        }

        let mut guard = inner.mutex.lock();
        // Re-check under the lock so a concurrent submit cannot be missed.
        if !inner.queue.is_empty() {
            continue;
        }
        if inner.shutdown.load(Ordering::Acquire) {
            return Exit::Shutdown;
        }
        if inner.active_threads.load(Ordering::Acquire) > inner.min_threads {
            let timed_out = inner
                .condvar
                .wait_for(&mut guard, inner.idle_timeout)
                .timed_out();
            if timed_out && inner.queue.is_empty() && try_retire(inner) {
                return Exit::Retired;
            }
        } else {
            inner.condvar.wait(&mut guard);
        }
    }
}

/// Claims one retirement slot above `min_threads`.
fn try_retire(inner: &PoolInner) -> bool {
    let mut active = inner.active_threads.load(Ordering::Acquire);
    while active > inner.min_threads {
        match inner.active_threads.compare_exchange(
            active,
            active - 1,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => return true,
            Err(current) => active = current,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;
    use std::sync::{mpsc, Barrier};

    fn config(min: usize, max: usize) -> PoolConfig {
        PoolConfig {
            min_threads: min,
            max_threads: max,
            idle_timeout: Duration::from_secs(10),
            thread_name_prefix: "test".to_string(),
        }
    }

    #[test]
    fn runs_submitted_jobs() {
        crate::test_utils::init_test_logging();
        let pool = SharedPool::new(&config(1, 4)).unwrap();
        let counter = Arc::new(AtomicI32::new(0));
        let (tx, rx) = mpsc::channel();
        for _ in 0..8 {
            let counter = Arc::clone(&counter);
            let tx = tx.clone();
            pool.submit(Box::new(move || {
                counter.fetch_add(1, Ordering::Relaxed);
                tx.send(()).unwrap();
            }))
            .unwrap();
        }
        for _ in 0..8 {
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 8);
        assert!(pool.shutdown_and_wait(Duration::from_secs(5)));
    }

    #[test]
    fn active_threads_start_at_min() {
        let pool = SharedPool::new(&config(2, 4)).unwrap();
        assert_eq!(pool.active_threads(), 2);
        assert!(pool.shutdown_and_wait(Duration::from_secs(5)));
        assert_eq!(pool.active_threads(), 0);
    }

    #[test]
    fn scales_up_to_max_for_blocking_jobs() {
        let pool = SharedPool::new(&config(0, 3)).unwrap();
        let barrier = Arc::new(Barrier::new(4));
        for _ in 0..3 {
            let b = Arc::clone(&barrier);
            pool.submit(Box::new(move || {
                b.wait();
            }))
            .unwrap();
        }
        // Only completes if all three jobs run concurrently.
        barrier.wait();
        assert!(pool.active_threads() <= 3);
        assert!(pool.shutdown_and_wait(Duration::from_secs(5)));
    }

    #[test]
    fn idle_threads_above_min_retire() {
        let mut cfg = config(0, 3);
        cfg.idle_timeout = Duration::from_millis(30);
        let pool = SharedPool::new(&cfg).unwrap();
        let barrier = Arc::new(Barrier::new(4));
        for _ in 0..3 {
            let b = Arc::clone(&barrier);
            pool.submit(Box::new(move || {
                b.wait();
            }))
            .unwrap();
        }
        barrier.wait();
        let retired = crate::test_utils::wait_until(Duration::from_secs(5), || {
            pool.active_threads() == 0
        });
        assert!(retired, "workers above min should retire when idle");
    }

    #[test]
    fn panicking_job_does_not_kill_worker() {
        crate::test_utils::init_test_logging();
        let pool = SharedPool::new(&config(1, 1)).unwrap();
        pool.submit(Box::new(|| panic!("intentional panic"))).unwrap();
        let (tx, rx) = mpsc::channel();
        pool.submit(Box::new(move || tx.send(7).unwrap())).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 7);
        assert_eq!(pool.active_threads(), 1);
        assert!(pool.shutdown_and_wait(Duration::from_secs(5)));
    }

    #[test]
    fn shutdown_drains_queue_then_rejects() {
        let pool = SharedPool::new(&config(1, 1)).unwrap();
        let counter = Arc::new(AtomicI32::new(0));
        for _ in 0..10 {
            let counter = Arc::clone(&counter);
            pool.submit(Box::new(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            }))
            .unwrap();
        }
        assert!(pool.shutdown_and_wait(Duration::from_secs(5)));
        assert_eq!(counter.load(Ordering::Relaxed), 10);

        let err = pool.submit(Box::new(|| {})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExecutorShutdown);
    }

    #[test]
    fn shutdown_and_wait_accepts_unbounded_timeout() {
        let pool = SharedPool::new(&config(2, 2)).unwrap();
        pool.submit(Box::new(|| thread::sleep(Duration::from_millis(10)))).unwrap();
        assert!(pool.shutdown_and_wait(Duration::MAX));
        assert_eq!(pool.active_threads(), 0);
    }

    #[test]
    fn thread_names_carry_prefix() {
        let pool = SharedPool::new(&config(1, 1)).unwrap();
        let (tx, rx) = mpsc::channel();
        pool.submit(Box::new(move || {
            tx.send(thread::current().name().map(str::to_string)).unwrap();
        }))
        .unwrap();
        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(name.unwrap().starts_with("test-pool-"));
        assert!(pool.shutdown_and_wait(Duration::from_secs(5)));
    }
}
