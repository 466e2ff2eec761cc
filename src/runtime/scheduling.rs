//! Resolved scheduling: live executors for every role.

use super::config::{Role, SchedulingConfig};
use super::env_config;
use super::executor::{ExecutorRef, Inline, NewThread};
use super::pool::SharedPool;
use super::registry::{global_registry, BuiltinExecutors, ExecutorRegistry};
use super::timer::Timer;
use crate::error::Result;
use crate::tracing_compat::debug;
use std::fmt;
use std::sync::Arc;

/// The executors and timer one set of promises is scheduled through.
///
/// Cheap to clone. Build one at startup and either pass it to the `_on`
/// variants explicitly or [`install`](super::install) it as the process
/// default.
#[derive(Clone)]
pub struct Scheduling {
    inner: Arc<SchedulingInner>,
}

struct SchedulingInner {
    config: SchedulingConfig,
    pool: SharedPool,
    builtins: BuiltinExecutors,
    default_executor: ExecutorRef,
    composition_executor: ExecutorRef,
    bridge_executor: ExecutorRef,
    timer: Timer,
}

impl fmt::Debug for Scheduling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduling")
            .field("default", &self.inner.default_executor.name())
            .field("composition", &self.inner.composition_executor.name())
            .field("bridge", &self.inner.bridge_executor.name())
            .field("pool", &self.inner.pool)
            .finish()
    }
}

impl Scheduling {
    /// Resolves `config` using only the built-in executors.
    pub fn new(config: SchedulingConfig) -> Result<Self> {
        Self::with_registry(config, &ExecutorRegistry::new())
    }

    /// Resolves `config`, looking up non-built-in settings in `registry`.
    ///
    /// Fails only if the shared pool cannot spawn its `min_threads`.
    pub fn with_registry(mut config: SchedulingConfig, registry: &ExecutorRegistry) -> Result<Self> {
        config.normalize();
        let pool = SharedPool::new(&config.pool)?;
        Ok(Self::assemble(config, pool, registry))
    }

    /// Builds from the environment and the process-wide registry.
    pub fn from_env() -> Result<Self> {
        Self::with_registry(env_config::from_env()?, &global_registry())
    }

    /// Built-in defaults with a lazily started pool; cannot fail.
    pub(crate) fn fallback() -> Self {
        let mut config = SchedulingConfig::default();
        config.normalize();
        let pool = SharedPool::unstarted(&config.pool);
        Self::assemble(config, pool, &ExecutorRegistry::new())
    }

    fn assemble(config: SchedulingConfig, pool: SharedPool, registry: &ExecutorRegistry) -> Self {
        let builtins = BuiltinExecutors {
            common_pool: Arc::new(pool.clone()),
            current_thread: Arc::new(Inline),
            new_thread: Arc::new(NewThread::new(config.pool.thread_name_prefix.clone())),
        };
        let resolve = |role: Role| {
            let fallback = match role {
                Role::Default | Role::Composition => &builtins.common_pool,
                Role::Bridge => &builtins.new_thread,
            };
            registry.resolve(role, config.setting(role), &builtins, fallback)
        };
        let default_executor = resolve(Role::Default);
        let composition_executor = resolve(Role::Composition);
        let bridge_executor = resolve(Role::Bridge);
        let timer = Timer::new(&config.pool.thread_name_prefix);
        debug!(
            default = %default_executor.name(),
            composition = %composition_executor.name(),
            bridge = %bridge_executor.name(),
            "scheduling resolved"
        );
        Self {
            inner: Arc::new(SchedulingInner {
                config,
                pool,
                builtins,
                default_executor,
                composition_executor,
                bridge_executor,
                timer,
            }),
        }
    }

    /// The normalized configuration this was built from.
    #[must_use]
    pub fn config(&self) -> &SchedulingConfig {
        &self.inner.config
    }

    /// The executor serving `role`.
    #[must_use]
    pub fn executor(&self, role: Role) -> ExecutorRef {
        Arc::clone(match role {
            Role::Default => &self.inner.default_executor,
            Role::Composition => &self.inner.composition_executor,
            Role::Bridge => &self.inner.bridge_executor,
        })
    }

    /// Executor for producer work.
    #[must_use]
    pub fn default_executor(&self) -> ExecutorRef {
        self.executor(Role::Default)
    }

    /// Executor for composed continuations.
    #[must_use]
    pub fn composition_executor(&self) -> ExecutorRef {
        self.executor(Role::Composition)
    }

    /// Executor for blocking bridges.
    #[must_use]
    pub fn bridge_executor(&self) -> ExecutorRef {
        self.executor(Role::Bridge)
    }

    /// The built-in executors.
    #[must_use]
    pub fn builtins(&self) -> &BuiltinExecutors {
        &self.inner.builtins
    }

    /// The shared worker pool.
    #[must_use]
    pub fn pool(&self) -> &SharedPool {
        &self.inner.pool
    }

    /// The timer used for promise timeouts.
    #[must_use]
    pub fn timer(&self) -> &Timer {
        &self.inner.timer
    }

    /// Stops the pool and the timer. Queued pool jobs still run; pending
    /// timeouts are dropped.
    pub fn shutdown(&self) {
        self.inner.pool.shutdown();
        self.inner.timer.shutdown();
    }
}
