//! Scheduling configuration types.
//!
//! These types hold the raw settings that select executors for the three
//! scheduling roles and size the shared pool. They are resolved into live
//! executors by [`Scheduling::new`](super::Scheduling::new).
//!
//! # Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `default_executor` | `"common-pool"` |
//! | `composition_executor` | `"common-pool"` |
//! | `bridge_executor` | `"new-thread"` |
//! | `pool.min_threads` | 0 |
//! | `pool.max_threads` | available CPU parallelism |
//! | `pool.idle_timeout` | 10 s |
//! | `pool.thread_name_prefix` | `"pledge"` |

use super::registry::{COMMON_POOL, NEW_THREAD};
use core::fmt;
use std::time::Duration;

/// Default idle timeout before retiring threads above `min_threads`.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default thread name prefix.
pub const DEFAULT_THREAD_NAME_PREFIX: &str = "pledge";

/// The three places the runtime needs an executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Producer work started with `Promise::spawn`.
    Default,
    /// Continuations of composed promises (`map`, `and_then`, ...).
    Composition,
    /// Blocking bridges for foreign sources.
    Bridge,
}

impl Role {
    /// Every role, in resolution order.
    pub const ALL: [Self; 3] = [Self::Default, Self::Composition, Self::Bridge];

    /// Built-in setting used when the role is not configured.
    #[must_use]
    pub const fn default_setting(self) -> &'static str {
        match self {
            Self::Default | Self::Composition => COMMON_POOL,
            Self::Bridge => NEW_THREAD,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Composition => write!(f, "composition"),
            Self::Bridge => write!(f, "bridge"),
        }
    }
}

/// Sizing of the shared worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Threads kept alive while idle.
    pub min_threads: usize,
    /// Upper bound on live threads.
    pub max_threads: usize,
    /// Idle time after which threads above `min_threads` exit.
    pub idle_timeout: Duration,
    /// Prefix for worker thread names.
    pub thread_name_prefix: String,
}

impl PoolConfig {
    pub(crate) fn default_max_threads() -> usize {
        std::thread::available_parallelism()
            .map_or(1, std::num::NonZeroUsize::get)
            .max(1)
    }

    /// Normalize configuration values to safe defaults.
    pub fn normalize(&mut self) {
        if self.max_threads == 0 {
            self.max_threads = 1;
        }
        if self.max_threads < self.min_threads {
            self.max_threads = self.min_threads;
        }
        if self.thread_name_prefix.is_empty() {
            self.thread_name_prefix = DEFAULT_THREAD_NAME_PREFIX.to_string();
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_threads: 0,
            max_threads: Self::default_max_threads(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
        }
    }
}

/// Executor settings per role plus pool sizing.
///
/// A setting is one of `common-pool`, `current-thread`, `new-thread`, a type
/// name registered with
/// [`ExecutorRegistry::register_type`](super::ExecutorRegistry::register_type),
/// or a `Type#member` key registered with
/// [`ExecutorRegistry::register_member`](super::ExecutorRegistry::register_member).
/// Unknown settings are not errors; they fall back to the role default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulingConfig {
    /// Executor for producer work.
    pub default_executor: String,
    /// Executor for composed continuations.
    pub composition_executor: String,
    /// Executor for blocking bridges.
    pub bridge_executor: String,
    /// Shared pool sizing.
    pub pool: PoolConfig,
}

impl SchedulingConfig {
    /// Returns the setting for `role`.
    #[must_use]
    pub fn setting(&self, role: Role) -> &str {
        match role {
            Role::Default => &self.default_executor,
            Role::Composition => &self.composition_executor,
            Role::Bridge => &self.bridge_executor,
        }
    }

    /// Sets the executor for `role`.
    #[must_use]
    pub fn with_executor(mut self, role: Role, setting: impl Into<String>) -> Self {
        let setting = setting.into();
        match role {
            Role::Default => self.default_executor = setting,
            Role::Composition => self.composition_executor = setting,
            Role::Bridge => self.bridge_executor = setting,
        }
        self
    }

    /// Replaces the pool sizing.
    #[must_use]
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Normalize configuration values to safe defaults.
    pub fn normalize(&mut self) {
        for role in Role::ALL {
            let slot = match role {
                Role::Default => &mut self.default_executor,
                Role::Composition => &mut self.composition_executor,
                Role::Bridge => &mut self.bridge_executor,
            };
            let trimmed = slot.trim();
            if trimmed.is_empty() {
                *slot = role.default_setting().to_string();
            } else if trimmed.len() != slot.len() {
                *slot = trimmed.to_string();
            }
        }
        self.pool.normalize();
    }
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            default_executor: Role::Default.default_setting().to_string(),
            composition_executor: Role::Composition.default_setting().to_string(),
            bridge_executor: Role::Bridge.default_setting().to_string(),
            pool: PoolConfig::default(),
        }
    }
}
