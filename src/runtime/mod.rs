//! Executors and scheduling policy.
//!
//! - [`executor`]: the [`Executor`] contract and the thread-less built-ins
//! - [`pool`]: the bounded [`SharedPool`]
//! - [`registry`]: string-setting resolution through [`ExecutorRegistry`]
//! - [`config`] / [`env_config`]: [`SchedulingConfig`] and its env/TOML overrides
//! - [`scheduling`]: the resolved [`Scheduling`] bundle
//! - [`timer`]: the deadline [`Timer`] behind promise timeouts
//!
//! # Roles
//!
//! | Role | Used by | Default |
//! |------|---------|---------|
//! | default | `Promise::spawn` | `common-pool` |
//! | composition | `map`, `and_then`, `rescue`, ... | `common-pool` |
//! | bridge | `adapter::adapt` fallback | `new-thread` |
//!
//! # Process default
//!
//! Operations without an explicit executor use [`current()`]. The first
//! call builds a [`Scheduling`] from the `PLEDGE_*` environment; call
//! [`install`] at startup to inject one instead.
//!
//! ```ignore
//! use pledge::runtime::{self, Role, Scheduling, SchedulingConfig};
//!
//! let config = SchedulingConfig::default().with_executor(Role::Composition, "current-thread");
//! runtime::install(Scheduling::new(config)?);
//! ```

pub mod config;
pub mod env_config;
pub mod executor;
pub mod pool;
pub mod registry;
pub mod scheduling;
pub mod timer;

pub use config::{PoolConfig, Role, SchedulingConfig};
pub use executor::{Executor, ExecutorRef, Inline, Job, NewThread};
pub use pool::SharedPool;
pub use registry::{
    clear_global, global_registry, register_global, BuiltinExecutors, ExecutorFactory,
    ExecutorRegistry, COMMON_POOL, CURRENT_THREAD, NEW_THREAD,
};
pub use scheduling::Scheduling;
pub use timer::{Timer, TimerHandle};

use crate::tracing_compat::warn;
use parking_lot::RwLock;

static CURRENT: RwLock<Option<Scheduling>> = parking_lot::const_rwlock(None);

/// Installs `scheduling` as the process default, returning the previous one.
///
/// The previous instance keeps running; call
/// [`Scheduling::shutdown`] on it if it is no longer needed.
pub fn install(scheduling: Scheduling) -> Option<Scheduling> {
    CURRENT.write().replace(scheduling)
}

/// Removes the process default; the next [`current()`] rebuilds it.
pub fn clear() -> Option<Scheduling> {
    CURRENT.write().take()
}

/// Returns the process default, building it from the environment on first use.
///
/// A malformed environment is logged and replaced by built-in defaults.
#[must_use]
pub fn current() -> Scheduling {
    if let Some(scheduling) = CURRENT.read().as_ref() {
        return scheduling.clone();
    }
    let mut slot = CURRENT.write();
    if let Some(scheduling) = slot.as_ref() {
        return scheduling.clone();
    }
    let scheduling = Scheduling::from_env().unwrap_or_else(|err| {
        warn!(error = %err, "scheduling configuration rejected, using defaults");
        Scheduling::fallback()
    });
    *slot = Some(scheduling.clone());
    scheduling
}
