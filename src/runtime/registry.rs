//! Executor resolution from string settings.
//!
//! A setting names an executor in one of three forms, tried in order:
//!
//! 1. a built-in key: [`COMMON_POOL`], [`CURRENT_THREAD`], [`NEW_THREAD`]
//! 2. a type name registered with [`ExecutorRegistry::register_type`]
//!    (the key is `std::any::type_name::<T>()`, e.g. `my_app::exec::Spawner`)
//! 3. a `Type#member` key registered with [`ExecutorRegistry::register_member`],
//!    naming a shared instance or constructor associated with a type
//!
//! Resolution never fails the caller: any error (unknown key, factory error,
//! factory panic) falls back to the role default and is reported to the
//! [diagnostic sink](crate::observability::diagnostics).

use super::config::Role;
use super::executor::{Executor, ExecutorRef};
use crate::error::{Error, ErrorKind, Result};
use crate::observability::diagnostics::report_executor_fallback;
use crate::tracing_compat::debug;
use crate::types::PanicPayload;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Built-in key for the shared worker pool.
pub const COMMON_POOL: &str = "common-pool";
/// Built-in key for inline execution on the submitting thread.
pub const CURRENT_THREAD: &str = "current-thread";
/// Built-in key for one dedicated thread per job.
pub const NEW_THREAD: &str = "new-thread";

/// Separator between a type name and a member name.
pub const MEMBER_SEPARATOR: char = '#';

/// Constructor registered under a key.
pub type ExecutorFactory = Arc<dyn Fn() -> Result<ExecutorRef> + Send + Sync>;

/// The live built-in executors of one scheduling instance.
#[derive(Clone)]
pub struct BuiltinExecutors {
    /// Shared worker pool.
    pub common_pool: ExecutorRef,
    /// Inline execution.
    pub current_thread: ExecutorRef,
    /// Dedicated threads.
    pub new_thread: ExecutorRef,
}

impl BuiltinExecutors {
    /// Returns the built-in for `key`, if it is one.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<ExecutorRef> {
        match key {
            COMMON_POOL => Some(Arc::clone(&self.common_pool)),
            CURRENT_THREAD => Some(Arc::clone(&self.current_thread)),
            NEW_THREAD => Some(Arc::clone(&self.new_thread)),
            _ => None,
        }
    }
}

impl fmt::Debug for BuiltinExecutors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinExecutors")
            .field("common_pool", &self.common_pool.name())
            .field("current_thread", &self.current_thread.name())
            .field("new_thread", &self.new_thread.name())
            .finish()
    }
}

/// String key to executor factory map.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    factories: HashMap<String, ExecutorFactory>,
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        keys.sort_unstable();
        f.debug_struct("ExecutorRegistry").field("keys", &keys).finish()
    }
}

impl ExecutorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` under its type name; resolving it builds `T::default()`.
    pub fn register_type<T: Executor + Default>(&mut self) -> &mut Self {
        self.register_type_as(std::any::type_name::<T>(), || {
            Ok(Arc::new(T::default()) as ExecutorRef)
        })
    }

    /// Registers a factory under an explicit type name.
    pub fn register_type_as<F>(&mut self, type_name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Result<ExecutorRef> + Send + Sync + 'static,
    {
        let key = type_name.into();
        debug!(key = %key, "executor type registered");
        self.factories.insert(key, Arc::new(factory));
        self
    }

    /// Registers a factory under `"<type name of T>#<member>"`.
    pub fn register_member<T: ?Sized + 'static, F>(&mut self, member: &str, factory: F) -> &mut Self
    where
        F: Fn() -> Result<ExecutorRef> + Send + Sync + 'static,
    {
        self.register_member_as(std::any::type_name::<T>(), member, factory)
    }

    /// Registers a factory under `"<type_name>#<member>"`.
    pub fn register_member_as<F>(&mut self, type_name: &str, member: &str, factory: F) -> &mut Self
    where
        F: Fn() -> Result<ExecutorRef> + Send + Sync + 'static,
    {
        self.register_type_as(format!("{type_name}{MEMBER_SEPARATOR}{member}"), factory)
    }

    /// Returns true if a factory is registered under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.factories.contains_key(key)
    }

    /// Number of registered factories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Adds every factory of `other`, replacing duplicates.
    pub fn extend(&mut self, other: &Self) {
        for (key, factory) in &other.factories {
            self.factories.insert(key.clone(), Arc::clone(factory));
        }
    }

    /// Resolves `setting` to an executor, or explains why it could not.
    pub fn lookup(&self, setting: &str, builtins: &BuiltinExecutors) -> Result<ExecutorRef> {
        let setting = setting.trim();
        if let Some(builtin) = builtins.get(setting) {
            return Ok(builtin);
        }
        if let Some((type_name, member)) = setting.split_once(MEMBER_SEPARATOR) {
            if type_name.is_empty() || member.is_empty() {
                return Err(Error::invalid_setting(format!(
                    "malformed member reference {setting:?}"
                )));
            }
        }
        let factory = self
            .factories
            .get(setting)
            .ok_or_else(|| Error::unknown_executor(setting))?;
        match catch_unwind(AssertUnwindSafe(|| factory())) {
            Ok(result) => result,
            Err(panic) => Err(Error::new(ErrorKind::Panicked)
                .with_message(format!("factory for {setting:?} panicked"))
                .with_source(PanicPayload::from_panic(panic.as_ref()))),
        }
    }

    /// Resolves `setting` for `role`, falling back to `fallback` on any error.
    pub fn resolve(
        &self,
        role: Role,
        setting: &str,
        builtins: &BuiltinExecutors,
        fallback: &ExecutorRef,
    ) -> ExecutorRef {
        match self.lookup(setting, builtins) {
            Ok(executor) => {
                debug!(role = %role, setting = %setting, executor = %executor.name(), "executor resolved");
                executor
            }
            Err(err) => {
                report_executor_fallback(&role.to_string(), setting, &err);
                Arc::clone(fallback)
            }
        }
    }
}

static GLOBAL: RwLock<Option<ExecutorRegistry>> = parking_lot::const_rwlock(None);

/// Adds factories to the process-wide registry used by
/// [`runtime::current`](super::current) when it builds the default scheduling.
pub fn register_global(f: impl FnOnce(&mut ExecutorRegistry)) {
    let mut global = GLOBAL.write();
    f(global.get_or_insert_with(ExecutorRegistry::new));
}

/// Snapshot of the process-wide registry.
#[must_use]
pub fn global_registry() -> ExecutorRegistry {
    GLOBAL.read().clone().unwrap_or_default()
}

/// Removes every factory from the process-wide registry.
pub fn clear_global() {
    GLOBAL.write().take();
}
