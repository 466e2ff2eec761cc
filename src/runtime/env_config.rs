//! Environment variable and config file support for [`SchedulingConfig`].
//!
//! # Configuration Precedence
//!
//! Settings are resolved in this order (highest priority first):
//!
//! 1. **Programmatic**: values set on the struct before calling
//!    [`Scheduling::new`](super::Scheduling::new)
//! 2. **Environment variables**: values from `PLEDGE_*` env vars
//! 3. **Config file**: values loaded from a TOML file (requires `config-file` feature)
//! 4. **Defaults**: built-in defaults from [`SchedulingConfig::default()`]
//!
//! # Supported Environment Variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `PLEDGE_DEFAULT_EXECUTOR` | `String` | `default_executor` |
//! | `PLEDGE_COMPOSITION_EXECUTOR` | `String` | `composition_executor` |
//! | `PLEDGE_BRIDGE_EXECUTOR` | `String` | `bridge_executor` |
//! | `PLEDGE_POOL_MIN_THREADS` | `usize` | `pool.min_threads` |
//! | `PLEDGE_POOL_MAX_THREADS` | `usize` | `pool.max_threads` |
//! | `PLEDGE_POOL_IDLE_TIMEOUT_MS` | `u64` | `pool.idle_timeout` |
//! | `PLEDGE_THREAD_NAME_PREFIX` | `String` | `pool.thread_name_prefix` |
//!
//! Executor names are never validated here: an unknown name falls back to
//! the role default at resolution time. Malformed numbers are errors.

use super::config::SchedulingConfig;
use crate::error::{Error, Result};
use std::time::Duration;

/// Environment variable name for the producer-work executor.
pub const ENV_DEFAULT_EXECUTOR: &str = "PLEDGE_DEFAULT_EXECUTOR";
/// Environment variable name for the continuation executor.
pub const ENV_COMPOSITION_EXECUTOR: &str = "PLEDGE_COMPOSITION_EXECUTOR";
/// Environment variable name for the bridge executor.
pub const ENV_BRIDGE_EXECUTOR: &str = "PLEDGE_BRIDGE_EXECUTOR";
/// Environment variable name for shared pool minimum threads.
pub const ENV_POOL_MIN_THREADS: &str = "PLEDGE_POOL_MIN_THREADS";
/// Environment variable name for shared pool maximum threads.
pub const ENV_POOL_MAX_THREADS: &str = "PLEDGE_POOL_MAX_THREADS";
/// Environment variable name for the pool idle timeout in milliseconds.
pub const ENV_POOL_IDLE_TIMEOUT_MS: &str = "PLEDGE_POOL_IDLE_TIMEOUT_MS";
/// Environment variable name for the thread name prefix.
pub const ENV_THREAD_NAME_PREFIX: &str = "PLEDGE_THREAD_NAME_PREFIX";

/// Every variable read by [`apply_env_overrides`].
pub const ALL_ENV_VARS: [&str; 7] = [
    ENV_DEFAULT_EXECUTOR,
    ENV_COMPOSITION_EXECUTOR,
    ENV_BRIDGE_EXECUTOR,
    ENV_POOL_MIN_THREADS,
    ENV_POOL_MAX_THREADS,
    ENV_POOL_IDLE_TIMEOUT_MS,
    ENV_THREAD_NAME_PREFIX,
];

/// Apply environment variable overrides to a [`SchedulingConfig`].
///
/// Only variables that are set in the environment are applied.
/// Returns an error if a variable is set but contains an unparseable value.
pub fn apply_env_overrides(config: &mut SchedulingConfig) -> Result<()> {
    if let Some(val) = read_env(ENV_DEFAULT_EXECUTOR) {
        config.default_executor = val;
    }
    if let Some(val) = read_env(ENV_COMPOSITION_EXECUTOR) {
        config.composition_executor = val;
    }
    if let Some(val) = read_env(ENV_BRIDGE_EXECUTOR) {
        config.bridge_executor = val;
    }
    if let Some(val) = read_env(ENV_POOL_MIN_THREADS) {
        config.pool.min_threads = parse_usize(ENV_POOL_MIN_THREADS, &val)?;
    }
    if let Some(val) = read_env(ENV_POOL_MAX_THREADS) {
        config.pool.max_threads = parse_usize(ENV_POOL_MAX_THREADS, &val)?;
    }
    if let Some(val) = read_env(ENV_POOL_IDLE_TIMEOUT_MS) {
        config.pool.idle_timeout =
            Duration::from_millis(parse_u64(ENV_POOL_IDLE_TIMEOUT_MS, &val)?);
    }
    if let Some(val) = read_env(ENV_THREAD_NAME_PREFIX) {
        config.pool.thread_name_prefix = val;
    }
    Ok(())
}

/// Builds a configuration from defaults plus environment overrides.
pub fn from_env() -> Result<SchedulingConfig> {
    let mut config = SchedulingConfig::default();
    apply_env_overrides(&mut config)?;
    config.normalize();
    Ok(config)
}

/// Read an environment variable, returning `None` if unset.
fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_usize(var_name: &str, val: &str) -> Result<usize> {
    val.trim().parse::<usize>().map_err(|e| {
        Error::invalid_setting(format!(
            "invalid value for {var_name}: expected unsigned integer, got {val:?} ({e})"
        ))
    })
}

fn parse_u64(var_name: &str, val: &str) -> Result<u64> {
    val.trim().parse::<u64>().map_err(|e| {
        Error::invalid_setting(format!(
            "invalid value for {var_name}: expected milliseconds, got {val:?} ({e})"
        ))
    })
}

// =========================================================================
// TOML config file support (feature-gated)
// =========================================================================

/// TOML-deserializable scheduling configuration.
///
/// ```toml
/// [executors]
/// default = "common-pool"
/// composition = "current-thread"
/// bridge = "new-thread"
///
/// [pool]
/// min_threads = 1
/// max_threads = 8
/// idle_timeout_ms = 10000
/// thread_name_prefix = "myapp"
/// ```
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct SchedulingTomlConfig {
    /// Executor settings per role.
    #[serde(default)]
    pub executors: ExecutorsToml,
    /// Shared pool settings.
    #[serde(default)]
    pub pool: PoolToml,
}

/// Executors section of the TOML config.
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct ExecutorsToml {
    /// Executor for producer work.
    pub default: Option<String>,
    /// Executor for composed continuations.
    pub composition: Option<String>,
    /// Executor for blocking bridges.
    pub bridge: Option<String>,
}

/// Pool section of the TOML config.
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct PoolToml {
    /// Minimum number of pool threads.
    pub min_threads: Option<usize>,
    /// Maximum number of pool threads.
    pub max_threads: Option<usize>,
    /// Idle timeout in milliseconds.
    pub idle_timeout_ms: Option<u64>,
    /// Name prefix for pool threads.
    pub thread_name_prefix: Option<String>,
}

/// Apply a parsed TOML config to a [`SchedulingConfig`].
///
/// Only fields that are `Some` in the TOML struct override the config.
#[cfg(feature = "config-file")]
pub fn apply_toml_config(config: &mut SchedulingConfig, toml: &SchedulingTomlConfig) {
    if let Some(ref v) = toml.executors.default {
        config.default_executor.clone_from(v);
    }
    if let Some(ref v) = toml.executors.composition {
        config.composition_executor.clone_from(v);
    }
    if let Some(ref v) = toml.executors.bridge {
        config.bridge_executor.clone_from(v);
    }
    if let Some(v) = toml.pool.min_threads {
        config.pool.min_threads = v;
    }
    if let Some(v) = toml.pool.max_threads {
        config.pool.max_threads = v;
    }
    if let Some(v) = toml.pool.idle_timeout_ms {
        config.pool.idle_timeout = Duration::from_millis(v);
    }
    if let Some(ref v) = toml.pool.thread_name_prefix {
        config.pool.thread_name_prefix.clone_from(v);
    }
}

/// Parse a TOML string into a [`SchedulingTomlConfig`].
#[cfg(feature = "config-file")]
pub fn parse_toml_str(toml_str: &str) -> Result<SchedulingTomlConfig> {
    toml::from_str(toml_str)
        .map_err(|e| Error::invalid_setting(format!("failed to parse TOML config: {e}")))
}

/// Read and parse a TOML file into a [`SchedulingTomlConfig`].
#[cfg(feature = "config-file")]
pub fn parse_toml_file(path: &std::path::Path) -> Result<SchedulingTomlConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::invalid_setting(format!(
            "failed to read config file {}: {e}",
            path.display()
        ))
    })?;
    parse_toml_str(&content)
}

/// Builds a configuration from defaults, then the file, then the environment.
#[cfg(feature = "config-file")]
pub fn load(path: &std::path::Path) -> Result<SchedulingConfig> {
    let mut config = SchedulingConfig::default();
    apply_toml_config(&mut config, &parse_toml_file(path)?);
    apply_env_overrides(&mut config)?;
    config.normalize();
    Ok(config)
}

// =========================================================================
// Tests
// =========================================================================
