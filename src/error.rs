//! Error types for the promise runtime.
//!
//! Rejection reasons carried *inside* a promise are [`Failure`](crate::types::Failure)
//! values. The [`Error`] type in this module describes problems raised by the
//! runtime itself:
//!
//! - **Usage**: misuse at a call site (double listener registration, adapter mismatch)
//! - **Scheduling**: executor shutdown or thread spawn failure
//! - **Configuration**: malformed settings
//! - **User**: panics in executor factories
//!
//! Cancellation and timeouts are not runtime errors; they reject promises
//! with the [`Cancelled`](crate::types::Cancelled) marker and
//! [`TimeoutError`](crate::types::TimeoutError).
//!
//! Every `Error` converts into a `Failure`, so scheduling problems surface as
//! rejections of the promise whose work could not be dispatched.

use core::fmt;
use std::sync::Arc;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === User ===
    /// User-supplied code panicked.
    Panicked,
    /// User-provided error.
    User,

    // === Scheduling ===
    /// The executor no longer accepts work.
    ExecutorShutdown,
    /// A worker thread could not be spawned.
    SpawnFailed,

    // === Usage ===
    /// The same listener or adapter was registered twice.
    AlreadyRegistered,
    /// An adapter produced a promise of the wrong value type.
    AdapterMismatch,
    /// The producing side of a foreign source went away.
    Disconnected,

    // === Configuration ===
    /// A setting could not be parsed.
    InvalidSetting,
    /// An executor name did not resolve.
    UnknownExecutor,

    // === Internal ===
    /// Internal runtime error (bug).
    Internal,
}

impl ErrorKind {
    /// Returns the error category for this kind.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Panicked | Self::User => ErrorCategory::User,
            Self::ExecutorShutdown | Self::SpawnFailed => ErrorCategory::Scheduling,
            Self::AlreadyRegistered | Self::AdapterMismatch | Self::Disconnected => {
                ErrorCategory::Usage
            }
            Self::InvalidSetting | Self::UnknownExecutor => ErrorCategory::Configuration,
            Self::Internal => ErrorCategory::Internal,
        }
    }
}

/// High-level error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Executor and thread failures.
    Scheduling,
    /// Misuse at a call site.
    Usage,
    /// Bad settings.
    Configuration,
    /// Internal runtime errors.
    Internal,
    /// User-originated errors.
    User,
}

/// The main error type for runtime operations.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Adds a message description to the error.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Creates an executor-shutdown error naming the executor.
    #[must_use]
    pub fn executor_shutdown(executor: &str) -> Self {
        Self::new(ErrorKind::ExecutorShutdown)
            .with_message(format!("executor {executor} is shut down"))
    }

    /// Creates an invalid-setting error.
    #[must_use]
    pub fn invalid_setting(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidSetting).with_message(detail)
    }

    /// Creates an unknown-executor error for a setting value.
    #[must_use]
    pub fn unknown_executor(setting: &str) -> Self {
        Self::new(ErrorKind::UnknownExecutor)
            .with_message(format!("no executor registered for {setting:?}"))
    }

    /// Creates an internal error (runtime bug).
    #[must_use]
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal).with_message(detail)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

/// Extension trait for adding context to Results.
#[allow(clippy::result_large_err)]
pub trait ResultExt<T> {
    /// Attach a context message on error.
    fn context(self, msg: impl Into<String>) -> Result<T>;
    /// Attach context message computed lazily on error.
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for core::result::Result<T, E> {
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_message(msg))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| e.into().with_message(f()))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorKind::SpawnFailed).with_source(e)
    }
}

/// A specialized Result type for runtime operations.
#[allow(clippy::result_large_err)]
pub type Result<T> = core::result::Result<T, Error>;
