//! Cancellation reason and kind types.
//!
//! Cancellation of a promise is a rejection carrying the distinguished
//! [`Cancelled`] marker. This module defines the types that describe why and
//! how cancellation occurred.

use core::fmt;

/// The kind of cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CancelKind {
    /// Cancellation requested without interrupting running work.
    User,
    /// Cancellation requested with an interruption signal to running work.
    Forced,
    /// Cancellation forwarded from a composed promise to the promise driving it.
    Propagated,
    /// Running work observed an interruption at a checkpoint.
    Interrupted,
}

impl CancelKind {
    /// Returns the kind used when cancelling with the given force flag.
    #[must_use]
    pub const fn for_request(force: bool) -> Self {
        if force {
            Self::Forced
        } else {
            Self::User
        }
    }
}

impl fmt::Display for CancelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Forced => write!(f, "forced"),
            Self::Propagated => write!(f, "propagated"),
            Self::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// The reason for a cancellation, including kind and optional context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelReason {
    /// The kind of cancellation.
    pub kind: CancelKind,
    /// Optional human-readable message.
    pub message: Option<&'static str>,
}

impl CancelReason {
    /// Creates a new cancellation reason with the given kind.
    #[must_use]
    pub const fn new(kind: CancelKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    /// Creates a user cancellation reason with a message.
    #[must_use]
    pub const fn user(message: &'static str) -> Self {
        Self {
            kind: CancelKind::User,
            message: Some(message),
        }
    }

    /// Creates the reason recorded by `cancel(force)`.
    #[must_use]
    pub const fn requested(force: bool) -> Self {
        Self::new(CancelKind::for_request(force))
    }

    /// Creates a propagated cancellation reason.
    #[must_use]
    pub const fn propagated() -> Self {
        Self::new(CancelKind::Propagated)
    }

    /// Creates the reason raised at an interruption checkpoint.
    #[must_use]
    pub const fn interrupted() -> Self {
        Self::new(CancelKind::Interrupted)
    }

    /// Returns true if the request carried an interruption signal.
    #[must_use]
    pub const fn is_forced(&self) -> bool {
        matches!(self.kind, CancelKind::Forced)
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(msg) = self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

/// Rejection marker for a cancelled promise.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cancelled ({reason})")]
pub struct Cancelled {
    /// The reason for cancellation.
    pub reason: CancelReason,
}

impl Cancelled {
    /// Wraps a reason.
    #[must_use]
    pub const fn new(reason: CancelReason) -> Self {
        Self { reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_kind_follows_force_flag() {
        assert_eq!(CancelKind::for_request(false), CancelKind::User);
        assert_eq!(CancelKind::for_request(true), CancelKind::Forced);
        assert!(CancelReason::requested(true).is_forced());
        assert!(!CancelReason::requested(false).is_forced());
    }

    #[test]
    fn display_includes_message() {
        let reason = CancelReason::user("shutting down");
        assert_eq!(reason.to_string(), "user: shutting down");
        let marker = Cancelled::new(CancelReason::propagated());
        assert_eq!(marker.to_string(), "cancelled (propagated)");
    }
}
