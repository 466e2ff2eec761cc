//! Observable promise state.

use core::fmt;

/// The three states of a promise.
///
/// `Pending` moves to exactly one of the two terminal states; no transition
/// leaves `Resolved` or `Rejected`. A cancelled promise is `Rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// No outcome yet.
    Pending,
    /// Completed with a value.
    Resolved,
    /// Completed with a failure reason.
    Rejected,
}

impl State {
    /// Returns true for `Resolved` and `Rejected`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Resolved => write!(f, "resolved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}
