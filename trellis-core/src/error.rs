//! Error types.
//!
//! Bookkeeping faults inside the runtime are never errors: they are logged
//! and ignored. Only operations a caller can meaningfully recover from
//! return [`Error`].

/// Boxed error for user-supplied fallible code (validators, submit handlers).
pub type BoxError = Box<dyn std::error::Error>;

/// Result alias for fallible trellis operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error("instance has been destroyed")]
    Destroyed,

    #[error("expected {expected}, found {found}")]
    Conversion {
        expected: &'static str,
        found: &'static str,
    },
}
