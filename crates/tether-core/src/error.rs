//! Error types for host object operations.

use thiserror::Error;

/// Errors raised while interacting with host objects.
#[derive(Debug, Error)]
pub enum HostError {
    /// A value was invoked that is not callable.
    #[error("value is not callable: {0}")]
    NotCallable(String),

    /// A host function failed while running.
    #[error("host function '{function}' failed: {message}")]
    CallFailed {
        /// Name of the failing function.
        function: String,
        /// Failure description.
        message: String,
    },

    /// A member expected on a duck-typed host object is absent.
    #[error("host object has no member '{0}'")]
    MissingMember(String),

    /// A store was used before the host wired its dispatch.
    #[error("store dispatch is not available yet")]
    DispatchUnavailable,
}

/// Result type for host operations.
pub type HostResult<T> = Result<T, HostError>;
