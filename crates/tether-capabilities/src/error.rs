//! Capability error types.

use tether_traps::TrapError;
use thiserror::Error;

/// Errors raised by capability surface operations.
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// The permission policy refused the operation.
    #[error("permission to {operation} {target} rejected")]
    PermissionDenied {
        /// What was attempted (`fetch`, `open window`, `redirect to`).
        operation: &'static str,
        /// The URL as given by the extension.
        target: String,
    },

    /// `translate` was given something other than a string or message object.
    #[error("unsupported message in translate(): {0}")]
    InvalidMessage(String),

    /// The host failed to perform a fetch.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// `register` was called on a surface with no loader attached.
    #[error("register is not available on this surface")]
    RegisterUnavailable,

    /// The loader rejected a registered extension.
    #[error("registration rejected: {0}")]
    Registration(String),

    /// A discovery trap failed.
    #[error(transparent)]
    Discovery(#[from] TrapError),
}

/// Result type for capability operations.
pub type CapabilityResult<T> = Result<T, CapabilityError>;
