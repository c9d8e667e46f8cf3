//! Error types for discovery traps.

use tether_core::HostError;
use thiserror::Error;

/// Errors raised by the discovery traps.
#[derive(Debug, Error)]
pub enum TrapError {
    /// A host object misbehaved while being inspected or used.
    #[error(transparent)]
    Host(#[from] HostError),

    /// The trap was dropped while a resolution was pending.
    #[error("trap closed before resolving")]
    Closed,
}

/// Result type for trap operations.
pub type TrapResult<T> = Result<T, TrapError>;
