//! Extension error types.

use tether_capabilities::CapabilityError;
use thiserror::Error;

/// Errors raised while preparing, registering or loading extensions.
#[derive(Debug, Error)]
pub enum ExtensionError {
    /// The extension id is not ASCII letters and digits.
    #[error("invalid extension id: {0:?}")]
    InvalidId(String),

    /// A callable block has no opcode.
    #[error("missing opcode for block")]
    MissingOpcode,

    /// A dynamic menu producer returned no items.
    #[error("extension menu returned no items: {method}")]
    EmptyMenu {
        /// Producer method name.
        method: String,
    },

    /// A method the host asked for does not exist on the extension.
    #[error("could not find extension function called {0}")]
    MethodMissing(String),

    /// An extension method failed.
    #[error("extension function {method} failed: {message}")]
    MethodFailed {
        /// Method name.
        method: String,
        /// Failure description.
        message: String,
    },

    /// `get_info()` returned something that is not a descriptor.
    #[error("malformed extension descriptor: {0}")]
    MalformedDescriptor(String),

    /// Loading an origin failed.
    #[error("failed to load extension from {origin}: {reason}")]
    LoadFailed {
        /// Load origin.
        origin: String,
        /// Failure description.
        reason: String,
    },

    /// Fetching extension source failed.
    #[error("failed to fetch {origin}: {message}")]
    Fetch {
        /// Load origin.
        origin: String,
        /// Failure description.
        message: String,
    },

    /// The host engine refused the prepared descriptor.
    #[error("engine rejected extension primitives: {0}")]
    Engine(String),

    /// A capability operation failed.
    #[error(transparent)]
    Capability(#[from] CapabilityError),
}

/// Result type for extension operations.
pub type ExtensionResult<T> = Result<T, ExtensionError>;
