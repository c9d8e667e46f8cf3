//! Engine intake for prepared descriptors.

use crate::metadata::PreparedDescriptor;

/// The part of the host engine that turns prepared descriptors into
/// palette entries and runnable primitives.
pub trait PrimitiveRegistrar: Send + Sync {
    /// Register a newly loaded extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the descriptor.
    fn register_extension_primitives(&self, info: &PreparedDescriptor) -> anyhow::Result<()>;

    /// Replace the primitives of an already registered extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the descriptor.
    fn refresh_extension_primitives(&self, info: &PreparedDescriptor) -> anyhow::Result<()>;
}
