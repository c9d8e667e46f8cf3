//! Commonly used extension types.
//!
//! ```rust
//! use tether_extensions::prelude::*;
//! ```

pub use crate::{
    BlockHandler, ExtensionError, ExtensionLoader, ExtensionRegistry, ExtensionResult,
    LoadedExtension, MenuItems, Normalizer, PreparedDescriptor, PrimitiveRegistrar, ScriptHost,
    SourceFetcher, TetherContext,
};
