#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
//! Tether Extensions - preparing, registering and loading extensions.
//!
//! An extension is loaded from an origin (a URL or a `data:` URL). The
//! [`ExtensionLoader`] fetches its source, runs it through a [`ScriptHost`]
//! with a fresh capability surface, and on `register` prepares the
//! extension's descriptor with the [`Normalizer`] and hands it to the
//! engine's [`PrimitiveRegistrar`].
//!
//! [`TetherContext`] wires all of this together with the discovery traps.
//!
//! # Example
//!
//! ```rust
//! use tether_extensions::{sanitize, validate_id};
//!
//! assert!(validate_id("pen2").is_ok());
//! assert!(validate_id("my-ext").is_err());
//! assert_eq!(sanitize("say<\"hi\">"), "sayhi>");
//! ```

pub mod prelude;

mod context;
mod engine;
mod error;
mod loader;
mod metadata;
mod normalize;
mod registry;
mod script;
mod source;

pub use context::{TetherContext, TetherContextBuilder};
pub use engine::PrimitiveRegistrar;
pub use error::{ExtensionError, ExtensionResult};
pub use loader::{ExtensionLoader, LoaderConfig, SurfaceFactory};
pub use metadata::{
    BlockFunction, BlockHandler, ButtonCallback, MenuItem, MenuItems, MenuProducer, PreparedBlock,
    PreparedBlockInfo, PreparedDescriptor, PreparedMenu, SEPARATOR,
};
pub use normalize::{Normalizer, PREDEFINED_CALLBACK_KEYS, sanitize, validate_id};
pub use registry::{ExtensionRegistry, LoadedExtension};
pub use script::{
    InjectedScript, InjectionHandle, LoadOutcome, ScriptHost, ScriptReporter, wrap_source,
};
pub use source::{HttpFetcher, SourceFetcher, decode_data_url, to_data_url};
