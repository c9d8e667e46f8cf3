//! Tether Traps - Runtime discovery of host-internal objects.
//!
//! The host never exposes its block-editor instance or its global state
//! store. This crate finds both without any cooperation from the host:
//!
//! - [`BlockEditorTrap`] overrides the realm's call-forwarding primitive for
//!   the duration of one call to recover the context bound to the engine's
//!   `EXTENSION_ADDED` listener, waiting on the slot if the host has not
//!   wired it yet.
//! - [`StoreTrap`] intercepts the store-enhancer composition global and
//!   injects a middleware that republishes every state transition.
//! - [`locate_store_in_dom`] is the on-demand fallback that walks UI fiber
//!   roots when interception was not possible.
//!
//! Every trap resolves at most once and caches its result.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod blocks;
mod config;
mod dom;
mod error;
mod handle;
mod store;

pub use blocks::BlockEditorTrap;
pub use config::DiscoveryConfig;
pub use dom::{ObjectStore, locate_store_in_dom};
pub use error::{TrapError, TrapResult};
pub use handle::TrapHandle;
pub use store::{StoreTrap, TrappedStore};
