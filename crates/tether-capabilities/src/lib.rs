#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
//! Tether Capabilities - what an extension can reach.
//!
//! Every extension load gets a fresh [`CapabilitySurface`]. It carries the
//! engine enumerations, the [`tether_core::Cast`] helper and a
//! [`Translator`], gates side effects (fetch, window opening, navigation)
//! behind a [`PermissionPolicy`], and exposes the discovery traps so an
//! extension can reach the block editor and the state store.
//!
//! # Example
//!
//! ```rust
//! use tether_capabilities::{ConfiguredPolicy, PermissionPolicy};
//! use tether_config::PermissionsSection;
//!
//! # async fn example() {
//! let policy = ConfiguredPolicy::new(PermissionsSection {
//!     fetch_domains: vec!["extensions.example".to_string()],
//!     ..PermissionsSection::default()
//! });
//! let url = url::Url::parse("https://cdn.extensions.example/a.js").unwrap();
//! assert!(policy.can_fetch(&url).await);
//! # }
//! ```

pub mod prelude;

mod error;
mod host;
mod l10n;
mod policy;
mod surface;

pub use error::{CapabilityError, CapabilityResult};
pub use host::{FetchResponse, HostServices};
pub use l10n::{Message, Translator};
pub use policy::{AllowAllPolicy, ConfiguredPolicy, DenyAllPolicy, PermissionPolicy};
pub use surface::{CapabilitySurface, Gui, RegisterHook};
