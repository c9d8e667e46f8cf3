//! Commonly used capability types.
//!
//! ```rust
//! use tether_capabilities::prelude::*;
//! ```

pub use crate::{
    AllowAllPolicy, CapabilityError, CapabilityResult, CapabilitySurface, ConfiguredPolicy,
    DenyAllPolicy, FetchResponse, HostServices, PermissionPolicy, Translator,
};
