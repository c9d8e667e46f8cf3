//! Prelude module - commonly used types for convenient import.
//!
//! Use `use tether_traps::prelude::*;` to import all essential types.

pub use crate::{
    BlockEditorTrap, DiscoveryConfig, StoreTrap, TrapError, TrapHandle, TrapResult, TrappedStore,
};
