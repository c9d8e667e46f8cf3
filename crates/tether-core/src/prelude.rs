//! Prelude module - commonly used types for convenient import.
//!
//! Use `use tether_core::prelude::*;` to import all essential types.

// Errors
pub use crate::{HostError, HostResult};

// Object model
pub use crate::{Accessor, HostFunction, HostValue, ObjectRef, WeakObjectRef};

// Realm
pub use crate::{CallForwarder, Document, GlobalSlot, Realm};

// Discovery
pub use crate::{ObjectLocator, locate};

// Store model
pub use crate::{Action, Dispatch, EnhancerComposer, GetState, Store, StoreEnhancer};

// Engine and extension contracts
pub use crate::{
    ArgumentType, BlockType, Cast, EngineVm, ExtensionMethod, ExtensionObject, MethodLookup,
    ReporterScope, TargetType,
};
