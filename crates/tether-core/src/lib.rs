//! Tether Core - Host object model and shared contracts.
//!
//! This crate provides:
//! - A reflective host object model (`HostValue`, `ObjectRef`, accessors)
//! - The host `Realm` with its call-forwarding primitive and composition slot
//! - The object locator used by the discovery traps
//! - A minimal redux-style store model (`compose`, `apply_middleware`)
//! - Engine enumerations and the `Cast` utility handed to extensions
//! - Narrow interfaces for the host engine and extension objects
//!
//! # Architecture
//!
//! The host application is never owned by Tether. Everything in this crate
//! either describes the shape of host-internal objects or provides an
//! explicit extension point an adapter uses to expose them:
//!
//! ```text
//! Realm
//! ├── window: ObjectRef              (global object)
//! ├── forwarder: CallForwarder       (how stored listeners are invoked)
//! ├── composer: GlobalSlot<...>      (store-enhancer composition global)
//! └── document: Document             (DOM element enumeration, location)
//! ```
//!
//! # Example
//!
//! ```rust
//! use tether_core::{HostValue, ObjectRef, locate};
//!
//! let editor = ObjectRef::new();
//! let context = ObjectRef::new();
//! context.set("ScratchBlocks", HostValue::Object(editor.clone()));
//!
//! let root = ObjectRef::new();
//! root.set("child", HostValue::Object(context.clone()));
//!
//! let found = locate(&HostValue::Object(root), |o| o.has_own("ScratchBlocks"));
//! assert!(found.is_some_and(|o| o.ptr_eq(&context)));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod cast;
pub mod engine;
pub mod enums;
pub mod error;
pub mod extension;
pub mod function;
pub mod locate;
pub mod object;
pub mod realm;
pub mod store;
pub mod value;

pub use cast::{Cast, ListIndex};
pub use engine::EngineVm;
pub use enums::{ArgumentType, BlockType, ReporterScope, TargetType};
pub use error::{HostError, HostResult};
pub use extension::{ExtensionMethod, ExtensionObject, MethodLookup};
pub use function::HostFunction;
pub use locate::{ObjectLocator, locate};
pub use object::{Accessor, ObjectRef, WeakObjectRef};
pub use realm::{
    CallForwarder, CaptureContext, DirectCall, Document, GlobalSlot, Realm, SlotAccessor,
    StaticDocument,
};
pub use store::{
    Action, DefaultComposer, Dispatch, DispatchLayer, EnhancerComposer, GetState, Middleware,
    MiddlewareApi, Reducer, Store, StoreCreator, StoreEnhancer, apply_middleware, compose,
    create_host_store, create_store,
};
pub use value::HostValue;
