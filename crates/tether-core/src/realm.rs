//! The host realm: global scope, call forwarding and interceptable slots.
//!
//! The realm models the process-wide singletons the discovery traps
//! temporarily mutate:
//!
//! - the **call-forwarding primitive** through which the host invokes its
//!   stored listener functions with their captured `this`;
//! - the **store-enhancer composition global** consulted by the host's store
//!   creation code.
//!
//! Both are mutated only through scoped or explicit operations that restore
//! the previous state.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::trace;

use crate::error::{HostError, HostResult};
use crate::function::HostFunction;
use crate::object::ObjectRef;
use crate::store::EnhancerComposer;
use crate::value::HostValue;

/// Mechanism through which the host invokes a stored function.
pub trait CallForwarder: Send + Sync {
    /// Invoke `function` with `args`.
    ///
    /// # Errors
    ///
    /// Returns whatever the forwarded call fails with.
    fn forward(&self, function: &HostFunction, args: &[HostValue]) -> HostResult<HostValue>;
}

/// Default forwarder: run the body with its captured context.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectCall;

impl CallForwarder for DirectCall {
    fn forward(&self, function: &HostFunction, args: &[HostValue]) -> HostResult<HostValue> {
        function.call_direct(args)
    }
}

/// Interception forwarder: return the captured context instead of calling.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaptureContext;

impl CallForwarder for CaptureContext {
    fn forward(&self, function: &HostFunction, _args: &[HostValue]) -> HostResult<HostValue> {
        Ok(function.this().clone())
    }
}

/// Getter/setter pair installed on a typed [`GlobalSlot`].
pub trait SlotAccessor<T>: Send + Sync {
    /// Produce the slot's value as seen by the host.
    fn get(&self) -> Option<T>;

    /// Receive an assignment made by the host.
    fn set(&self, value: T);
}

enum SlotState<T> {
    Value(Option<T>),
    Accessor(Arc<dyn SlotAccessor<T>>),
}

/// A typed realm global that can be intercepted with an accessor.
pub struct GlobalSlot<T> {
    state: RwLock<SlotState<T>>,
}

impl<T: Clone> GlobalSlot<T> {
    /// Create an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(SlotState::Value(None)),
        }
    }

    /// Read the slot, running the installed getter if intercepted.
    #[must_use]
    pub fn get(&self) -> Option<T> {
        let accessor = {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            match &*state {
                SlotState::Value(value) => return value.clone(),
                SlotState::Accessor(accessor) => Arc::clone(accessor),
            }
        };
        accessor.get()
    }

    /// Assign the slot, running the installed setter if intercepted.
    pub fn set(&self, value: T) {
        let accessor = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            match &mut *state {
                SlotState::Value(current) => {
                    *current = Some(value);
                    return;
                },
                SlotState::Accessor(accessor) => Arc::clone(accessor),
            }
        };
        accessor.set(value);
    }

    /// Install an accessor, returning the plain value it replaced.
    pub fn install_accessor(&self, accessor: Arc<dyn SlotAccessor<T>>) -> Option<T> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let previous = match &*state {
            SlotState::Value(value) => value.clone(),
            SlotState::Accessor(_) => None,
        };
        *state = SlotState::Accessor(accessor);
        previous
    }

    /// Turn the slot back into a plain value.
    pub fn restore(&self, value: Option<T>) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = SlotState::Value(value);
    }

    /// Whether an accessor is currently installed.
    #[must_use]
    pub fn is_intercepted(&self) -> bool {
        matches!(
            &*self.state.read().unwrap_or_else(PoisonError::into_inner),
            SlotState::Accessor(_)
        )
    }
}

impl<T: Clone> Default for GlobalSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for GlobalSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let intercepted = matches!(
            &*self.state.read().unwrap_or_else(PoisonError::into_inner),
            SlotState::Accessor(_)
        );
        f.debug_struct("GlobalSlot")
            .field("intercepted", &intercepted)
            .finish()
    }
}

/// The host page's document, as far as discovery needs it.
pub trait Document: Send + Sync {
    /// Current document location (used as the base for relative URLs).
    fn location(&self) -> String;

    /// Every element currently in the document, in tree order.
    fn elements(&self) -> Vec<ObjectRef>;
}

/// A [`Document`] whose contents are supplied by the adapter.
#[derive(Debug, Default)]
pub struct StaticDocument {
    location: RwLock<String>,
    elements: RwLock<Vec<ObjectRef>>,
}

impl StaticDocument {
    /// Create a document at `location` with no elements.
    #[must_use]
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: RwLock::new(location.into()),
            elements: RwLock::new(Vec::new()),
        }
    }

    /// Append an element.
    pub fn push_element(&self, element: ObjectRef) {
        self.elements
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(element);
    }

    /// Change the document location.
    pub fn set_location(&self, location: impl Into<String>) {
        *self.location.write().unwrap_or_else(PoisonError::into_inner) = location.into();
    }
}

impl Document for StaticDocument {
    fn location(&self) -> String {
        self.location
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn elements(&self) -> Vec<ObjectRef> {
        self.elements
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// The host's global scope.
pub struct Realm {
    window: ObjectRef,
    forwarder: RwLock<Arc<dyn CallForwarder>>,
    interception: Mutex<()>,
    composer: GlobalSlot<Arc<dyn EnhancerComposer>>,
    document: Arc<dyn Document>,
}

impl Realm {
    /// Create a realm around `document` with the default call forwarder.
    #[must_use]
    pub fn new(document: Arc<dyn Document>) -> Self {
        Self {
            window: ObjectRef::new(),
            forwarder: RwLock::new(Arc::new(DirectCall)),
            interception: Mutex::new(()),
            composer: GlobalSlot::new(),
            document,
        }
    }

    /// The global object.
    #[must_use]
    pub fn window(&self) -> &ObjectRef {
        &self.window
    }

    /// The document.
    #[must_use]
    pub fn document(&self) -> &Arc<dyn Document> {
        &self.document
    }

    /// The store-enhancer composition global.
    #[must_use]
    pub fn composer_slot(&self) -> &GlobalSlot<Arc<dyn EnhancerComposer>> {
        &self.composer
    }

    /// The call-forwarding primitive currently in effect.
    #[must_use]
    pub fn forwarder(&self) -> Arc<dyn CallForwarder> {
        Arc::clone(&self.forwarder.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Invoke a stored host function through the call-forwarding primitive.
    ///
    /// # Errors
    ///
    /// Returns whatever the forwarded call fails with.
    pub fn invoke(&self, function: &HostFunction, args: &[HostValue]) -> HostResult<HostValue> {
        self.forwarder().forward(function, args)
    }

    /// Invoke a value that is expected to be a function.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::NotCallable`] when `callee` is not a function.
    pub fn call_value(&self, callee: &HostValue, args: &[HostValue]) -> HostResult<HostValue> {
        match callee {
            HostValue::Function(function) => self.invoke(function, args),
            other => Err(HostError::NotCallable(other.type_name().to_owned())),
        }
    }

    /// Run `f` with `forwarder` temporarily installed as the call-forwarding
    /// primitive.
    ///
    /// The previous primitive is restored before this returns, including when
    /// `f` unwinds. Interceptions are serialized realm-wide, so `f` must not
    /// start another interception on the same realm.
    pub fn with_forwarder<R>(
        &self,
        forwarder: Arc<dyn CallForwarder>,
        f: impl FnOnce(&Self) -> R,
    ) -> R {
        let _serial = self
            .interception
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::replace(
            &mut *self.forwarder.write().unwrap_or_else(PoisonError::into_inner),
            forwarder,
        );
        let _restore = RestoreForwarder {
            slot: &self.forwarder,
            previous: Some(previous),
        };
        trace!("call-forwarding primitive overridden");
        f(self)
    }
}

impl fmt::Debug for Realm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Realm")
            .field("window", &self.window)
            .field("composer", &self.composer)
            .finish_non_exhaustive()
    }
}

struct RestoreForwarder<'a> {
    slot: &'a RwLock<Arc<dyn CallForwarder>>,
    previous: Option<Arc<dyn CallForwarder>>,
}

impl Drop for RestoreForwarder<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            *self.slot.write().unwrap_or_else(PoisonError::into_inner) = previous;
            trace!("call-forwarding primitive restored");
        }
    }
}
