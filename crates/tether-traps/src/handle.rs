//! Weak handles to located host objects.

use tether_core::{ObjectRef, WeakObjectRef};

/// Weak reference to a host-internal object found by a trap.
///
/// The handle never keeps the host object alive.
#[derive(Debug, Clone)]
pub struct TrapHandle(WeakObjectRef);

impl TrapHandle {
    /// Create a handle for `object`.
    #[must_use]
    pub fn new(object: &ObjectRef) -> Self {
        Self(object.downgrade())
    }

    /// The object, if the host still holds it.
    #[must_use]
    pub fn get(&self) -> Option<ObjectRef> {
        self.0.upgrade()
    }

    /// Whether the host has released the object.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.0.is_dangling()
    }
}

impl PartialEq for TrapHandle {
    fn eq(&self, other: &Self) -> bool {
        self.0.ptr_eq(&other.0)
    }
}

impl Eq for TrapHandle {}
