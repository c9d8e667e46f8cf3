//! Shared host objects with data and accessor properties.
//!
//! Objects keep their properties in insertion order so traversal order is
//! deterministic. A property is either a plain data slot or an [`Accessor`]
//! whose getter and setter run host-side logic. Accessors are how the
//! discovery traps observe the host writing a slot for the first time.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use crate::value::HostValue;

/// Getter/setter pair installed on an object property.
pub trait Accessor: Send + Sync {
    /// Produce the property's current value.
    fn get(&self) -> HostValue;

    /// Receive an assignment to the property.
    fn set(&self, value: HostValue);
}

#[derive(Clone)]
enum Slot {
    Data(HostValue),
    Accessor(Arc<dyn Accessor>),
}

#[derive(Clone)]
struct Property {
    key: String,
    slot: Slot,
    enumerable: bool,
}

#[derive(Default)]
struct HostObject {
    properties: Vec<Property>,
    is_array: bool,
}

impl HostObject {
    fn position(&self, key: &str) -> Option<usize> {
        self.properties.iter().position(|p| p.key == key)
    }
}

/// Shared, identity-compared reference to a host object.
#[derive(Clone, Default)]
pub struct ObjectRef(Arc<RwLock<HostObject>>);

impl ObjectRef {
    /// Create an empty plain object.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an array object with indexed entries.
    #[must_use]
    pub fn array(values: Vec<HostValue>) -> Self {
        let properties = values
            .into_iter()
            .enumerate()
            .map(|(index, value)| Property {
                key: index.to_string(),
                slot: Slot::Data(value),
                enumerable: true,
            })
            .collect();
        Self(Arc::new(RwLock::new(HostObject {
            properties,
            is_array: true,
        })))
    }

    /// Create a plain object from key/value pairs.
    #[must_use]
    pub fn from_entries<K: Into<String>>(entries: impl IntoIterator<Item = (K, HostValue)>) -> Self {
        let object = Self::new();
        for (key, value) in entries {
            object.set(&key.into(), value);
        }
        object
    }

    /// Stable identity of the referenced object.
    #[must_use]
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0).cast::<()>() as usize
    }

    /// Whether both references point at the same object.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Create a weak back-reference that does not keep the object alive.
    #[must_use]
    pub fn downgrade(&self) -> WeakObjectRef {
        WeakObjectRef(Arc::downgrade(&self.0))
    }

    /// Whether the object was created as an array.
    #[must_use]
    pub fn is_array(&self) -> bool {
        self.0.read().unwrap_or_else(PoisonError::into_inner).is_array
    }

    /// Whether the object has an own property with this key.
    #[must_use]
    pub fn has_own(&self, key: &str) -> bool {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .position(key)
            .is_some()
    }

    /// Read a property, running its getter if it is an accessor.
    #[must_use]
    pub fn get(&self, key: &str) -> HostValue {
        let slot = {
            let object = self.0.read().unwrap_or_else(PoisonError::into_inner);
            match object.position(key) {
                Some(index) => object.properties[index].slot.clone(),
                None => return HostValue::Undefined,
            }
        };
        // The getter runs without the object lock so it may touch this object.
        match slot {
            Slot::Data(value) => value,
            Slot::Accessor(accessor) => accessor.get(),
        }
    }

    /// Assign a property, running its setter if it is an accessor.
    ///
    /// A missing property is created as an enumerable data property.
    pub fn set(&self, key: &str, value: HostValue) {
        let accessor = {
            let mut object = self.0.write().unwrap_or_else(PoisonError::into_inner);
            match object.position(key) {
                Some(index) => match &mut object.properties[index].slot {
                    Slot::Accessor(accessor) => Arc::clone(accessor),
                    slot @ Slot::Data(_) => {
                        *slot = Slot::Data(value);
                        return;
                    },
                },
                None => {
                    object.properties.push(Property {
                        key: key.to_owned(),
                        slot: Slot::Data(value),
                        enumerable: true,
                    });
                    return;
                },
            }
        };
        accessor.set(value);
    }

    /// Define (or redefine) a plain data property.
    pub fn define_value(&self, key: &str, value: HostValue, enumerable: bool) {
        self.define(key, Slot::Data(value), enumerable);
    }

    /// Define (or redefine) an accessor property.
    ///
    /// Accessor properties are not enumerable, so traversals never run their
    /// getters.
    pub fn define_accessor(&self, key: &str, accessor: Arc<dyn Accessor>) {
        self.define(key, Slot::Accessor(accessor), false);
    }

    fn define(&self, key: &str, slot: Slot, enumerable: bool) {
        let mut object = self.0.write().unwrap_or_else(PoisonError::into_inner);
        let property = Property {
            key: key.to_owned(),
            slot,
            enumerable,
        };
        match object.position(key) {
            Some(index) => object.properties[index] = property,
            None => object.properties.push(property),
        }
    }

    /// Whether the property is currently an accessor.
    #[must_use]
    pub fn is_accessor(&self, key: &str) -> bool {
        let object = self.0.read().unwrap_or_else(PoisonError::into_inner);
        object
            .position(key)
            .is_some_and(|index| matches!(object.properties[index].slot, Slot::Accessor(_)))
    }

    /// Remove a property, returning whether it existed.
    pub fn delete(&self, key: &str) -> bool {
        let mut object = self.0.write().unwrap_or_else(PoisonError::into_inner);
        match object.position(key) {
            Some(index) => {
                object.properties.remove(index);
                true
            },
            None => false,
        }
    }

    /// Own enumerable property keys in insertion order.
    #[must_use]
    pub fn own_keys(&self) -> Vec<String> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .properties
            .iter()
            .filter(|p| p.enumerable)
            .map(|p| p.key.clone())
            .collect()
    }

    /// Own enumerable data properties in insertion order.
    ///
    /// Accessors are skipped so that reading the entries never has host
    /// side effects.
    #[must_use]
    pub fn data_entries(&self) -> Vec<(String, HostValue)> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .properties
            .iter()
            .filter(|p| p.enumerable)
            .filter_map(|p| match &p.slot {
                Slot::Data(value) => Some((p.key.clone(), value.clone())),
                Slot::Accessor(_) => None,
            })
            .collect()
    }

    /// Append a value to an array object.
    pub fn push(&self, value: HostValue) {
        let mut object = self.0.write().unwrap_or_else(PoisonError::into_inner);
        let key = object.properties.len().to_string();
        object.properties.push(Property {
            key,
            slot: Slot::Data(value),
            enumerable: true,
        });
    }

    /// Number of own properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .properties
            .len()
    }

    /// Whether the object has no own properties.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRef")
            .field("id", &format_args!("#{:x}", self.id()))
            .field("keys", &self.own_keys())
            .finish()
    }
}

/// Weak back-reference to a host object.
#[derive(Clone, Default)]
pub struct WeakObjectRef(Weak<RwLock<HostObject>>);

impl WeakObjectRef {
    /// Recover a strong reference if the host still holds the object.
    #[must_use]
    pub fn upgrade(&self) -> Option<ObjectRef> {
        self.0.upgrade().map(ObjectRef)
    }

    /// Whether the host has released the object.
    #[must_use]
    pub fn is_dangling(&self) -> bool {
        self.0.strong_count() == 0
    }

    /// Whether both weak references point at the same object.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for WeakObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakObjectRef")
            .field("dangling", &self.is_dangling())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        stored: Mutex<HostValue>,
        writes: Mutex<usize>,
    }

    impl Accessor for Recorder {
        fn get(&self) -> HostValue {
            self.stored.lock().unwrap().clone()
        }

        fn set(&self, value: HostValue) {
            *self.stored.lock().unwrap() = value;
            let mut writes = self.writes.lock().unwrap();
            *writes = writes.saturating_add(1);
        }
    }

    #[test]
    fn test_set_creates_enumerable_property() {
        let object = ObjectRef::new();
        object.set("a", HostValue::from("x"));
        assert_eq!(object.own_keys(), vec!["a".to_owned()]);
        assert_eq!(object.get("a"), HostValue::from("x"));
    }

    #[test]
    fn test_accessor_intercepts_assignment() {
        let object = ObjectRef::new();
        let recorder = Arc::new(Recorder {
            stored: Mutex::new(HostValue::Undefined),
            writes: Mutex::new(0),
        });
        object.define_accessor("slot", recorder.clone());

        object.set("slot", HostValue::Bool(true));
        assert_eq!(object.get("slot"), HostValue::Bool(true));
        assert_eq!(*recorder.writes.lock().unwrap(), 1);
        assert!(object.is_accessor("slot"));
        assert!(object.own_keys().is_empty());
    }

    #[test]
    fn test_setter_may_redefine_its_own_property() {
        struct OneShot(ObjectRef);
        impl Accessor for OneShot {
            fn get(&self) -> HostValue {
                HostValue::Undefined
            }
            fn set(&self, value: HostValue) {
                self.0.define_value("slot", value, true);
            }
        }

        let object = ObjectRef::new();
        object.define_accessor("slot", Arc::new(OneShot(object.clone())));
        object.set("slot", HostValue::Number(3.0));

        assert!(!object.is_accessor("slot"));
        assert_eq!(object.get("slot"), HostValue::Number(3.0));
    }

    #[test]
    fn test_weak_reference_does_not_own() {
        let object = ObjectRef::new();
        let weak = object.downgrade();
        assert!(weak.upgrade().is_some());
        drop(object);
        assert!(weak.is_dangling());
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_array_push_and_entries() {
        let array = ObjectRef::array(vec![HostValue::Number(1.0)]);
        array.push(HostValue::Number(2.0));
        assert!(array.is_array());
        let keys: Vec<_> = array.data_entries().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["0", "1"]);
    }
}
