//! Dynamic host values.
//!
//! A [`HostValue`] is anything a host-internal property can hold. Objects and
//! functions are shared references compared by identity; everything else is
//! a plain value.

use std::collections::HashSet;
use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::{Map, Number, Value};

use crate::function::HostFunction;
use crate::object::ObjectRef;

/// A value stored in the host's object graph.
#[derive(Clone, Default)]
pub enum HostValue {
    /// Absent value.
    #[default]
    Undefined,
    /// Explicit null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Number (host numbers are always doubles).
    Number(f64),
    /// String.
    String(String),
    /// Shared object (plain object or array).
    Object(ObjectRef),
    /// Callable host function.
    Function(HostFunction),
}

impl HostValue {
    /// Name of the value's type, as the host would report it.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null | Self::Object(_) => "object",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Function(_) => "function",
        }
    }

    /// Whether the value is `undefined` or `null`.
    #[must_use]
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    /// Host truthiness.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::String(s) => !s.is_empty(),
            Self::Object(_) | Self::Function(_) => true,
        }
    }

    /// Whether the value is an object.
    #[must_use]
    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    /// Borrow the object reference, if this is an object.
    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Borrow the function, if this is a function.
    #[must_use]
    pub fn as_function(&self) -> Option<&HostFunction> {
        match self {
            Self::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Borrow the string contents, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Read a property. Non-objects have no properties.
    #[must_use]
    pub fn get(&self, key: &str) -> HostValue {
        match self {
            Self::Object(o) => o.get(key),
            _ => Self::Undefined,
        }
    }

    /// Read a dot-separated property path (`scratchGui.vm`).
    #[must_use]
    pub fn get_path(&self, path: &str) -> HostValue {
        path.split('.')
            .filter(|segment| !segment.is_empty())
            .fold(self.clone(), |current, segment| current.get(segment))
    }

    /// Build a host value tree from JSON. Every JSON object or array becomes
    /// a fresh host object.
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => Self::String(s.clone()),
            Value::Array(items) => {
                Self::Object(ObjectRef::array(items.iter().map(Self::from_json).collect()))
            },
            Value::Object(map) => {
                let object = ObjectRef::new();
                for (key, child) in map {
                    object.set(key, Self::from_json(child));
                }
                Self::Object(object)
            },
        }
    }

    /// Snapshot the value as JSON.
    ///
    /// Functions and `undefined` become `null`, accessor properties are not
    /// read, and a reference back to an object already on the current path
    /// is cut to `null`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut path = HashSet::new();
        self.to_json_inner(&mut path)
    }

    fn to_json_inner(&self, path: &mut HashSet<usize>) -> Value {
        match self {
            Self::Undefined | Self::Null | Self::Function(_) => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Number::from_f64(*n).map_or(Value::Null, Value::Number),
            Self::String(s) => Value::String(s.clone()),
            Self::Object(object) => {
                if !path.insert(object.id()) {
                    return Value::Null;
                }
                let entries = object.data_entries();
                let json = if object.is_array() {
                    Value::Array(entries.iter().map(|(_, v)| v.to_json_inner(path)).collect())
                } else {
                    let mut map = Map::new();
                    for (key, child) in &entries {
                        map.insert(key.clone(), child.to_json_inner(path));
                    }
                    Value::Object(map)
                };
                path.remove(&object.id());
                json
            },
        }
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("Undefined"),
            Self::Null => f.write_str("Null"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Number(n) => write!(f, "Number({n})"),
            Self::String(s) => write!(f, "String({s:?})"),
            Self::Object(o) => write!(f, "Object(#{:x})", o.id()),
            Self::Function(func) => write!(f, "Function({})", func.name()),
        }
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            #[allow(clippy::float_cmp)]
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Function(a), Self::Function(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Serialize for HostValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<ObjectRef> for HostValue {
    fn from(value: ObjectRef) -> Self {
        Self::Object(value)
    }
}

impl From<HostFunction> for HostValue {
    fn from(value: HostFunction) -> Self {
        Self::Function(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_round_trip_preserves_shape() {
        let source = json!({"a": 1.0, "b": [true, "x"], "c": {"d": null}});
        let value = HostValue::from_json(&source);
        assert_eq!(value.to_json(), source);
    }

    #[test]
    fn test_get_path() {
        let value = HostValue::from_json(&json!({"scratchGui": {"vm": {"id": "vm"}}}));
        assert!(value.get_path("scratchGui.vm").is_object());
        assert!(value.get_path("scratchGui.missing").is_nullish());
        assert!(value.get_path("nope.deeper").is_nullish());
    }

    #[test]
    fn test_to_json_cuts_cycles() {
        let a = ObjectRef::new();
        let b = ObjectRef::new();
        a.set("b", HostValue::Object(b.clone()));
        b.set("a", HostValue::Object(a.clone()));
        assert_eq!(HostValue::Object(a).to_json(), json!({"b": {"a": null}}));
    }

    #[test]
    fn test_truthiness() {
        assert!(!HostValue::Undefined.is_truthy());
        assert!(!HostValue::from("").is_truthy());
        assert!(!HostValue::Number(f64::NAN).is_truthy());
        assert!(HostValue::Object(ObjectRef::new()).is_truthy());
    }

    #[test]
    fn test_identity_equality() {
        let a = ObjectRef::new();
        assert_eq!(HostValue::Object(a.clone()), HostValue::Object(a));
        assert_ne!(
            HostValue::Object(ObjectRef::new()),
            HostValue::Object(ObjectRef::new())
        );
    }
}
