//! Callable host functions.

use std::fmt;
use std::sync::Arc;

use crate::error::HostResult;
use crate::value::HostValue;

/// Native body of a host function: `(this, args) -> result`.
pub type NativeFn = dyn Fn(&HostValue, &[HostValue]) -> HostResult<HostValue> + Send + Sync;

/// A host function together with the `this` context it was bound to.
///
/// The host stores listeners as bound functions; invoking one goes through
/// the realm's call-forwarding primitive (see [`crate::Realm::invoke`]),
/// which normally runs the body with the captured context.
#[derive(Clone)]
pub struct HostFunction {
    name: Arc<str>,
    this: Arc<HostValue>,
    body: Arc<NativeFn>,
}

impl HostFunction {
    /// Create an unbound function.
    pub fn new<F>(name: impl Into<Arc<str>>, body: F) -> Self
    where
        F: Fn(&HostValue, &[HostValue]) -> HostResult<HostValue> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            this: Arc::new(HostValue::Undefined),
            body: Arc::new(body),
        }
    }

    /// Return a copy bound to `this`. The body is shared, so identity of the
    /// copy differs from the original only through its context.
    #[must_use]
    pub fn bind(&self, this: HostValue) -> Self {
        Self {
            name: Arc::clone(&self.name),
            this: Arc::new(this),
            body: Arc::clone(&self.body),
        }
    }

    /// Function name, for diagnostics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The captured `this` context.
    #[must_use]
    pub fn this(&self) -> &HostValue {
        &self.this
    }

    /// Run the body directly with the captured context.
    ///
    /// Host code should call through [`crate::Realm::invoke`] instead so the
    /// realm's call-forwarding primitive is honoured.
    ///
    /// # Errors
    ///
    /// Propagates whatever the body returns.
    pub fn call_direct(&self, args: &[HostValue]) -> HostResult<HostValue> {
        (self.body)(self.this.as_ref(), args)
    }

    /// Whether both handles share the same body and context.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.body, &other.body) && self.this == other.this
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunction")
            .field("name", &self.name)
            .field("this", &self.this)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bound_context_may_itself_be_a_function() {
        let inner = HostFunction::new("inner", |_, _| Ok(HostValue::Number(7.0)));
        let outer = HostFunction::new("outer", |this, _| {
            this.as_function()
                .map_or(Ok(HostValue::Undefined), |f| f.call_direct(&[]))
        })
        .bind(HostValue::Function(inner.clone()));

        assert!(outer.this().as_function().unwrap().ptr_eq(&inner));
        assert_eq!(outer.call_direct(&[]).unwrap(), HostValue::Number(7.0));
    }

    #[test]
    fn test_rebinding_changes_identity() {
        let f = HostFunction::new("f", |this, _| Ok(this.clone()));
        let a = f.bind(HostValue::Number(1.0));
        let b = f.bind(HostValue::Number(2.0));

        assert!(a.ptr_eq(&a.clone()));
        assert!(!a.ptr_eq(&b));
        assert_eq!(b.call_direct(&[]).unwrap(), HostValue::Number(2.0));
        assert_eq!(f.this(), &HostValue::Undefined);
    }
}
