//! Extension objects as seen by the host.
//!
//! Extensions are duck-typed in the host: the engine calls methods on them by
//! name. [`ExtensionObject::method`] makes that lookup explicit, returning
//! [`MethodLookup::Missing`] instead of failing at the call site.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

type MethodBody = dyn Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync;

/// A callable extension method.
#[derive(Clone)]
pub struct ExtensionMethod {
    body: Arc<MethodBody>,
}

impl ExtensionMethod {
    /// Wrap a closure as a method.
    pub fn new<F>(body: F) -> Self
    where
        F: Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self {
            body: Arc::new(body),
        }
    }

    /// Invoke the method.
    ///
    /// # Errors
    ///
    /// Returns whatever the extension's method fails with.
    pub fn call(&self, args: &[Value]) -> anyhow::Result<Value> {
        (self.body)(args)
    }
}

impl fmt::Debug for ExtensionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionMethod").finish_non_exhaustive()
    }
}

/// Outcome of looking a method up by name.
#[derive(Debug, Clone)]
pub enum MethodLookup {
    /// The extension exposes a callable with this name.
    Callable(ExtensionMethod),
    /// No callable with this name (yet).
    Missing,
}

impl MethodLookup {
    /// Whether the lookup found a callable.
    #[must_use]
    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Callable(_))
    }

    /// Convert into an `Option`.
    #[must_use]
    pub fn into_method(self) -> Option<ExtensionMethod> {
        match self {
            Self::Callable(method) => Some(method),
            Self::Missing => None,
        }
    }
}

/// An extension registered through the capability surface.
pub trait ExtensionObject: Send + Sync {
    /// Self-declared metadata, read live on every call.
    fn get_info(&self) -> Value;

    /// Look up a method by name.
    fn method(&self, name: &str) -> MethodLookup;
}
