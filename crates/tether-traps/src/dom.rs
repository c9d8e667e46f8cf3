//! Fallback discovery of the state store through the DOM.
//!
//! UI frameworks keep a reference to their fiber root on the container
//! element under a property whose name contains a marker. The store is
//! reachable from that root through the provider props, so a search from
//! every root finds it without any interception. This is expensive and only
//! used when interception was not possible.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tether_core::{Action, HostError, HostResult, HostValue, ObjectRef, Realm, Store};
use tracing::{debug, trace, warn};

use crate::config::DiscoveryConfig;

/// A state store backed by a host object exposing `getState` / `dispatch`
/// (or a `state` snapshot, as tooling layers publish it).
#[derive(Clone)]
pub struct ObjectStore {
    object: ObjectRef,
    realm: Arc<Realm>,
}

impl ObjectStore {
    /// Wrap a store-like host object.
    #[must_use]
    pub fn new(object: ObjectRef, realm: Arc<Realm>) -> Self {
        Self { object, realm }
    }

    /// The underlying host object.
    #[must_use]
    pub fn object(&self) -> &ObjectRef {
        &self.object
    }

    /// Read the state, preferring a live `getState` over a `state` snapshot.
    ///
    /// # Errors
    ///
    /// Propagates a failing `getState` call.
    pub fn try_get_state(&self) -> HostResult<HostValue> {
        match self.object.get("getState") {
            callee @ HostValue::Function(_) => self.realm.call_value(&callee, &[]),
            _ => Ok(self.object.get("state")),
        }
    }

    /// Dispatch through the object's `dispatch` member.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::MissingMember`] when there is no `dispatch`
    /// function, or whatever the call fails with.
    pub fn try_dispatch(&self, action: Action) -> HostResult<Action> {
        match self.object.get("dispatch") {
            callee @ HostValue::Function(_) => {
                self.realm
                    .call_value(&callee, &[HostValue::from_json(&action)])?;
                Ok(action)
            },
            _ => Err(HostError::MissingMember("dispatch".to_string())),
        }
    }
}

impl Store for ObjectStore {
    fn get_state(&self) -> HostValue {
        self.try_get_state().unwrap_or_else(|e| {
            warn!(error = %e, "host store getState failed");
            HostValue::Undefined
        })
    }

    fn dispatch(&self, action: Action) -> Action {
        match self.try_dispatch(action.clone()) {
            Ok(action) => action,
            Err(e) => {
                warn!(error = %e, "host store dispatch failed");
                action
            },
        }
    }
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("object", &self.object)
            .finish_non_exhaustive()
    }
}

/// Whether a state snapshot carries every marker path.
pub(crate) fn is_target_state(state: &HostValue, markers: &[String]) -> bool {
    !markers.is_empty() && markers.iter().all(|path| state.get_path(path).is_truthy())
}

/// Walk every DOM element's fiber root looking for the host state store.
///
/// Store-like objects whose state lacks the markers are near matches; they
/// are logged and the search continues. `None` means the store is not
/// reachable right now.
#[must_use]
pub fn locate_store_in_dom(realm: &Arc<Realm>, config: &DiscoveryConfig) -> Option<ObjectStore> {
    let roots: Vec<ObjectRef> = realm
        .document()
        .elements()
        .into_iter()
        .filter_map(|element| {
            let key = element
                .own_keys()
                .into_iter()
                .rfind(|key| key.contains(&config.fiber_root_marker))?;
            match element.get(&key) {
                HostValue::Object(root) => Some(root),
                _ => None,
            }
        })
        .collect();
    trace!(roots = roots.len(), "fiber roots collected");

    let locator = config.locator();
    let mut near_matches = HashSet::new();
    for root in roots {
        let found = locator.find(&HostValue::Object(root), |candidate| {
            let HostValue::Function(get_state) = candidate.get("getState") else {
                return false;
            };
            let state = match realm.invoke(&get_state, &[]) {
                Ok(state) => state,
                Err(e) => {
                    debug!(error = %e, "getState failed on candidate store");
                    return false;
                },
            };
            if is_target_state(&state, &config.state_markers) {
                return true;
            }
            if near_matches.insert(candidate.id()) {
                debug!(
                    state_keys = ?state.as_object().map(ObjectRef::own_keys),
                    "store-like object without the expected state shape"
                );
            }
            false
        });
        if let Some(object) = found {
            debug!(near_matches = near_matches.len(), "state store located in DOM");
            return Some(ObjectStore::new(object, Arc::clone(realm)));
        }
    }

    debug!(near_matches = near_matches.len(), "state store not reachable from DOM");
    None
}

/// Convenience for callers holding a JSON action.
pub(crate) fn describe_action(action: &Value) -> &str {
    action.get("type").and_then(Value::as_str).unwrap_or("<untyped>")
}
