//! State-store discovery through the enhancer composition hook.
//!
//! The host builds its store by asking the realm's composition global to
//! compose its enhancers. The trap installs an accessor on that global whose
//! getter hands out a composer injecting one extra middleware. That
//! middleware captures the store's `dispatch` / `getState` and republishes
//! every transition as [`TetherEvent::StateChanged`].

use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use tether_core::{
    Action, DefaultComposer, Dispatch, EnhancerComposer, GetState, HostError, HostValue,
    Middleware, MiddlewareApi, ObjectRef, Realm, SlotAccessor, Store, StoreEnhancer,
    apply_middleware, compose,
};
use tether_events::{EventBus, EventMetadata, EventReceiver, StateChange, StoreSource, TetherEvent};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::config::DiscoveryConfig;
use crate::dom::{ObjectStore, describe_action, locate_store_in_dom};
use crate::error::{TrapError, TrapResult};

/// Position at which the trap's middleware enhancer is inserted.
const MIDDLEWARE_POSITION: usize = 1;

/// State captured by the trap's middleware.
#[derive(Default)]
struct StoreCell {
    state: RwLock<HostValue>,
    dispatch: RwLock<Option<Dispatch>>,
    get_state: RwLock<Option<GetState>>,
}

impl StoreCell {
    fn reset(&self) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) =
            HostValue::Object(ObjectRef::new());
        *self.dispatch.write().unwrap_or_else(PoisonError::into_inner) = None;
        *self.get_state.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn wire(&self, api: &MiddlewareApi) {
        *self.dispatch.write().unwrap_or_else(PoisonError::into_inner) =
            Some(Arc::clone(&api.dispatch));
        *self.get_state.write().unwrap_or_else(PoisonError::into_inner) =
            Some(Arc::clone(&api.get_state));
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = (api.get_state)();
    }

    fn swap_state(&self, next: HostValue) -> HostValue {
        std::mem::replace(
            &mut *self.state.write().unwrap_or_else(PoisonError::into_inner),
            next,
        )
    }
}

#[derive(Clone)]
enum Backend {
    Intercepted(Arc<StoreCell>),
    Object(ObjectStore),
}

/// Live handle to the host's global state store.
#[derive(Clone)]
pub struct TrappedStore {
    backend: Backend,
    bus: EventBus,
    source: StoreSource,
}

impl TrappedStore {
    /// How the store was found.
    #[must_use]
    pub fn source(&self) -> StoreSource {
        self.source
    }

    /// The most recent state snapshot.
    #[must_use]
    pub fn state(&self) -> HostValue {
        match &self.backend {
            Backend::Intercepted(cell) => cell
                .state
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            Backend::Object(store) => store.get_state(),
        }
    }

    /// Whether the host has created the store and dispatch is usable.
    #[must_use]
    pub fn is_wired(&self) -> bool {
        match &self.backend {
            Backend::Intercepted(cell) => cell
                .dispatch
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .is_some(),
            Backend::Object(_) => true,
        }
    }

    /// Dispatch an action through the host store's full middleware chain.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::DispatchUnavailable`] when the host has composed
    /// its enhancers but not created the store yet, or the failure of an
    /// adopted store's `dispatch`.
    pub fn dispatch(&self, action: Action) -> TrapResult<Action> {
        match &self.backend {
            Backend::Intercepted(cell) => {
                let dispatch = cell
                    .dispatch
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone()
                    .ok_or(HostError::DispatchUnavailable)?;
                Ok(dispatch(action))
            },
            Backend::Object(store) => Ok(store.try_dispatch(action)?),
        }
    }

    /// Subscribe to state transitions.
    ///
    /// Only intercepted stores emit transitions; adopted stores publish
    /// through their own tooling layer.
    #[must_use]
    pub fn changes(&self) -> EventReceiver {
        self.bus.subscribe_type("state_changed")
    }
}

impl std::fmt::Debug for TrappedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrappedStore")
            .field("source", &self.source)
            .field("wired", &self.is_wired())
            .finish_non_exhaustive()
    }
}

/// Captures the host's global state store.
pub struct StoreTrap {
    realm: Arc<Realm>,
    config: DiscoveryConfig,
    bus: EventBus,
    cell: Arc<StoreCell>,
    installed: Mutex<bool>,
    newer_composer: RwLock<Option<Arc<dyn EnhancerComposer>>>,
    resolved: watch::Sender<Option<TrappedStore>>,
}

impl StoreTrap {
    /// Create a trap publishing state transitions on `bus`.
    #[must_use]
    pub fn new(realm: Arc<Realm>, config: DiscoveryConfig, bus: EventBus) -> Self {
        let (resolved, _) = watch::channel(None);
        Self {
            realm,
            config,
            bus,
            cell: Arc::new(StoreCell::default()),
            installed: Mutex::new(false),
            newer_composer: RwLock::new(None),
            resolved,
        }
    }

    /// Install the composition-hook interception. Idempotent.
    ///
    /// When a tooling layer has already captured the store, that store is
    /// adopted and no interception is installed.
    pub fn install(self: &Arc<Self>) {
        let mut installed = self.installed.lock().unwrap_or_else(PoisonError::into_inner);
        if *installed {
            return;
        }
        *installed = true;

        if let HostValue::Object(tooling) = self.realm.window().get(&self.config.tooling_global) {
            warn!(
                global = %self.config.tooling_global,
                "a tooling layer has already captured the state store; adopting it"
            );
            let store = ObjectStore::new(tooling, Arc::clone(&self.realm));
            self.resolve(TrappedStore {
                backend: Backend::Object(store),
                bus: self.bus.clone(),
                source: StoreSource::Tooling,
            });
            return;
        }

        let accessor = Arc::new(ComposerSlot {
            composer: Arc::new(TrapComposer {
                trap: Arc::downgrade(self),
            }),
            trap: Arc::downgrade(self),
        });
        let previous = self.realm.composer_slot().install_accessor(accessor);
        *self
            .newer_composer
            .write()
            .unwrap_or_else(PoisonError::into_inner) = previous;
        debug!("store-enhancer composition hook intercepted");
    }

    /// Remove the interception, restoring whatever composer the host last
    /// assigned, and forget the resolved store.
    pub fn uninstall(&self) {
        let mut installed = self.installed.lock().unwrap_or_else(PoisonError::into_inner);
        if !*installed {
            return;
        }
        if self.realm.composer_slot().is_intercepted() {
            let newer = self
                .newer_composer
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            self.realm.composer_slot().restore(newer);
        }
        *installed = false;
        self.resolved.send_replace(None);
        debug!("store-enhancer composition hook released");
    }

    /// The resolved store, if any.
    #[must_use]
    pub fn eager(&self) -> Option<TrappedStore> {
        self.resolved.borrow().clone()
    }

    /// Install (if needed) and wait for the host to compose its store.
    ///
    /// # Errors
    ///
    /// Returns [`TrapError::Closed`] if the trap is dropped while waiting.
    pub async fn get(self: &Arc<Self>) -> TrapResult<TrappedStore> {
        let mut receiver = self.resolved.subscribe();
        self.install();
        let store = receiver
            .wait_for(Option::is_some)
            .await
            .map_err(|_| TrapError::Closed)?
            .clone();
        store.ok_or(TrapError::Closed)
    }

    /// Synchronous fallback: look for the store through the DOM.
    ///
    /// Returns the resolved store when there is one. Otherwise a store found
    /// in the DOM is handed back without settling [`get`](Self::get), which
    /// keeps waiting for the host to compose. `None` means "try again later".
    #[must_use]
    pub fn locate_in_dom(&self) -> Option<TrappedStore> {
        if let Some(store) = self.eager() {
            return Some(store);
        }
        let store = locate_store_in_dom(&self.realm, &self.config)?;
        debug!("state store reached through the DOM");
        Some(TrappedStore {
            backend: Backend::Object(store),
            bus: self.bus.clone(),
            source: StoreSource::Dom,
        })
    }

    fn resolve(&self, store: TrappedStore) {
        let source = store.source;
        let first = self.resolved.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(store);
            true
        });
        if first {
            info!(?source, "state store located");
            self.bus.publish(TetherEvent::StoreResolved {
                metadata: EventMetadata::new("store_trap"),
                source,
            });
        }
    }

    /// Called each time the host composes enhancers through the hook.
    fn compose(&self, mut enhancers: Vec<StoreEnhancer>) -> StoreEnhancer {
        self.cell.reset();
        self.resolve(TrappedStore {
            backend: Backend::Intercepted(Arc::clone(&self.cell)),
            bus: self.bus.clone(),
            source: StoreSource::Interception,
        });

        let index = MIDDLEWARE_POSITION.min(enhancers.len());
        enhancers.insert(index, apply_middleware(vec![self.middleware()]));
        trace!(index, count = enhancers.len(), "trap middleware inserted");

        let newer = self
            .newer_composer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match newer {
            Some(composer) => composer.compose(enhancers),
            None => DefaultComposer.compose(enhancers),
        }
    }

    fn middleware(&self) -> Middleware {
        let cell = Arc::clone(&self.cell);
        let bus = self.bus.clone();
        Arc::new(move |api: MiddlewareApi| {
            cell.wire(&api);
            let cell = Arc::clone(&cell);
            let bus = bus.clone();
            let get_state = Arc::clone(&api.get_state);
            Arc::new(move |next: Dispatch| {
                let cell = Arc::clone(&cell);
                let bus = bus.clone();
                let get_state = Arc::clone(&get_state);
                Arc::new(move |action: Action| {
                    let returned = next(action.clone());
                    let next_state = get_state();
                    let previous = cell.swap_state(next_state.clone());
                    trace!(action = describe_action(&action), "state transition");
                    bus.publish(TetherEvent::StateChanged {
                        metadata: EventMetadata::new("store_trap"),
                        change: StateChange {
                            previous,
                            next: next_state,
                            action,
                        },
                    });
                    returned
                }) as Dispatch
            }) as Arc<dyn Fn(Dispatch) -> Dispatch + Send + Sync>
        })
    }
}

impl std::fmt::Debug for StoreTrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreTrap")
            .field("installed", &*self.installed.lock().unwrap_or_else(PoisonError::into_inner))
            .field("resolved", &self.resolved.borrow().is_some())
            .finish_non_exhaustive()
    }
}

/// Composer handed out by the intercepted composition global.
struct TrapComposer {
    trap: Weak<StoreTrap>,
}

impl EnhancerComposer for TrapComposer {
    fn compose(&self, enhancers: Vec<StoreEnhancer>) -> StoreEnhancer {
        match self.trap.upgrade() {
            Some(trap) => trap.compose(enhancers),
            None => compose(enhancers),
        }
    }
}

/// Accessor installed on the realm's composition global.
struct ComposerSlot {
    composer: Arc<TrapComposer>,
    trap: Weak<StoreTrap>,
}

impl SlotAccessor<Arc<dyn EnhancerComposer>> for ComposerSlot {
    fn get(&self) -> Option<Arc<dyn EnhancerComposer>> {
        Some(Arc::clone(&self.composer) as Arc<dyn EnhancerComposer>)
    }

    fn set(&self, value: Arc<dyn EnhancerComposer>) {
        if let Some(trap) = self.trap.upgrade() {
            debug!("host assigned a newer composer; delegating to it");
            *trap
                .newer_composer
                .write()
                .unwrap_or_else(PoisonError::into_inner) = Some(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tether_core::{HostFunction, Reducer, StaticDocument, create_host_store};

    fn realm() -> Arc<Realm> {
        Arc::new(Realm::new(Arc::new(StaticDocument::new("https://host.example/"))))
    }

    fn counter() -> Reducer {
        Arc::new(|state, action| {
            let n = match state.get("n") {
                HostValue::Number(n) => n,
                _ => 0.0,
            };
            if action.get("type").and_then(|t| t.as_str()) == Some("inc") {
                HostValue::from_json(&json!({"n": n + 1.0}))
            } else {
                state.clone()
            }
        })
    }

    fn number(state: &HostValue) -> f64 {
        match state.get("n") {
            HostValue::Number(n) => n,
            _ => f64::NAN,
        }
    }

    #[tokio::test]
    async fn test_resolves_on_composition_and_emits_ordered_changes() {
        let realm = realm();
        let bus = EventBus::new();
        let trap = Arc::new(StoreTrap::new(
            Arc::clone(&realm),
            DiscoveryConfig::default(),
            bus.clone(),
        ));
        trap.install();
        assert!(trap.eager().is_none());

        let host_store = create_host_store(
            &realm,
            counter(),
            HostValue::from_json(&json!({"n": 0.0})),
            vec![],
        );
        let trapped = trap.get().await.unwrap();
        assert_eq!(trapped.source(), StoreSource::Interception);
        assert!(trapped.is_wired());

        let mut changes = trapped.changes();
        host_store.dispatch(json!({"type": "inc"}));
        trapped.dispatch(json!({"type": "inc"})).unwrap();

        for (prev, next) in [(0.0, 1.0), (1.0, 2.0)] {
            let event = changes.recv().await.unwrap();
            let TetherEvent::StateChanged { change, .. } = &*event else {
                panic!("unexpected event {event:?}");
            };
            assert!((number(&change.previous) - prev).abs() < f64::EPSILON);
            assert!((number(&change.next) - next).abs() < f64::EPSILON);
            assert_eq!(change.action, json!({"type": "inc"}));
        }
        assert!((number(&trapped.state()) - 2.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_dom_lookup_leaves_interception_pending() {
        let document = Arc::new(StaticDocument::new("https://host.example/"));
        let realm = Arc::new(Realm::new(document.clone()));
        let state = HostValue::from_json(&json!({
            "scratchGui": {"vm": {}},
            "scratchPaint": {},
            "locales": {}
        }));
        let dom_store = ObjectRef::new();
        dom_store.set(
            "getState",
            HostValue::Function(HostFunction::new("getState", move |_, _| Ok(state.clone()))),
        );
        let root = ObjectRef::new();
        root.set("store", HostValue::Object(dom_store));
        let element = ObjectRef::new();
        element.set("__reactContainer$app", HostValue::Object(root));
        document.push_element(element);

        let trap = Arc::new(StoreTrap::new(
            Arc::clone(&realm),
            DiscoveryConfig::default(),
            EventBus::new(),
        ));
        let found = trap.locate_in_dom().unwrap();
        assert_eq!(found.source(), StoreSource::Dom);
        assert!(trap.eager().is_none());

        trap.install();
        let waiting = tokio::spawn({
            let trap = Arc::clone(&trap);
            async move { trap.get().await }
        });
        tokio::task::yield_now().await;
        let _host_store = create_host_store(
            &realm,
            counter(),
            HostValue::from_json(&json!({"n": 0.0})),
            vec![],
        );

        let trapped = waiting.await.unwrap().unwrap();
        assert_eq!(trapped.source(), StoreSource::Interception);
        assert_eq!(
            trap.locate_in_dom().map(|s| s.source()),
            Some(StoreSource::Interception)
        );
    }

    #[tokio::test]
    async fn test_delegates_to_host_assigned_composer() {
        struct Counting(Arc<Mutex<Vec<usize>>>);
        impl EnhancerComposer for Counting {
            fn compose(&self, enhancers: Vec<StoreEnhancer>) -> StoreEnhancer {
                self.0.lock().unwrap().push(enhancers.len());
                compose(enhancers)
            }
        }

        let realm = realm();
        let trap = Arc::new(StoreTrap::new(
            Arc::clone(&realm),
            DiscoveryConfig::default(),
            EventBus::new(),
        ));
        trap.install();

        let seen = Arc::new(Mutex::new(Vec::new()));
        realm
            .composer_slot()
            .set(Arc::new(Counting(Arc::clone(&seen))) as Arc<dyn EnhancerComposer>);
        assert!(realm.composer_slot().is_intercepted());

        let identity: StoreEnhancer = Arc::new(|create| create);
        let _store = create_host_store(
            &realm,
            counter(),
            HostValue::Undefined,
            vec![Arc::clone(&identity), identity],
        );
        assert_eq!(*seen.lock().unwrap(), vec![3]);
        assert!(trap.eager().is_some());
    }

    #[tokio::test]
    async fn test_adopts_tooling_store() {
        let realm = realm();
        let tooling = ObjectRef::new();
        tooling.set("state", HostValue::from_json(&json!({"n": 7.0})));
        tooling.set(
            "dispatch",
            HostValue::Function(HostFunction::new("dispatch", |_, _| Ok(HostValue::Undefined))),
        );
        realm
            .window()
            .set("__scratchAddonsRedux", HostValue::Object(tooling));

        let bus = EventBus::new();
        let mut resolved = bus.subscribe_type("store_resolved");
        let trap = Arc::new(StoreTrap::new(Arc::clone(&realm), DiscoveryConfig::default(), bus));
        let store = trap.get().await.unwrap();

        assert_eq!(store.source(), StoreSource::Tooling);
        assert!((number(&store.state()) - 7.0).abs() < f64::EPSILON);
        assert!(!realm.composer_slot().is_intercepted());
        assert!(resolved.try_recv().is_some());
    }

    #[tokio::test]
    async fn test_dispatch_before_store_creation_is_unavailable() {
        let realm = realm();
        let trap = Arc::new(StoreTrap::new(
            Arc::clone(&realm),
            DiscoveryConfig::default(),
            EventBus::new(),
        ));
        trap.install();

        let composer = realm.composer_slot().get().unwrap();
        let _enhancer = composer.compose(vec![]);
        let trapped = trap.eager().unwrap();
        assert!(!trapped.is_wired());
        assert!(matches!(
            trapped.dispatch(json!({"type": "inc"})),
            Err(TrapError::Host(HostError::DispatchUnavailable))
        ));
    }

    #[tokio::test]
    async fn test_install_is_idempotent_and_uninstall_restores() {
        let realm = realm();
        realm
            .composer_slot()
            .set(Arc::new(DefaultComposer) as Arc<dyn EnhancerComposer>);
        let trap = Arc::new(StoreTrap::new(
            Arc::clone(&realm),
            DiscoveryConfig::default(),
            EventBus::new(),
        ));
        trap.install();
        trap.install();
        assert!(realm.composer_slot().is_intercepted());

        trap.uninstall();
        assert!(!realm.composer_slot().is_intercepted());
        assert!(realm.composer_slot().get().is_some());
    }
}
