//! Redux-style store model.
//!
//! The host builds its global state store by asking the realm's composition
//! global to compose a list of store enhancers. This module provides the
//! pieces of that pipeline: [`compose`], [`apply_middleware`] and
//! [`create_store`], along with the [`EnhancerComposer`] type stored in the
//! composition slot.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::warn;

use crate::realm::Realm;
use crate::value::HostValue;

/// A dispatched action.
pub type Action = serde_json::Value;

/// Dispatch function: forwards an action and returns it.
pub type Dispatch = Arc<dyn Fn(Action) -> Action + Send + Sync>;

/// State snapshot reader.
pub type GetState = Arc<dyn Fn() -> HostValue + Send + Sync>;

/// Pure state transition.
pub type Reducer = Arc<dyn Fn(&HostValue, &Action) -> HostValue + Send + Sync>;

/// Dispatch wrapper produced by a middleware for a given store.
pub type DispatchLayer = Arc<dyn Fn(Dispatch) -> Dispatch + Send + Sync>;

/// A middleware: given the store API, produce a dispatch wrapper.
pub type Middleware = Arc<dyn Fn(MiddlewareApi) -> DispatchLayer + Send + Sync>;

/// Store constructor: `(reducer, preloaded state) -> store`.
pub type StoreCreator = Arc<dyn Fn(Reducer, HostValue) -> Arc<dyn Store> + Send + Sync>;

/// Store enhancer: wraps a store constructor.
pub type StoreEnhancer = Arc<dyn Fn(StoreCreator) -> StoreCreator + Send + Sync>;

/// The `{dispatch, getState}` pair handed to each middleware.
#[derive(Clone)]
pub struct MiddlewareApi {
    /// Reads the current state.
    pub get_state: GetState,
    /// Dispatches through the full middleware chain.
    pub dispatch: Dispatch,
}

impl fmt::Debug for MiddlewareApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareApi").finish_non_exhaustive()
    }
}

/// A live state store.
pub trait Store: Send + Sync {
    /// Current state snapshot.
    fn get_state(&self) -> HostValue;

    /// Dispatch an action, returning it once processed.
    fn dispatch(&self, action: Action) -> Action;
}

/// The value held by the realm's store-enhancer composition global.
pub trait EnhancerComposer: Send + Sync {
    /// Compose `enhancers` into a single enhancer.
    fn compose(&self, enhancers: Vec<StoreEnhancer>) -> StoreEnhancer;
}

/// Plain right-to-left composition.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultComposer;

impl EnhancerComposer for DefaultComposer {
    fn compose(&self, enhancers: Vec<StoreEnhancer>) -> StoreEnhancer {
        compose(enhancers)
    }
}

/// Compose functions right to left: `compose([f, g])(x) == f(g(x))`.
///
/// An empty list yields the identity.
pub fn compose<T: 'static>(
    functions: Vec<Arc<dyn Fn(T) -> T + Send + Sync>>,
) -> Arc<dyn Fn(T) -> T + Send + Sync> {
    Arc::new(move |input| functions.iter().rev().fold(input, |acc, f| f(acc)))
}

struct BasicStore {
    reducer: Reducer,
    state: RwLock<HostValue>,
}

impl Store for BasicStore {
    fn get_state(&self) -> HostValue {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn dispatch(&self, action: Action) -> Action {
        // The reducer runs unlocked so it may read the store.
        let next = (self.reducer)(&self.get_state(), &action);
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = next;
        action
    }
}

fn base_creator() -> StoreCreator {
    Arc::new(|reducer, initial| {
        Arc::new(BasicStore {
            reducer,
            state: RwLock::new(initial),
        }) as Arc<dyn Store>
    })
}

/// Create a store, optionally through an enhancer.
pub fn create_store(
    reducer: Reducer,
    initial: HostValue,
    enhancer: Option<StoreEnhancer>,
) -> Arc<dyn Store> {
    match enhancer {
        Some(enhancer) => enhancer(base_creator())(reducer, initial),
        None => base_creator()(reducer, initial),
    }
}

/// Create a store the way the host does: compose `enhancers` through
/// whatever the realm's composition global currently yields.
pub fn create_host_store(
    realm: &Realm,
    reducer: Reducer,
    initial: HostValue,
    enhancers: Vec<StoreEnhancer>,
) -> Arc<dyn Store> {
    let composer = realm
        .composer_slot()
        .get()
        .unwrap_or_else(|| Arc::new(DefaultComposer));
    create_store(reducer, initial, Some(composer.compose(enhancers)))
}

struct EnhancedStore {
    inner: Arc<dyn Store>,
    dispatch: Dispatch,
}

impl Store for EnhancedStore {
    fn get_state(&self) -> HostValue {
        self.inner.get_state()
    }

    fn dispatch(&self, action: Action) -> Action {
        (self.dispatch)(action)
    }
}

/// Build an enhancer that routes dispatch through `middlewares`.
///
/// The first middleware sees actions first.
pub fn apply_middleware(middlewares: Vec<Middleware>) -> StoreEnhancer {
    Arc::new(move |create: StoreCreator| {
        let middlewares = middlewares.clone();
        Arc::new(move |reducer: Reducer, initial: HostValue| {
            let store = create(reducer, initial);

            let cell: Arc<RwLock<Option<Dispatch>>> = Arc::new(RwLock::new(None));
            let late = Arc::clone(&cell);
            let api = MiddlewareApi {
                get_state: {
                    let store = Arc::clone(&store);
                    Arc::new(move || store.get_state())
                },
                dispatch: Arc::new(move |action| {
                    let current = late.read().unwrap_or_else(PoisonError::into_inner).clone();
                    match current {
                        Some(dispatch) => dispatch(action),
                        None => {
                            warn!("dispatch called while middleware was being constructed");
                            action
                        },
                    }
                }),
            };

            let layers: Vec<DispatchLayer> = middlewares.iter().map(|m| m(api.clone())).collect();
            let base: Dispatch = {
                let store = Arc::clone(&store);
                Arc::new(move |action| store.dispatch(action))
            };
            let dispatch = compose(layers)(base);
            *cell.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&dispatch));

            Arc::new(EnhancedStore {
                inner: store,
                dispatch,
            }) as Arc<dyn Store>
        }) as StoreCreator
    })
}
