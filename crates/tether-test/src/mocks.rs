//! Mock implementations for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tether_capabilities::{FetchResponse, HostServices};
use tether_core::{
    EngineVm, ExtensionMethod, ExtensionObject, HostValue, MethodLookup, ObjectRef,
};
use tether_events::{EventBus, EventMetadata, TetherEvent};
use tether_extensions::{
    ExtensionError, ExtensionResult, InjectedScript, InjectionHandle, PreparedDescriptor,
    PrimitiveRegistrar, ScriptHost, SourceFetcher,
};
use url::Url;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Mock host engine.
///
/// Records every descriptor forwarded to it and can publish locale changes
/// on an attached bus.
pub struct MockEngine {
    events: ObjectRef,
    locale: RwLock<String>,
    editing_target: RwLock<Option<String>>,
    bus: Option<EventBus>,
    reject: Mutex<Option<String>>,
    registered: Mutex<Vec<PreparedDescriptor>>,
    refreshed: Mutex<Vec<PreparedDescriptor>>,
}

impl MockEngine {
    /// Create an engine in locale `en`, editing `stage`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: ObjectRef::new(),
            locale: RwLock::new("en".to_string()),
            editing_target: RwLock::new(Some("stage".to_string())),
            bus: None,
            reject: Mutex::new(None),
            registered: Mutex::new(Vec::new()),
            refreshed: Mutex::new(Vec::new()),
        }
    }

    /// Start in `locale`.
    #[must_use]
    pub fn with_locale(self, locale: impl Into<String>) -> Self {
        *self.locale.write().unwrap_or_else(PoisonError::into_inner) = locale.into();
        self
    }

    /// Publish locale changes on `bus`.
    #[must_use]
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Switch locale and publish [`TetherEvent::LocaleChanged`].
    pub fn set_locale(&self, locale: impl Into<String>) {
        let locale = locale.into();
        *self.locale.write().unwrap_or_else(PoisonError::into_inner) = locale.clone();
        if let Some(bus) = &self.bus {
            bus.publish(TetherEvent::LocaleChanged {
                metadata: EventMetadata::new("mock-engine"),
                locale,
            });
        }
    }

    /// Change the target being edited.
    pub fn set_editing_target(&self, target: Option<&str>) {
        *self
            .editing_target
            .write()
            .unwrap_or_else(PoisonError::into_inner) = target.map(str::to_string);
    }

    /// Make registration fail with `reason` (`None` accepts again).
    pub fn reject_registrations(&self, reason: Option<&str>) {
        *lock(&self.reject) = reason.map(str::to_string);
    }

    /// Descriptors passed to `register_extension_primitives`.
    #[must_use]
    pub fn registered(&self) -> Vec<PreparedDescriptor> {
        lock(&self.registered).clone()
    }

    /// Descriptors passed to `refresh_extension_primitives`.
    #[must_use]
    pub fn refreshed(&self) -> Vec<PreparedDescriptor> {
        lock(&self.refreshed).clone()
    }

    /// Ids of registered extensions, in order.
    #[must_use]
    pub fn registered_ids(&self) -> Vec<String> {
        lock(&self.registered).iter().map(|d| d.id.clone()).collect()
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockEngine")
            .field("locale", &self.locale())
            .field("registered", &self.registered_ids())
            .finish_non_exhaustive()
    }
}

impl EngineVm for MockEngine {
    fn locale(&self) -> String {
        self.locale
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn events(&self) -> ObjectRef {
        self.events.clone()
    }

    fn editing_target_id(&self) -> Option<String> {
        self.editing_target
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl PrimitiveRegistrar for MockEngine {
    fn register_extension_primitives(&self, info: &PreparedDescriptor) -> anyhow::Result<()> {
        if let Some(reason) = lock(&self.reject).clone() {
            anyhow::bail!(reason);
        }
        lock(&self.registered).push(info.clone());
        Ok(())
    }

    fn refresh_extension_primitives(&self, info: &PreparedDescriptor) -> anyhow::Result<()> {
        lock(&self.refreshed).push(info.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Script host
// ---------------------------------------------------------------------------

/// What the mock script host does with an injected script.
#[derive(Clone)]
pub enum ScriptBehaviour {
    /// Call `register` with this extension.
    Register(Arc<dyn ExtensionObject>),
    /// Report a script error before registering.
    Fail(String),
    /// Refuse to create the context.
    Reject(String),
}

impl std::fmt::Debug for ScriptBehaviour {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Register(ext) => f
                .debug_tuple("Register")
                .field(&ext.get_info().get("id"))
                .finish(),
            Self::Fail(msg) => f.debug_tuple("Fail").field(msg).finish(),
            Self::Reject(msg) => f.debug_tuple("Reject").field(msg).finish(),
        }
    }
}

/// Mock script host with scripted behaviour per origin.
///
/// Origins without a scripted behaviour use the default behaviour, which
/// is how `data:` loads are driven.
#[derive(Debug, Default)]
pub struct MockScriptHost {
    behaviours: Mutex<HashMap<String, ScriptBehaviour>>,
    fallback: Mutex<Option<ScriptBehaviour>>,
    injected: Mutex<Vec<(String, String)>>,
    injections: AtomicUsize,
    disposals: AtomicUsize,
}

impl MockScriptHost {
    /// Create a host with no scripted behaviour.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script `behaviour` for `origin`.
    #[must_use]
    pub fn with_behaviour(self, origin: impl Into<String>, behaviour: ScriptBehaviour) -> Self {
        lock(&self.behaviours).insert(origin.into(), behaviour);
        self
    }

    /// Use `behaviour` for origins without their own.
    #[must_use]
    pub fn with_default_behaviour(self, behaviour: ScriptBehaviour) -> Self {
        *lock(&self.fallback) = Some(behaviour);
        self
    }

    /// Number of `inject` calls.
    #[must_use]
    pub fn injections(&self) -> usize {
        self.injections.load(Ordering::SeqCst)
    }

    /// Number of `dispose` calls.
    #[must_use]
    pub fn disposals(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }

    /// `(origin, wrapped source)` of every injected script.
    #[must_use]
    pub fn injected(&self) -> Vec<(String, String)> {
        lock(&self.injected).clone()
    }

    fn behaviour_for(&self, origin: &str) -> Option<ScriptBehaviour> {
        lock(&self.behaviours)
            .get(origin)
            .cloned()
            .or_else(|| lock(&self.fallback).clone())
    }
}

impl ScriptHost for MockScriptHost {
    fn inject(&self, script: InjectedScript) -> anyhow::Result<InjectionHandle> {
        self.injections.fetch_add(1, Ordering::SeqCst);
        lock(&self.injected).push((script.origin.clone(), script.source.clone()));

        match self.behaviour_for(&script.origin) {
            Some(ScriptBehaviour::Register(extension)) => {
                // A rejected registration has already failed the load.
                if let Err(e) = script.surface.register(extension) {
                    tracing::debug!(error = %e, "mock registration rejected");
                }
            },
            Some(ScriptBehaviour::Fail(message)) => script.reporter.fail(message),
            Some(ScriptBehaviour::Reject(message)) => anyhow::bail!(message),
            None => script.reporter.fail("no behaviour scripted for origin"),
        }
        Ok(InjectionHandle::new())
    }

    fn dispose(&self, _handle: InjectionHandle) {
        self.disposals.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// Mock source fetcher serving in-memory sources.
#[derive(Debug, Default)]
pub struct MockFetcher {
    sources: Mutex<HashMap<String, String>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockFetcher {
    /// Create a fetcher with no sources.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `source` for `url`.
    #[must_use]
    pub fn with_source(self, url: impl Into<String>, source: impl Into<String>) -> Self {
        lock(&self.sources).insert(url.into(), source.into());
        self
    }

    /// Wait `delay` before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of fetches.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceFetcher for MockFetcher {
    async fn fetch_source(&self, url: &str) -> ExtensionResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }
        lock(&self.sources)
            .get(url)
            .cloned()
            .ok_or_else(|| ExtensionError::Fetch {
                origin: url.to_string(),
                message: "404 Not Found".to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// Host services
// ---------------------------------------------------------------------------

/// Mock host services recording every call.
#[derive(Debug, Default)]
pub struct MockServices {
    fetched: Mutex<Vec<String>>,
    opened: Mutex<Vec<(String, String, String)>>,
    navigated: Mutex<Vec<String>>,
}

impl MockServices {
    /// Create a recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetched URLs.
    #[must_use]
    pub fn fetched(&self) -> Vec<String> {
        lock(&self.fetched).clone()
    }

    /// `(url, target, features)` of every opened window.
    #[must_use]
    pub fn opened(&self) -> Vec<(String, String, String)> {
        lock(&self.opened).clone()
    }

    /// Navigation targets.
    #[must_use]
    pub fn navigated(&self) -> Vec<String> {
        lock(&self.navigated).clone()
    }
}

#[async_trait]
impl HostServices for MockServices {
    async fn fetch(&self, url: &Url) -> anyhow::Result<FetchResponse> {
        lock(&self.fetched).push(url.to_string());
        Ok(FetchResponse {
            status: 200,
            url: url.to_string(),
            body: Vec::new(),
        })
    }

    fn open_window(&self, url: &str, target: &str, features: &str) -> HostValue {
        lock(&self.opened).push((url.to_string(), target.to_string(), features.to_string()));
        HostValue::Null
    }

    fn navigate(&self, url: &str) {
        lock(&self.navigated).push(url.to_string());
    }
}

// ---------------------------------------------------------------------------
// Extensions
// ---------------------------------------------------------------------------

/// Extension object built from a descriptor and closures.
pub struct StaticExtension {
    info: RwLock<Value>,
    methods: RwLock<HashMap<String, ExtensionMethod>>,
    calls: Arc<Mutex<Vec<(String, Vec<Value>)>>>,
}

impl StaticExtension {
    /// Create an extension describing itself with `info`.
    #[must_use]
    pub fn new(info: Value) -> Self {
        Self {
            info: RwLock::new(info),
            methods: RwLock::new(HashMap::new()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add a method.
    #[must_use]
    pub fn with_method<F>(self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.define_method(name, body);
        self
    }

    /// Add or replace a method after construction.
    pub fn define_method<F>(&self, name: impl Into<String>, body: F)
    where
        F: Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.methods
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), ExtensionMethod::new(body));
    }

    /// Replace the descriptor returned by `get_info`.
    pub fn set_info(&self, info: Value) {
        *self.info.write().unwrap_or_else(PoisonError::into_inner) = info;
    }

    /// `(method, args)` of every method call, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<(String, Vec<Value>)> {
        lock(&self.calls).clone()
    }

    /// Convert into the trait object the loader expects.
    #[must_use]
    pub fn into_object(self) -> Arc<dyn ExtensionObject> {
        Arc::new(self)
    }
}

impl std::fmt::Debug for StaticExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticExtension")
            .field("info", &self.get_info())
            .finish_non_exhaustive()
    }
}

impl ExtensionObject for StaticExtension {
    fn get_info(&self) -> Value {
        self.info
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn method(&self, name: &str) -> MethodLookup {
        let found = self
            .methods
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();
        match found {
            Some(method) => {
                let name = name.to_string();
                let calls = Arc::clone(&self.calls);
                MethodLookup::Callable(ExtensionMethod::new(move |args| {
                    lock(&calls).push((name.clone(), args.to_vec()));
                    method.call(args)
                }))
            },
            None => MethodLookup::Missing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_static_extension_methods() {
        let ext = StaticExtension::new(json!({"id": "demo"}))
            .with_method("echo", |args| Ok(Value::Array(args.to_vec())));

        assert_eq!(ext.get_info()["id"], "demo");
        assert!(!ext.method("missing").is_callable());
        let method = ext.method("echo").into_method().unwrap();
        assert_eq!(method.call(&[json!(1)]).unwrap(), json!([1]));
    }

    #[test]
    fn test_engine_records_and_rejects() {
        let engine = MockEngine::new();
        let info = PreparedDescriptor {
            id: "demo".to_string(),
            name: json!("Demo"),
            blocks: Vec::new(),
            menus: Vec::new(),
            target_types: Vec::new(),
            extra: serde_json::Map::new(),
        };
        engine.register_extension_primitives(&info).unwrap();
        engine.reject_registrations(Some("full"));
        assert!(engine.register_extension_primitives(&info).is_err());
        assert_eq!(engine.registered_ids(), ["demo"]);
    }

    #[test]
    fn test_engine_publishes_locale_changes() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let engine = MockEngine::new().with_event_bus(bus);
        engine.set_locale("de");
        assert_eq!(engine.locale(), "de");
        assert_eq!(rx.try_recv().unwrap().event_type(), "locale_changed");
    }

    #[tokio::test]
    async fn test_fetcher_counts_and_misses() {
        let fetcher = MockFetcher::new().with_source("https://x/a.js", "code");
        assert_eq!(fetcher.fetch_source("https://x/a.js").await.unwrap(), "code");
        assert!(fetcher.fetch_source("https://x/b.js").await.is_err());
        assert_eq!(fetcher.calls(), 2);
    }
}
