//! Extension loader.
//!
//! A load fetches the source, builds a fresh [`CapabilitySurface`], hands
//! the wrapped source to the [`ScriptHost`] and waits for the script to
//! call `register`. Registration prepares the descriptor, forwards it to the
//! engine and records it in the [`ExtensionRegistry`]. The injected context
//! is torn down whatever the outcome.
//!
//! Concurrent loads of one origin share a single in-flight operation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tether_capabilities::{CapabilitySurface, RegisterHook, Translator};
use tether_config::LoaderSection;
use tether_core::{EngineVm, ExtensionObject};
use tether_events::{EventBus, EventMetadata, TetherEvent};
use tether_telemetry::{LoadContext, LoadGuard};
use tokio::sync::watch;
use tracing::{Instrument, debug, error, info, warn};

use crate::engine::PrimitiveRegistrar;
use crate::error::{ExtensionError, ExtensionResult};
use crate::normalize::Normalizer;
use crate::registry::{ExtensionRegistry, LoadedExtension};
use crate::script::{
    InjectedScript, LoadOutcome, LoadSignal, ScriptHost, ScriptReporter, wrap_source,
};
use crate::source::{SourceFetcher, decode_data_url, to_data_url};

/// Builds the surface handed to each load.
pub type SurfaceFactory = Arc<dyn Fn() -> CapabilitySurface + Send + Sync>;

/// Loader settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Id of the container element the wrapped source reads `Scratch` from.
    pub container_id: String,
    /// Ask for uncached source.
    pub no_cache: bool,
    /// User agent for source requests.
    pub user_agent: String,
}

impl From<&LoaderSection> for LoaderConfig {
    fn from(section: &LoaderSection) -> Self {
        Self {
            container_id: section.container_id.clone(),
            no_cache: section.no_cache,
            user_agent: section.user_agent.clone(),
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self::from(&LoaderSection::default())
    }
}

/// Result shared with callers that joined an in-flight load.
type SharedOutcome = Option<Result<(), String>>;

#[derive(Clone)]
struct LoaderShared {
    vm: Arc<dyn EngineVm>,
    registrar: Arc<dyn PrimitiveRegistrar>,
    registry: Arc<ExtensionRegistry>,
    bus: EventBus,
}

impl LoaderShared {
    fn register(
        &self,
        origin: &str,
        extension: Arc<dyn ExtensionObject>,
        translator: &Translator,
    ) -> ExtensionResult<String> {
        let normalizer = Normalizer::new(Arc::clone(&self.vm), translator.clone());
        let info = normalizer.prepare(&extension, &extension.get_info())?;
        self.registrar
            .register_extension_primitives(&info)
            .map_err(|e| ExtensionError::Engine(format!("{e:#}")))?;

        let id = info.id.clone();
        self.registry.insert(
            origin,
            LoadedExtension {
                extension,
                info: Arc::new(info),
                translator: translator.clone(),
            },
        );
        self.registry.declare(id.clone());
        self.registry.map_id(id.clone(), origin);
        self.bus.publish(TetherEvent::ExtensionLoaded {
            metadata: EventMetadata::new("loader"),
            id: id.clone(),
            origin: origin.to_owned(),
        });
        Ok(id)
    }

    fn refresh_one(&self, origin: &str, entry: &LoadedExtension) -> ExtensionResult<()> {
        let normalizer = Normalizer::new(Arc::clone(&self.vm), entry.translator.clone());
        let info = normalizer.prepare(&entry.extension, &entry.extension.get_info())?;
        self.registrar
            .refresh_extension_primitives(&info)
            .map_err(|e| ExtensionError::Engine(format!("{e:#}")))?;

        let id = info.id.clone();
        self.registry.insert(
            origin,
            LoadedExtension {
                extension: Arc::clone(&entry.extension),
                info: Arc::new(info),
                translator: entry.translator.clone(),
            },
        );
        self.bus.publish(TetherEvent::ExtensionRefreshed {
            metadata: EventMetadata::new("loader"),
            id,
            origin: origin.to_owned(),
        });
        Ok(())
    }
}

/// Removes the in-flight entry when the leading load ends or is dropped.
struct InflightGuard<'a> {
    inflight: &'a Mutex<HashMap<String, watch::Receiver<SharedOutcome>>>,
    origin: &'a str,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(self.origin);
    }
}

enum Role {
    Loaded,
    Leader(watch::Sender<SharedOutcome>),
    Follower(watch::Receiver<SharedOutcome>),
}

/// Loads extensions into the host engine.
pub struct ExtensionLoader {
    shared: Arc<LoaderShared>,
    fetcher: Arc<dyn SourceFetcher>,
    script_host: Arc<dyn ScriptHost>,
    surfaces: SurfaceFactory,
    config: LoaderConfig,
    inflight: Mutex<HashMap<String, watch::Receiver<SharedOutcome>>>,
}

impl ExtensionLoader {
    /// Create a loader with an empty registry and a private event bus.
    #[must_use]
    pub fn new(
        vm: Arc<dyn EngineVm>,
        registrar: Arc<dyn PrimitiveRegistrar>,
        fetcher: Arc<dyn SourceFetcher>,
        script_host: Arc<dyn ScriptHost>,
        surfaces: SurfaceFactory,
    ) -> Self {
        Self {
            shared: Arc::new(LoaderShared {
                vm,
                registrar,
                registry: Arc::new(ExtensionRegistry::new()),
                bus: EventBus::new(),
            }),
            fetcher,
            script_host,
            surfaces,
            config: LoaderConfig::default(),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Record loads in `registry`.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<ExtensionRegistry>) -> Self {
        let mut shared = LoaderShared::clone(&self.shared);
        shared.registry = registry;
        self.shared = Arc::new(shared);
        self
    }

    /// Publish load and refresh events on `bus`.
    #[must_use]
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        let mut shared = LoaderShared::clone(&self.shared);
        shared.bus = bus;
        self.shared = Arc::new(shared);
        self
    }

    /// Use `config`.
    #[must_use]
    pub fn with_config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    /// The registry loads are recorded in.
    #[must_use]
    pub fn registry(&self) -> &Arc<ExtensionRegistry> {
        &self.shared.registry
    }

    /// Load the extension at `origin`.
    ///
    /// Does nothing if `origin` is already loaded. A call made while another
    /// load of `origin` is running waits for that load instead of starting
    /// a second one.
    ///
    /// # Errors
    ///
    /// [`ExtensionError::Fetch`] if the source cannot be fetched,
    /// [`ExtensionError::LoadFailed`] if the script fails or its
    /// registration is rejected.
    pub async fn load(&self, origin: &str) -> ExtensionResult<()> {
        if self.shared.registry.contains(origin) {
            debug!(origin, "extension already loaded");
            return Ok(());
        }

        let role = {
            let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
            match inflight.get(origin) {
                Some(rx) => Role::Follower(rx.clone()),
                // A leader registers before releasing its in-flight entry, so
                // this re-check cannot miss a load that just finished.
                None if self.shared.registry.contains(origin) => Role::Loaded,
                None => {
                    let (tx, rx) = watch::channel(None);
                    inflight.insert(origin.to_owned(), rx);
                    Role::Leader(tx)
                },
            }
        };

        match role {
            Role::Loaded => {
                debug!(origin, "extension already loaded");
                Ok(())
            },
            Role::Follower(rx) => Self::join(origin, rx).await,
            Role::Leader(tx) => {
                let _guard = InflightGuard {
                    inflight: &self.inflight,
                    origin,
                };
                let result = self.load_uncached(origin).await;
                tx.send_replace(Some(
                    result.as_ref().map(|_| ()).map_err(ToString::to_string),
                ));
                result
            },
        }
    }

    async fn join(origin: &str, mut rx: watch::Receiver<SharedOutcome>) -> ExtensionResult<()> {
        debug!(origin, "joining in-flight load");
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        match outcome {
            Some(Ok(())) => Ok(()),
            Some(Err(reason)) => Err(ExtensionError::LoadFailed {
                origin: origin.to_owned(),
                reason,
            }),
            None => Err(ExtensionError::LoadFailed {
                origin: origin.to_owned(),
                reason: "load was abandoned".to_owned(),
            }),
        }
    }

    async fn load_uncached(&self, origin: &str) -> ExtensionResult<()> {
        self.shared.registry.declare(origin);
        let context = LoadContext::new(origin);
        let span = context.span();
        async {
            info!("loading extension");
            match self.run_load(origin).await {
                Ok(id) => {
                    info!(id = %id, elapsed_ms = context.elapsed_ms(), "extension loaded");
                    Ok(())
                },
                Err(e) => {
                    warn!(error = %e, elapsed_ms = context.elapsed_ms(), "extension load failed");
                    Err(e)
                },
            }
        }
        .instrument(span)
        .await
    }

    async fn run_load(&self, origin: &str) -> ExtensionResult<String> {
        let code = match decode_data_url(origin)? {
            Some(code) => code,
            None => self.fetcher.fetch_source(origin).await?,
        };

        let surface = Arc::new((self.surfaces)());
        let (signal, outcome) = LoadSignal::new();
        surface.set_register_hook(self.register_hook(origin, surface.translator(), signal.clone()));

        let script = InjectedScript {
            container_id: self.config.container_id.clone(),
            source: wrap_source(&code, &self.config.container_id, origin),
            origin: origin.to_owned(),
            surface: Arc::clone(&surface),
            reporter: ScriptReporter::new(signal),
        };
        let handle = match self.script_host.inject(script) {
            Ok(handle) => handle,
            Err(e) => {
                surface.revoke();
                return Err(ExtensionError::LoadFailed {
                    origin: origin.to_owned(),
                    reason: format!("{e:#}"),
                });
            },
        };
        debug!(handle = %handle, "script injected");

        let outcome = outcome.await;
        surface.revoke();
        self.script_host.dispose(handle);

        match outcome {
            Ok(LoadOutcome::Registered(id)) => Ok(id),
            Ok(LoadOutcome::Failed(reason)) => Err(ExtensionError::LoadFailed {
                origin: origin.to_owned(),
                reason,
            }),
            Err(_) => Err(ExtensionError::LoadFailed {
                origin: origin.to_owned(),
                reason: "script finished without registering".to_owned(),
            }),
        }
    }

    fn register_hook(&self, origin: &str, translator: &Translator, signal: LoadSignal) -> RegisterHook {
        let shared = Arc::clone(&self.shared);
        let origin = origin.to_owned();
        let translator = translator.clone();
        Arc::new(move |extension: Arc<dyn ExtensionObject>| {
            match shared.register(&origin, extension, &translator) {
                Ok(id) => {
                    signal.send(LoadOutcome::Registered(id));
                    Ok(())
                },
                Err(e) => {
                    error!(origin = %origin, error = %e, "extension registration failed");
                    signal.send(LoadOutcome::Failed(e.to_string()));
                    Err(e.into())
                },
            }
        })
    }

    /// Wrap `code` in a `data:` URL and load it.
    ///
    /// # Errors
    ///
    /// See [`ExtensionLoader::load`].
    pub async fn load_code(&self, code: &str) -> ExtensionResult<()> {
        self.load(&to_data_url(code.as_bytes())).await
    }

    /// Wrap file contents in a `data:` URL and load them.
    ///
    /// # Errors
    ///
    /// See [`ExtensionLoader::load`].
    pub async fn load_file(&self, bytes: &[u8]) -> ExtensionResult<()> {
        self.load(&to_data_url(bytes)).await
    }

    /// Re-derive every loaded extension's descriptor from its live
    /// `get_info()` and forward it to the engine again. Failures are logged
    /// per extension; returns how many were refreshed.
    pub fn refresh(&self) -> usize {
        let _guard = LoadGuard::new(LoadContext::new("*").with_operation("refresh"));
        let mut refreshed = 0usize;
        for (origin, entry) in self.shared.registry.entries() {
            match self.shared.refresh_one(&origin, &entry) {
                Ok(()) => refreshed = refreshed.saturating_add(1),
                Err(e) => {
                    error!(origin = %origin, id = %entry.info.id, error = %e, "failed to refresh extension");
                },
            }
        }
        info!(refreshed, "refreshed extensions");
        refreshed
    }
}

impl std::fmt::Debug for ExtensionLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionLoader")
            .field("config", &self.config)
            .field("registry", &self.shared.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tether_capabilities::{FetchResponse, HostServices};
    use tether_core::{HostValue, MethodLookup, ObjectRef, Realm, StaticDocument};
    use tether_traps::{BlockEditorTrap, DiscoveryConfig, StoreTrap};
    use url::Url;

    use crate::metadata::PreparedDescriptor;
    use crate::script::InjectionHandle;

    struct Vm;

    impl EngineVm for Vm {
        fn locale(&self) -> String {
            "en".to_owned()
        }

        fn events(&self) -> ObjectRef {
            ObjectRef::new()
        }

        fn editing_target_id(&self) -> Option<String> {
            None
        }
    }

    #[derive(Default)]
    struct Registrar {
        registered: Mutex<Vec<String>>,
        refreshed: Mutex<Vec<String>>,
    }

    impl PrimitiveRegistrar for Registrar {
        fn register_extension_primitives(&self, info: &PreparedDescriptor) -> anyhow::Result<()> {
            self.registered.lock().unwrap().push(info.id.clone());
            Ok(())
        }

        fn refresh_extension_primitives(&self, info: &PreparedDescriptor) -> anyhow::Result<()> {
            self.refreshed.lock().unwrap().push(info.id.clone());
            Ok(())
        }
    }

    struct Services;

    #[async_trait]
    impl HostServices for Services {
        async fn fetch(&self, url: &Url) -> anyhow::Result<FetchResponse> {
            anyhow::bail!("no network for {url}")
        }

        fn open_window(&self, _url: &str, _target: &str, _features: &str) -> HostValue {
            HostValue::Null
        }

        fn navigate(&self, _url: &str) {}
    }

    struct Fetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SourceFetcher for Fetcher {
        async fn fetch_source(&self, url: &str) -> ExtensionResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if url.contains("missing") {
                return Err(ExtensionError::Fetch {
                    origin: url.to_owned(),
                    message: "404".to_owned(),
                });
            }
            Ok(format!("/* {url} */"))
        }
    }

    struct Ext(Value);

    impl ExtensionObject for Ext {
        fn get_info(&self) -> Value {
            self.0.clone()
        }

        fn method(&self, _name: &str) -> MethodLookup {
            MethodLookup::Missing
        }
    }

    /// Registers an extension whose id comes from the source comment, or
    /// reports a failure when the source mentions "throw".
    #[derive(Default)]
    struct Host {
        injected: Mutex<Vec<String>>,
        disposed: AtomicUsize,
    }

    impl ScriptHost for Host {
        fn inject(&self, script: InjectedScript) -> anyhow::Result<InjectionHandle> {
            self.injected.lock().unwrap().push(script.source.clone());
            if script.source.contains("throw") {
                script.reporter.fail("script threw");
            } else if script.source.contains("bad") {
                let _ = script.surface.register(Arc::new(Ext(json!({"id": "bad id"}))));
            } else {
                script
                    .surface
                    .register(Arc::new(Ext(json!({"id": "demo", "blocks": [{"opcode": "go"}]}))))?;
            }
            Ok(InjectionHandle::new())
        }

        fn dispose(&self, _handle: InjectionHandle) {
            self.disposed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        loader: ExtensionLoader,
        registrar: Arc<Registrar>,
        fetcher: Arc<Fetcher>,
        host: Arc<Host>,
    }

    fn harness() -> Harness {
        let vm: Arc<dyn EngineVm> = Arc::new(Vm);
        let realm = Arc::new(Realm::new(Arc::new(StaticDocument::new("https://host/"))));
        let block_editor = Arc::new(BlockEditorTrap::new(
            Arc::clone(&realm),
            Arc::clone(&vm),
            DiscoveryConfig::default(),
        ));
        let store = Arc::new(StoreTrap::new(
            Arc::clone(&realm),
            DiscoveryConfig::default(),
            EventBus::new(),
        ));
        let surface_vm = Arc::clone(&vm);
        let surfaces: SurfaceFactory = Arc::new(move || {
            CapabilitySurface::new(
                Arc::clone(&surface_vm),
                Arc::clone(&realm),
                Arc::new(Services),
                Arc::clone(&block_editor),
                Arc::clone(&store),
            )
        });
        let registrar = Arc::new(Registrar::default());
        let fetcher = Arc::new(Fetcher {
            calls: AtomicUsize::new(0),
        });
        let host = Arc::new(Host::default());
        let loader = ExtensionLoader::new(
            vm,
            Arc::clone(&registrar) as Arc<dyn PrimitiveRegistrar>,
            Arc::clone(&fetcher) as Arc<dyn SourceFetcher>,
            Arc::clone(&host) as Arc<dyn ScriptHost>,
            surfaces,
        );
        Harness {
            loader,
            registrar,
            fetcher,
            host,
        }
    }

    #[tokio::test]
    async fn test_load_registers_and_tears_down() {
        let h = harness();
        h.loader.load("https://ext/demo.js").await.unwrap();

        let registry = h.loader.registry();
        assert!(registry.contains("https://ext/demo.js"));
        assert_eq!(registry.declared_ids(), ["https://ext/demo.js", "demo"]);
        assert_eq!(registry.origin_of("demo").as_deref(), Some("https://ext/demo.js"));
        assert_eq!(h.registrar.registered.lock().unwrap().as_slice(), ["demo"]);
        assert_eq!(h.host.disposed.load(Ordering::SeqCst), 1);

        let source = h.host.injected.lock().unwrap()[0].clone();
        assert!(source.contains("getElementById('tether-extension')"));
        assert!(source.ends_with("//# sourceURL=https://ext/demo.js\n"));
    }

    #[tokio::test]
    async fn test_second_load_is_noop() {
        let h = harness();
        h.loader.load("https://ext/demo.js").await.unwrap();
        h.loader.load("https://ext/demo.js").await.unwrap();
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.registrar.registered.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_one_fetch() {
        let h = harness();
        let (a, b) = tokio::join!(
            h.loader.load("https://ext/demo.js"),
            h.loader.load("https://ext/demo.js")
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.loader.registry().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_loads_across_threads_fetch_once() {
        let h = harness();
        let loader = Arc::new(h.loader);
        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let loader = Arc::clone(&loader);
                tokio::spawn(async move { loader.load("https://ext/demo.js").await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.registrar.registered.lock().unwrap().len(), 1);
        assert_eq!(loader.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_failures_tear_down_without_entry() {
        let h = harness();

        let err = h.loader.load("https://ext/throw.js").await.unwrap_err();
        assert!(matches!(err, ExtensionError::LoadFailed { reason, .. } if reason == "script threw"));

        let err = h.loader.load("https://ext/bad.js").await.unwrap_err();
        assert!(matches!(err, ExtensionError::LoadFailed { reason, .. } if reason.contains("invalid extension id")));

        let err = h.loader.load("https://ext/missing.js").await.unwrap_err();
        assert!(matches!(err, ExtensionError::Fetch { .. }));

        assert!(h.loader.registry().is_empty());
        assert_eq!(h.host.disposed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_load_code_skips_fetcher() {
        let h = harness();
        h.loader.load_code("Scratch.extensions.register(new Demo());").await.unwrap();
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 0);
        let source = h.host.injected.lock().unwrap()[0].clone();
        assert!(source.contains("Scratch.extensions.register(new Demo());"));
        let (origin, _) = &h.loader.registry().entries()[0];
        assert!(origin.starts_with("data:text/javascript;base64,"));
    }

    #[tokio::test]
    async fn test_refresh_reforwards_and_publishes() {
        let h = harness();
        let bus = EventBus::new();
        let mut events = bus.subscribe_type("extension_refreshed");
        let loader = h.loader.with_event_bus(bus);
        loader.load("https://ext/demo.js").await.unwrap();

        assert_eq!(loader.refresh(), 1);
        assert_eq!(h.registrar.refreshed.lock().unwrap().as_slice(), ["demo"]);
        let event = events.try_recv().unwrap();
        assert_eq!(event.event_type(), "extension_refreshed");
    }
}
