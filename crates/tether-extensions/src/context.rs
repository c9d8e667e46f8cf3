//! The explicit owner of everything Tether keeps per host page.
//!
//! A [`TetherContext`] owns the event bus, both discovery traps, the
//! extension registry and the loader. Nothing lives in globals; dropping the
//! context or calling [`TetherContext::reset`] forgets all of it.

use std::sync::Arc;

use tether_capabilities::{
    CapabilitySurface, ConfiguredPolicy, HostServices, PermissionPolicy, Translator,
};
use tether_config::{Config, DiscoverySection};
use tether_core::{EngineVm, Realm};
use tether_events::EventBus;
use tether_traps::{BlockEditorTrap, DiscoveryConfig, StoreTrap};
use tracing::info;

use crate::engine::PrimitiveRegistrar;
use crate::error::ExtensionResult;
use crate::loader::{ExtensionLoader, LoaderConfig, SurfaceFactory};
use crate::registry::ExtensionRegistry;
use crate::script::ScriptHost;
use crate::source::{HttpFetcher, SourceFetcher};

fn discovery_config(section: &DiscoverySection) -> DiscoveryConfig {
    DiscoveryConfig {
        block_editor_member: section.block_editor_member.clone(),
        extension_added_event: section.extension_added_event.clone(),
        tooling_global: section.tooling_global.clone(),
        fiber_root_marker: section.fiber_root_marker.clone(),
        state_markers: section.state_markers.clone(),
        max_search_depth: section.max_search_depth,
    }
}

/// Builder for [`TetherContext`].
pub struct TetherContextBuilder {
    realm: Arc<Realm>,
    vm: Arc<dyn EngineVm>,
    registrar: Arc<dyn PrimitiveRegistrar>,
    script_host: Arc<dyn ScriptHost>,
    services: Arc<dyn HostServices>,
    config: Config,
    fetcher: Option<Arc<dyn SourceFetcher>>,
    policy: Option<Arc<dyn PermissionPolicy>>,
    bus: Option<EventBus>,
}

impl TetherContextBuilder {
    /// Use `config` (defaults otherwise).
    #[must_use]
    pub fn with_config(mut self, config: &Config) -> Self {
        self.config = config.clone();
        self
    }

    /// Fetch extension source with `fetcher` instead of HTTP.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn SourceFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Use `policy` instead of the configured permissions.
    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn PermissionPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Publish on `bus` instead of a private bus.
    #[must_use]
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Create the traps and the loader and install the store interception.
    ///
    /// # Errors
    ///
    /// Returns an error if no fetcher was given and the HTTP client cannot
    /// be built.
    pub fn build(self) -> ExtensionResult<TetherContext> {
        let bus = self.bus.unwrap_or_default();
        let discovery = discovery_config(&self.config.discovery);
        let loader_config = LoaderConfig::from(&self.config.loader);
        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpFetcher::new(&loader_config)?),
        };
        let policy = self
            .policy
            .unwrap_or_else(|| Arc::new(ConfiguredPolicy::new(self.config.permissions.clone())));

        let block_editor = Arc::new(
            BlockEditorTrap::new(
                Arc::clone(&self.realm),
                Arc::clone(&self.vm),
                discovery.clone(),
            )
            .with_event_bus(bus.clone()),
        );
        let store = Arc::new(StoreTrap::new(
            Arc::clone(&self.realm),
            discovery,
            bus.clone(),
        ));
        store.install();

        let surfaces: SurfaceFactory = {
            let vm = Arc::clone(&self.vm);
            let realm = Arc::clone(&self.realm);
            let services = Arc::clone(&self.services);
            let block_editor = Arc::clone(&block_editor);
            let store = Arc::clone(&store);
            let bus = bus.clone();
            Arc::new(move || {
                CapabilitySurface::new(
                    Arc::clone(&vm),
                    Arc::clone(&realm),
                    Arc::clone(&services),
                    Arc::clone(&block_editor),
                    Arc::clone(&store),
                )
                .with_policy(Arc::clone(&policy))
                .with_event_bus(&bus)
            })
        };

        let registry = Arc::new(ExtensionRegistry::new());
        let loader = ExtensionLoader::new(
            Arc::clone(&self.vm),
            self.registrar,
            fetcher,
            self.script_host,
            Arc::clone(&surfaces),
        )
        .with_registry(Arc::clone(&registry))
        .with_event_bus(bus.clone())
        .with_config(loader_config);

        let translator = Translator::new(self.vm.locale());
        translator.attach(&bus);

        info!(locale = %translator.language(), "tether context ready");
        Ok(TetherContext {
            bus,
            block_editor,
            store,
            registry,
            loader,
            surfaces,
            translator,
        })
    }
}

impl std::fmt::Debug for TetherContextBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TetherContextBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Per-page Tether state.
pub struct TetherContext {
    bus: EventBus,
    block_editor: Arc<BlockEditorTrap>,
    store: Arc<StoreTrap>,
    registry: Arc<ExtensionRegistry>,
    loader: ExtensionLoader,
    surfaces: SurfaceFactory,
    translator: Translator,
}

impl TetherContext {
    /// Start building a context for the page behind `realm`.
    #[must_use]
    pub fn builder(
        realm: Arc<Realm>,
        vm: Arc<dyn EngineVm>,
        registrar: Arc<dyn PrimitiveRegistrar>,
        script_host: Arc<dyn ScriptHost>,
        services: Arc<dyn HostServices>,
    ) -> TetherContextBuilder {
        TetherContextBuilder {
            realm,
            vm,
            registrar,
            script_host,
            services,
            config: Config::default(),
            fetcher: None,
            policy: None,
            bus: None,
        }
    }

    /// A new capability surface, as handed to each load.
    #[must_use]
    pub fn build_surface(&self) -> CapabilitySurface {
        (self.surfaces)()
    }

    /// The event bus.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Loaded extensions.
    #[must_use]
    pub fn registry(&self) -> &Arc<ExtensionRegistry> {
        &self.registry
    }

    /// The loader.
    #[must_use]
    pub fn loader(&self) -> &ExtensionLoader {
        &self.loader
    }

    /// The block-editor trap.
    #[must_use]
    pub fn block_editor(&self) -> &Arc<BlockEditorTrap> {
        &self.block_editor
    }

    /// The state-store trap.
    #[must_use]
    pub fn store(&self) -> &Arc<StoreTrap> {
        &self.store
    }

    /// Translator following the host locale.
    #[must_use]
    pub fn translator(&self) -> &Translator {
        &self.translator
    }

    /// Forget loaded extensions and discovery results, then re-arm the
    /// store interception.
    pub fn reset(&self) {
        self.registry.clear();
        self.block_editor.reset();
        self.store.uninstall();
        self.store.install();
        info!("tether context reset");
    }
}

impl std::fmt::Debug for TetherContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TetherContext")
            .field("registry", &self.registry)
            .field("translator", &self.translator)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_config_from_section() {
        let section = DiscoverySection {
            block_editor_member: "Blocks".to_owned(),
            max_search_depth: Some(4),
            ..DiscoverySection::default()
        };
        let config = discovery_config(&section);
        assert_eq!(config.block_editor_member, "Blocks");
        assert_eq!(config.max_search_depth, Some(4));
        assert_eq!(config.state_markers, DiscoveryConfig::default().state_markers);
    }
}
