//! The object each extension load receives.

use std::sync::{Arc, PoisonError, RwLock};

use serde_json::{Map, Value, json};
use tether_core::{
    ArgumentType, BlockType, Cast, EngineVm, ExtensionObject, HostValue, Realm, ReporterScope,
    TargetType,
};
use tether_events::EventBus;
use tether_traps::{BlockEditorTrap, StoreTrap, TrapHandle, TrappedStore};
use tracing::{debug, warn};
use url::Url;

use crate::error::{CapabilityError, CapabilityResult};
use crate::host::{FetchResponse, HostServices};
use crate::l10n::Translator;
use crate::policy::{AllowAllPolicy, PermissionPolicy};

/// Callback the loader installs to receive `register(extension)`.
pub type RegisterHook = Arc<dyn Fn(Arc<dyn ExtensionObject>) -> anyhow::Result<()> + Send + Sync>;

/// Window features every `open_window` call starts with.
const BASE_WINDOW_FEATURES: &str = "noreferrer";

/// Permission-gated host primitives plus accessors for the located
/// block-editor and state store.
///
/// A surface is built per load and holds no state worth persisting; the
/// traps it hands out are shared with the owning context.
pub struct CapabilitySurface {
    vm: Arc<dyn EngineVm>,
    realm: Arc<Realm>,
    policy: Arc<dyn PermissionPolicy>,
    services: Arc<dyn HostServices>,
    translator: Translator,
    block_editor: Arc<BlockEditorTrap>,
    store: Arc<StoreTrap>,
    register: RwLock<Option<RegisterHook>>,
}

impl CapabilitySurface {
    /// Build a surface. The translator starts in the engine's locale.
    #[must_use]
    pub fn new(
        vm: Arc<dyn EngineVm>,
        realm: Arc<Realm>,
        services: Arc<dyn HostServices>,
        block_editor: Arc<BlockEditorTrap>,
        store: Arc<StoreTrap>,
    ) -> Self {
        let translator = Translator::new(vm.locale());
        Self {
            vm,
            realm,
            policy: Arc::new(AllowAllPolicy),
            services,
            translator,
            block_editor,
            store,
            register: RwLock::new(None),
        }
    }

    /// Use `policy` for permission checks.
    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn PermissionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Make the translator follow locale changes on `bus`.
    #[must_use]
    pub fn with_event_bus(self, bus: &EventBus) -> Self {
        self.translator.attach(bus);
        self
    }

    // -----------------------------------------------------------------------
    // Extension-facing constants
    // -----------------------------------------------------------------------

    /// `BlockType`, `ArgumentType`, `TargetType` and `ReporterScope` tables.
    #[must_use]
    pub fn enums(&self) -> Value {
        json!({
            "BlockType": BlockType::table(),
            "ArgumentType": ArgumentType::table(),
            "TargetType": TargetType::table(),
            "ReporterScope": ReporterScope::table(),
        })
    }

    /// Value coercions.
    #[must_use]
    pub fn cast(&self) -> Cast {
        Cast
    }

    /// Extensions loaded through Tether always run unsandboxed.
    #[must_use]
    pub fn unsandboxed(&self) -> bool {
        true
    }

    /// Flags exposed next to `register`.
    #[must_use]
    pub fn extension_flags(&self) -> Value {
        let mut flags = Map::new();
        flags.insert("unsandboxed".to_owned(), Value::Bool(self.unsandboxed()));
        flags.insert("tether".to_owned(), Value::Bool(true));
        Value::Object(flags)
    }

    /// The host engine.
    #[must_use]
    pub fn vm(&self) -> &Arc<dyn EngineVm> {
        &self.vm
    }

    /// The translator for this surface.
    #[must_use]
    pub fn translator(&self) -> &Translator {
        &self.translator
    }

    /// Shortcut for [`Translator::translate`].
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::InvalidMessage`] for unsupported input.
    pub fn translate(&self, message: &Value, args: Option<&Value>) -> CapabilityResult<String> {
        self.translator.translate(message, args)
    }

    // -----------------------------------------------------------------------
    // Permission checks
    // -----------------------------------------------------------------------

    /// Parse `raw` with the document location as base.
    #[must_use]
    pub fn resolve_url(&self, raw: &str) -> Option<Url> {
        let location = self.realm.document().location();
        match Url::parse(&location) {
            Ok(base) => base.join(raw).ok(),
            Err(_) => Url::parse(raw).ok(),
        }
    }

    /// Whether the extension may fetch `url`. Unparsable URLs are denied.
    pub async fn can_fetch(&self, url: &str) -> bool {
        match self.resolve_url(url) {
            Some(parsed) => self.policy.can_fetch(&parsed).await,
            None => false,
        }
    }

    /// Whether the extension may embed `url`. Unparsable URLs are denied.
    pub async fn can_embed(&self, url: &str) -> bool {
        match self.resolve_url(url) {
            Some(parsed) => self.policy.can_embed(&parsed).await,
            None => false,
        }
    }

    /// Whether the extension may open a window at `url`. `javascript:` is
    /// always denied.
    pub async fn can_open_window(&self, url: &str) -> bool {
        let parsed = self.resolve_url(url);
        if is_script_url(parsed.as_ref()) {
            return false;
        }
        self.policy.can_open_window(parsed.as_ref()).await
    }

    /// Whether the extension may navigate the page to `url`. `javascript:`
    /// is always denied.
    pub async fn can_redirect(&self, url: &str) -> bool {
        let parsed = self.resolve_url(url);
        if is_script_url(parsed.as_ref()) {
            return false;
        }
        self.policy.can_redirect(parsed.as_ref()).await
    }

    /// Whether the extension may record audio.
    pub async fn can_record_audio(&self) -> bool {
        self.policy.can_record_audio().await
    }

    /// Whether the extension may record video.
    pub async fn can_record_video(&self) -> bool {
        self.policy.can_record_video().await
    }

    /// Whether the extension may read the clipboard.
    pub async fn can_read_clipboard(&self) -> bool {
        self.policy.can_read_clipboard().await
    }

    /// Whether the extension may show notifications.
    pub async fn can_notify(&self) -> bool {
        self.policy.can_notify().await
    }

    /// Whether the extension may read the geolocation.
    pub async fn can_geolocate(&self) -> bool {
        self.policy.can_geolocate().await
    }

    // -----------------------------------------------------------------------
    // Gated operations
    // -----------------------------------------------------------------------

    /// Fetch `url` through the host.
    ///
    /// # Errors
    ///
    /// [`CapabilityError::PermissionDenied`] when `can_fetch` denies, or
    /// [`CapabilityError::Fetch`] when the host request fails.
    pub async fn fetch(&self, url: &str) -> CapabilityResult<FetchResponse> {
        let Some(parsed) = self.resolve_url(url) else {
            return Err(denied("fetch", url));
        };
        if !self.policy.can_fetch(&parsed).await {
            return Err(denied("fetch", url));
        }
        debug!(url = %parsed, "extension fetch");
        self.services
            .fetch(&parsed)
            .await
            .map_err(|e| CapabilityError::Fetch(e.to_string()))
    }

    /// Open `url` in a new window with `noreferrer` prepended to `features`.
    ///
    /// # Errors
    ///
    /// [`CapabilityError::PermissionDenied`] when `can_open_window` denies.
    pub async fn open_window(&self, url: &str, features: Option<&str>) -> CapabilityResult<HostValue> {
        if !self.can_open_window(url).await {
            return Err(denied("open window", url));
        }
        let features = match features {
            Some(extra) if !extra.is_empty() => format!("{BASE_WINDOW_FEATURES},{extra}"),
            _ => BASE_WINDOW_FEATURES.to_owned(),
        };
        Ok(self.services.open_window(url, "_blank", &features))
    }

    /// Navigate the host page to `url`.
    ///
    /// # Errors
    ///
    /// [`CapabilityError::PermissionDenied`] when `can_redirect` denies.
    pub async fn redirect(&self, url: &str) -> CapabilityResult<()> {
        if !self.can_redirect(url).await {
            return Err(denied("redirect to", url));
        }
        self.services.navigate(url);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Discovery
    // -----------------------------------------------------------------------

    /// Block-editor accessors.
    #[must_use]
    pub fn gui(&self) -> Gui<'_> {
        Gui { surface: self }
    }

    /// Wait for the host's state store.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::Discovery`] if the trap closes first.
    pub async fn store(&self) -> CapabilityResult<TrappedStore> {
        Ok(self.store.get().await?)
    }

    /// The state store if it is already known or reachable through the DOM.
    #[must_use]
    pub fn store_eagerly(&self) -> Option<TrappedStore> {
        self.store.eager().or_else(|| self.store.locate_in_dom())
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Install the loader's registration callback.
    pub fn set_register_hook(&self, hook: RegisterHook) {
        *self.register.write().unwrap_or_else(PoisonError::into_inner) = Some(hook);
    }

    /// Drop the registration callback so late `register` calls fail.
    pub fn revoke(&self) {
        self.register
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Register an extension with the loader that built this surface.
    ///
    /// # Errors
    ///
    /// [`CapabilityError::RegisterUnavailable`] when no loader is attached
    /// (or the load was torn down), [`CapabilityError::Registration`] when
    /// the loader rejects the extension.
    pub fn register(&self, extension: Arc<dyn ExtensionObject>) -> CapabilityResult<()> {
        let hook = self
            .register
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(CapabilityError::RegisterUnavailable)?;
        hook(extension).map_err(|e| {
            warn!(error = %e, "extension registration rejected");
            CapabilityError::Registration(e.to_string())
        })
    }
}

impl std::fmt::Debug for CapabilitySurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilitySurface")
            .field("translator", &self.translator)
            .finish_non_exhaustive()
    }
}

/// Block-editor accessors of a surface.
#[derive(Debug, Clone, Copy)]
pub struct Gui<'a> {
    surface: &'a CapabilitySurface,
}

impl Gui<'_> {
    /// Wait for the block-editor instance.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::Discovery`] if the trap closes first.
    pub async fn block_editor(&self) -> CapabilityResult<TrapHandle> {
        Ok(self.surface.block_editor.get().await?)
    }

    /// The cached block-editor handle, if already found.
    #[must_use]
    pub fn block_editor_eagerly(&self) -> Option<TrapHandle> {
        self.surface.block_editor.eager()
    }
}

fn is_script_url(url: Option<&Url>) -> bool {
    url.is_some_and(|u| u.scheme() == "javascript")
}

fn denied(operation: &'static str, target: &str) -> CapabilityError {
    warn!(operation, target, "capability denied");
    CapabilityError::PermissionDenied {
        operation,
        target: target.to_owned(),
    }
}
