//! Configuration types for Tether.
//!
//! All types in this module are self-contained with no dependencies on other
//! internal tether crates. Domain types (`DiscoveryConfig`, permission
//! policies, loader settings) are built from these at the integration
//! boundary. Every struct implements [`Default`] with the same values as the
//! embedded `defaults.toml`, so a bare `[section]` header produces a working
//! configuration.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging level, format, and per-crate directives.
    pub logging: LoggingSection,
    /// What extensions are allowed to do through their capability surface.
    pub permissions: PermissionsSection,
    /// Names and markers used to discover host internals.
    pub discovery: DiscoverySection,
    /// Extension source loading.
    pub loader: LoaderSection,
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Logging and tracing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global log level filter (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`).
    pub level: String,
    /// Output format: `"pretty"`, `"compact"`, `"json"` or `"full"`.
    pub format: String,
    /// Per-crate tracing directives (e.g. `["tether_traps=trace"]`).
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// PermissionsSection
// ---------------------------------------------------------------------------

/// Coarse permission grants for extensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct PermissionsSection {
    /// Hosts extensions may fetch from. `"*"` allows any host; a bare domain
    /// also allows its subdomains.
    pub fetch_domains: Vec<String>,
    /// Hosts extensions may embed content from.
    pub embed_domains: Vec<String>,
    /// Whether extensions may open new windows.
    pub open_window: bool,
    /// Whether extensions may navigate the host page.
    pub redirect: bool,
    /// Whether extensions may record audio.
    pub record_audio: bool,
    /// Whether extensions may record video.
    pub record_video: bool,
    /// Whether extensions may read the clipboard.
    pub read_clipboard: bool,
    /// Whether extensions may show notifications.
    pub notify: bool,
    /// Whether extensions may read the geolocation.
    pub geolocate: bool,
}

impl Default for PermissionsSection {
    fn default() -> Self {
        Self {
            fetch_domains: vec!["*".to_owned()],
            embed_domains: vec!["*".to_owned()],
            open_window: true,
            redirect: true,
            record_audio: true,
            record_video: true,
            read_clipboard: true,
            notify: true,
            geolocate: true,
        }
    }
}

// ---------------------------------------------------------------------------
// DiscoverySection
// ---------------------------------------------------------------------------

/// Host-internal names the discovery traps look for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySection {
    /// Member identifying the block-editor context.
    pub block_editor_member: String,
    /// Engine event slot whose listener is bound to the block-editor context.
    pub extension_added_event: String,
    /// Global a tooling layer stores its captured store in.
    pub tooling_global: String,
    /// Substring of the DOM property holding a UI fiber root.
    pub fiber_root_marker: String,
    /// Dot paths that identify the host's state snapshot.
    pub state_markers: Vec<String>,
    /// Optional depth limit for object searches.
    pub max_search_depth: Option<usize>,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            block_editor_member: "ScratchBlocks".to_owned(),
            extension_added_event: "EXTENSION_ADDED".to_owned(),
            tooling_global: "__scratchAddonsRedux".to_owned(),
            fiber_root_marker: "__reactContainer".to_owned(),
            state_markers: vec![
                "scratchGui.vm".to_owned(),
                "scratchPaint".to_owned(),
                "locales".to_owned(),
            ],
            max_search_depth: None,
        }
    }
}

// ---------------------------------------------------------------------------
// LoaderSection
// ---------------------------------------------------------------------------

/// Extension source loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderSection {
    /// Id of the temporary container the wrapped source is injected into.
    pub container_id: String,
    /// Bypass HTTP caches when fetching extension source.
    pub no_cache: bool,
    /// User agent for HTTP fetches.
    pub user_agent: String,
}

impl Default for LoaderSection {
    fn default() -> Self {
        Self {
            container_id: "tether-extension".to_owned(),
            no_cache: true,
            user_agent: "tether/0.1".to_owned(),
        }
    }
}
