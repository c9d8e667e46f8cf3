//! Names and markers the traps look for inside the host.

use serde::{Deserialize, Serialize};

/// Discovery settings.
///
/// The defaults match the host layout Tether was built against; the config
/// crate can override them when the host renames its internals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Member that identifies the block-editor context.
    pub block_editor_member: String,
    /// Engine event slot whose listeners capture the block-editor context.
    pub extension_added_event: String,
    /// Realm global a third-party tooling layer stores a captured store in.
    pub tooling_global: String,
    /// Substring of the DOM property that holds a UI fiber root.
    pub fiber_root_marker: String,
    /// Dot paths that must all be present in a store-shaped state snapshot.
    pub state_markers: Vec<String>,
    /// Optional depth limit for object searches.
    pub max_search_depth: Option<usize>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            block_editor_member: "ScratchBlocks".to_string(),
            extension_added_event: "EXTENSION_ADDED".to_string(),
            tooling_global: "__scratchAddonsRedux".to_string(),
            fiber_root_marker: "__reactContainer".to_string(),
            state_markers: vec![
                "scratchGui.vm".to_string(),
                "scratchPaint".to_string(),
                "locales".to_string(),
            ],
            max_search_depth: None,
        }
    }
}

impl DiscoveryConfig {
    /// Set the block-editor member name.
    #[must_use]
    pub fn with_block_editor_member(mut self, member: impl Into<String>) -> Self {
        self.block_editor_member = member.into();
        self
    }

    /// Set the engine event slot name.
    #[must_use]
    pub fn with_extension_added_event(mut self, event: impl Into<String>) -> Self {
        self.extension_added_event = event.into();
        self
    }

    /// Set the fiber-root marker.
    #[must_use]
    pub fn with_fiber_root_marker(mut self, marker: impl Into<String>) -> Self {
        self.fiber_root_marker = marker.into();
        self
    }

    /// Replace the state markers.
    #[must_use]
    pub fn with_state_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state_markers = markers.into_iter().map(Into::into).collect();
        self
    }

    /// Limit object searches to `depth` levels.
    #[must_use]
    pub fn with_max_search_depth(mut self, depth: usize) -> Self {
        self.max_search_depth = Some(depth);
        self
    }

    pub(crate) fn locator(&self) -> tether_core::ObjectLocator {
        let locator = tether_core::ObjectLocator::new();
        match self.max_search_depth {
            Some(depth) => locator.with_max_depth(depth),
            None => locator,
        }
    }
}
