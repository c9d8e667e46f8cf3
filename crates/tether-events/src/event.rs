//! Event types for the Tether event bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tether_core::HostValue;
use uuid::Uuid;

/// Metadata attached to every event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
    /// Source component that generated the event.
    pub source: String,
}

impl EventMetadata {
    /// Create new event metadata.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
        }
    }
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self::new("unknown")
    }
}

/// One state-store transition.
#[derive(Debug, Clone, Serialize)]
pub struct StateChange {
    /// State before the action.
    pub previous: HostValue,
    /// State after the action.
    pub next: HostValue,
    /// The dispatched action, unchanged.
    pub action: Value,
}

/// How the state-store handle was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreSource {
    /// Through the composition-hook interception.
    Interception,
    /// Adopted from a third-party tooling layer that captured it first.
    Tooling,
    /// Found by walking the DOM.
    Dom,
}

/// All events published by Tether.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TetherEvent {
    /// The host state store processed an action.
    StateChanged {
        /// Event metadata.
        metadata: EventMetadata,
        /// The transition.
        change: StateChange,
    },

    /// The host switched locale.
    LocaleChanged {
        /// Event metadata.
        metadata: EventMetadata,
        /// New locale.
        locale: String,
    },

    /// An extension registered and was forwarded to the engine.
    ExtensionLoaded {
        /// Event metadata.
        metadata: EventMetadata,
        /// Extension id.
        id: String,
        /// Load origin.
        origin: String,
    },

    /// A loaded extension's descriptor was re-derived and re-forwarded.
    ExtensionRefreshed {
        /// Event metadata.
        metadata: EventMetadata,
        /// Extension id.
        id: String,
        /// Load origin.
        origin: String,
    },

    /// The block-editor instance was located.
    BlockEditorResolved {
        /// Event metadata.
        metadata: EventMetadata,
    },

    /// The state store was located.
    StoreResolved {
        /// Event metadata.
        metadata: EventMetadata,
        /// How it was found.
        source: StoreSource,
    },
}

impl TetherEvent {
    /// Get the event type as a string.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StateChanged { .. } => "state_changed",
            Self::LocaleChanged { .. } => "locale_changed",
            Self::ExtensionLoaded { .. } => "extension_loaded",
            Self::ExtensionRefreshed { .. } => "extension_refreshed",
            Self::BlockEditorResolved { .. } => "block_editor_resolved",
            Self::StoreResolved { .. } => "store_resolved",
        }
    }

    /// Get the event metadata.
    #[must_use]
    pub fn metadata(&self) -> &EventMetadata {
        match self {
            Self::StateChanged { metadata, .. }
            | Self::LocaleChanged { metadata, .. }
            | Self::ExtensionLoaded { metadata, .. }
            | Self::ExtensionRefreshed { metadata, .. }
            | Self::BlockEditorResolved { metadata }
            | Self::StoreResolved { metadata, .. } => metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_names() {
        let event = TetherEvent::ExtensionLoaded {
            metadata: EventMetadata::new("loader"),
            id: "foo1".into(),
            origin: "https://ext.example/foo.js".into(),
        };
        assert_eq!(event.event_type(), "extension_loaded");
        assert_eq!(event.metadata().source, "loader");
    }

    #[test]
    fn test_state_change_serializes_snapshots() {
        let event = TetherEvent::StateChanged {
            metadata: EventMetadata::new("store"),
            change: StateChange {
                previous: HostValue::from_json(&json!({"n": 1.0})),
                next: HostValue::from_json(&json!({"n": 2.0})),
                action: json!({"type": "inc"}),
            },
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], json!("state_changed"));
        assert_eq!(value["change"]["next"], json!({"n": 2.0}));
        assert_eq!(value["change"]["action"], json!({"type": "inc"}));
    }
}
