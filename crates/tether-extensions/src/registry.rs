//! Loaded-extension registry.
//!
//! Keeps loaded extensions in load order, keyed by origin, together with
//! the declared-id list and the `id -> origin` mapping the UI reads.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tether_capabilities::Translator;
use tether_core::ExtensionObject;
use tracing::{debug, info};

use crate::metadata::PreparedDescriptor;

/// A registered extension.
#[derive(Clone)]
pub struct LoadedExtension {
    /// The extension object.
    pub extension: Arc<dyn ExtensionObject>,
    /// Descriptor as last prepared.
    pub info: Arc<PreparedDescriptor>,
    /// Translator of the surface the extension was loaded with.
    pub translator: Translator,
}

impl std::fmt::Debug for LoadedExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedExtension")
            .field("id", &self.info.id)
            .finish_non_exhaustive()
    }
}

/// Registry of loaded extensions.
#[derive(Default)]
pub struct ExtensionRegistry {
    loaded: RwLock<Vec<(String, LoadedExtension)>>,
    declared_ids: RwLock<Vec<String>>,
    id_to_origin: RwLock<HashMap<String, String>>,
}

impl ExtensionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `origin` has a registered extension.
    #[must_use]
    pub fn contains(&self, origin: &str) -> bool {
        self.loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|(o, _)| o == origin)
    }

    /// The extension loaded from `origin`.
    #[must_use]
    pub fn get(&self, origin: &str) -> Option<LoadedExtension> {
        self.loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(o, _)| o == origin)
            .map(|(_, e)| e.clone())
    }

    /// Store `entry` under `origin`, replacing any previous entry in place.
    pub fn insert(&self, origin: impl Into<String>, entry: LoadedExtension) {
        let origin = origin.into();
        let mut loaded = self.loaded.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = loaded.iter_mut().find(|(o, _)| *o == origin) {
            debug!(origin = %origin, id = %entry.info.id, "replaced extension entry");
            slot.1 = entry;
        } else {
            info!(origin = %origin, id = %entry.info.id, "registered extension");
            loaded.push((origin, entry));
        }
    }

    /// Snapshot of all entries in load order.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, LoadedExtension)> {
        self.loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of loaded extensions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.loaded.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing is loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append to the declared-id list. Both origins (at load start) and
    /// extension ids (at registration) are declared.
    pub fn declare(&self, id: impl Into<String>) {
        self.declared_ids
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(id.into());
    }

    /// Declared ids in declaration order.
    #[must_use]
    pub fn declared_ids(&self) -> Vec<String> {
        self.declared_ids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Record which origin an extension id came from.
    pub fn map_id(&self, id: impl Into<String>, origin: impl Into<String>) {
        self.id_to_origin
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.into(), origin.into());
    }

    /// Origin of extension `id`.
    #[must_use]
    pub fn origin_of(&self, id: &str) -> Option<String> {
        self.id_to_origin
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Forget everything.
    pub fn clear(&self) {
        self.loaded.write().unwrap_or_else(PoisonError::into_inner).clear();
        self.declared_ids
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.id_to_origin
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("loaded", &self.len())
            .field("declared_ids", &self.declared_ids())
            .finish()
    }
}
