//! Test fixtures: a simulated host page and common descriptors.

use std::sync::Arc;

use serde_json::{Value, json};
use tether_capabilities::HostServices;
use tether_core::{
    Document, EngineVm, HostFunction, HostValue, ObjectRef, Realm, Reducer, StaticDocument, Store,
    create_host_store,
};
use tether_events::EventBus;
use tether_extensions::{
    PrimitiveRegistrar, ScriptHost, SourceFetcher, TetherContext, TetherContextBuilder,
};

use crate::mocks::{MockEngine, MockFetcher, MockScriptHost, MockServices};

/// Location of the simulated host page.
pub const HOST_LOCATION: &str = "https://editor.example/";

/// A simulated host page: a document, its realm and a mock engine.
///
/// The block-editor context and the store-shaped fiber tree are attached on
/// demand so tests can control when the host "wires up".
#[derive(Debug)]
pub struct FixtureHost {
    /// The page document.
    pub document: Arc<StaticDocument>,
    /// The page realm.
    pub realm: Arc<Realm>,
    /// The engine.
    pub engine: Arc<MockEngine>,
    /// The bus the engine publishes locale changes on.
    pub bus: EventBus,
    /// The block-editor instance the UI context holds.
    pub editor: ObjectRef,
}

impl FixtureHost {
    /// An empty page: nothing wired yet.
    #[must_use]
    pub fn new() -> Self {
        let document = Arc::new(StaticDocument::new(HOST_LOCATION));
        let realm = Arc::new(Realm::new(Arc::clone(&document) as Arc<dyn Document>));
        let bus = EventBus::new();
        let engine = Arc::new(MockEngine::new().with_event_bus(bus.clone()));
        Self {
            document,
            realm,
            engine,
            bus,
            editor: ObjectRef::new(),
        }
    }

    /// A page whose UI has already registered its `EXTENSION_ADDED`
    /// listener and rendered a store-shaped fiber tree.
    #[must_use]
    pub fn preloaded() -> Self {
        let host = Self::new();
        host.attach_block_editor();
        host.attach_dom_store(gui_state());
        host
    }

    /// Assign the engine's `EXTENSION_ADDED` slot with a listener bound to a
    /// UI context that holds [`FixtureHost::editor`].
    pub fn attach_block_editor(&self) {
        let holder = ObjectRef::new();
        holder.set("ScratchBlocks", HostValue::Object(self.editor.clone()));
        let context = ObjectRef::new();
        context.set("props", HostValue::Object(holder));
        let listener = HostFunction::new("handleExtensionAdded", |_, _| Ok(HostValue::Undefined))
            .bind(HostValue::Object(context));
        self.engine
            .events()
            .set("EXTENSION_ADDED", HostValue::Function(listener));
    }

    /// Add a DOM element whose fiber root leads to a store object with
    /// `state` as its snapshot. Returns the store object.
    pub fn attach_dom_store(&self, state: Value) -> ObjectRef {
        let snapshot = HostValue::from_json(&state);
        let store = ObjectRef::new();
        store.set(
            "getState",
            HostValue::Function(HostFunction::new("getState", move |_, _| Ok(snapshot.clone()))),
        );
        store.set(
            "dispatch",
            HostValue::Function(HostFunction::new("dispatch", |_, args| {
                Ok(args.first().cloned().unwrap_or(HostValue::Undefined))
            })),
        );

        let provider = ObjectRef::new();
        provider.set("store", HostValue::Object(store.clone()));
        let root = ObjectRef::new();
        root.set("current", HostValue::Object(provider));
        let element = ObjectRef::new();
        element.set("id", HostValue::from("app"));
        element.set("__reactContainer$fixture", HostValue::Object(root));
        self.document.push_element(element);
        store
    }

    /// Create the host's store the way the host does, through the realm's
    /// composition global, with a counter reducer.
    #[must_use]
    pub fn create_counter_store(&self) -> Arc<dyn Store> {
        create_host_store(
            &self.realm,
            counter_reducer(),
            HostValue::from_json(&json!({"n": 0})),
            Vec::new(),
        )
    }

    /// Builder for a context on this page using the mock engine.
    #[must_use]
    pub fn context_builder(
        &self,
        script_host: Arc<MockScriptHost>,
        fetcher: Arc<MockFetcher>,
        services: Arc<MockServices>,
    ) -> TetherContextBuilder {
        TetherContext::builder(
            Arc::clone(&self.realm),
            Arc::clone(&self.engine) as Arc<dyn EngineVm>,
            Arc::clone(&self.engine) as Arc<dyn PrimitiveRegistrar>,
            script_host as Arc<dyn ScriptHost>,
            services as Arc<dyn HostServices>,
        )
        .with_fetcher(fetcher as Arc<dyn SourceFetcher>)
        .with_event_bus(self.bus.clone())
    }
}

impl Default for FixtureHost {
    fn default() -> Self {
        Self::new()
    }
}

/// State snapshot carrying every default discovery marker.
#[must_use]
pub fn gui_state() -> Value {
    json!({
        "scratchGui": {"vm": {"runtime": {}}},
        "scratchPaint": {"mode": "BRUSH"},
        "locales": {"locale": "en"},
    })
}

/// Reducer counting `{"type": "inc"}` actions in `n`.
#[must_use]
pub fn counter_reducer() -> Reducer {
    Arc::new(|state, action| {
        let n = match state.get("n") {
            HostValue::Number(n) => n,
            _ => 0.0,
        };
        if action.get("type").and_then(Value::as_str) == Some("inc") {
            HostValue::from_json(&json!({ "n": n + 1.0 }))
        } else {
            state.clone()
        }
    })
}

/// Minimal valid descriptor.
#[must_use]
pub fn test_descriptor(id: &str) -> Value {
    json!({
        "id": id,
        "name": format!("{id} extension"),
        "blocks": [
            {"opcode": "run", "blockType": "command", "text": "run [X]",
             "arguments": {"X": {"type": "number", "defaultValue": 1}}},
        ],
    })
}

/// Descriptor exercising every block kind and both menu forms.
#[must_use]
pub fn rich_descriptor(id: &str) -> Value {
    json!({
        "id": id,
        "color1": "#4c97ff",
        "blocks": [
            {"opcode": "say<\"hi\">", "blockType": "command"},
            "---",
            {"opcode": "isReady", "blockType": "Boolean", "func": "ready"},
            {"opcode": "whenStarted", "blockType": "hat"},
            {"opcode": "tick", "blockType": "event", "func": "ignored"},
            {"blockType": "label", "text": "Tools"},
            {"blockType": "button", "text": "Make a list", "func": "MAKE_A_LIST"},
            {"blockType": "button", "text": "Help", "func": "openHelp"},
            {"opcode": "dyn", "blockType": "reporter", "isDynamic": true},
            {"text": "no opcode"},
        ],
        "menus": {
            "sounds": ["pop", "meow"],
            "colors": {"items": "getColors", "acceptReporters": true},
        },
    })
}

/// Descriptor whose id is invalid.
#[must_use]
pub fn invalid_descriptor() -> Value {
    json!({"id": "not-valid!", "blocks": []})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preloaded_host_has_listener_and_store() {
        let host = FixtureHost::preloaded();
        assert!(host.engine.events().get("EXTENSION_ADDED").as_function().is_some());
        assert_eq!(host.document.elements().len(), 1);
    }

    #[test]
    fn test_counter_store_without_interception() {
        let host = FixtureHost::new();
        let store = host.create_counter_store();
        store.dispatch(json!({"type": "inc"}));
        assert_eq!(store.get_state().get("n"), HostValue::Number(1.0));
    }
}
