//! End-to-end extension loading through a [`TetherContext`].

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tether_core::ExtensionObject;
use tether_extensions::{ExtensionError, MenuItems, TetherContext};
use tether_test::{
    MockFetcher, MockScriptHost, ScriptBehaviour, StaticExtension, TestHarness, invalid_descriptor,
    test_descriptor,
};

use common::{ORIGIN, harness_for};

#[tokio::test]
async fn test_load_registers_and_tears_down() {
    let harness = harness_for(StaticExtension::new(test_descriptor("demo")).into_object());
    let context = harness.context();
    let mut loaded = context.bus().subscribe_type("extension_loaded");

    context.loader().load(ORIGIN).await.unwrap();

    assert!(context.registry().contains(ORIGIN));
    assert_eq!(context.registry().origin_of("demo").as_deref(), Some(ORIGIN));
    assert_eq!(harness.host.engine.registered_ids(), vec!["demo"]);
    assert_eq!(harness.scripts.injections(), 1);
    assert_eq!(harness.scripts.disposals(), 1);
    assert!(loaded.try_recv().is_some());

    let (origin, source) = &harness.scripts.injected()[0];
    assert_eq!(origin, ORIGIN);
    assert!(source.contains("Scratch.extensions.register"));
    assert!(source.trim_end().ends_with(&format!("//# sourceURL={ORIGIN}")));
}

#[tokio::test]
async fn test_concurrent_loads_fetch_once() {
    tether_test::setup_test_logging_default();
    let extension = StaticExtension::new(test_descriptor("twice")).into_object();
    let scripts =
        MockScriptHost::new().with_default_behaviour(ScriptBehaviour::Register(extension));
    let fetcher = MockFetcher::new()
        .with_source(ORIGIN, "// twice")
        .with_delay(Duration::from_millis(20));
    let harness = TestHarness::new(scripts, fetcher);
    let context = harness.context();

    let (first, second) = tokio::join!(context.loader().load(ORIGIN), context.loader().load(ORIGIN));
    first.unwrap();
    second.unwrap();

    assert_eq!(harness.fetcher.calls(), 1);
    assert_eq!(context.registry().len(), 1);
    assert_eq!(harness.host.engine.registered().len(), 1);
}

#[tokio::test]
async fn test_reload_of_loaded_origin_is_noop() {
    let harness = harness_for(StaticExtension::new(test_descriptor("demo")).into_object());
    let context = harness.context();

    context.loader().load(ORIGIN).await.unwrap();
    context.loader().load(ORIGIN).await.unwrap();

    assert_eq!(harness.fetcher.calls(), 1);
    assert_eq!(harness.scripts.injections(), 1);
}

#[tokio::test]
async fn test_invalid_id_leaves_no_registry_entry() {
    let harness = harness_for(StaticExtension::new(invalid_descriptor()).into_object());
    let context = harness.context();

    let err = context.loader().load(ORIGIN).await.unwrap_err();

    assert!(matches!(err, ExtensionError::LoadFailed { .. }), "{err}");
    assert!(err.to_string().contains("not-valid!"));
    assert!(context.registry().is_empty());
    assert!(harness.host.engine.registered().is_empty());
    assert_eq!(harness.scripts.disposals(), 1);
}

#[tokio::test]
async fn test_script_error_fails_load() {
    tether_test::setup_test_logging_default();
    let scripts = MockScriptHost::new()
        .with_default_behaviour(ScriptBehaviour::Fail("ReferenceError: Demo".to_string()));
    let fetcher = MockFetcher::new().with_source(ORIGIN, "new Demo()");
    let harness = TestHarness::new(scripts, fetcher);
    let context = harness.context();

    let err = context.loader().load(ORIGIN).await.unwrap_err();

    assert!(err.to_string().contains("ReferenceError"));
    assert!(!context.registry().contains(ORIGIN));
    assert_eq!(harness.scripts.disposals(), 1);
}

#[tokio::test]
async fn test_fetch_failure_never_injects() {
    let harness = harness_for(StaticExtension::new(test_descriptor("demo")).into_object());
    let context = harness.context();

    let err = context
        .loader()
        .load("https://ext.example/missing.js")
        .await
        .unwrap_err();

    assert!(err.to_string().contains("404"));
    assert_eq!(harness.scripts.injections(), 0);
    assert!(context.registry().is_empty());
}

#[tokio::test]
async fn test_engine_rejection_fails_load() {
    let harness = harness_for(StaticExtension::new(test_descriptor("demo")).into_object());
    harness.host.engine.reject_registrations(Some("duplicate extension"));
    let context = harness.context();

    let err = context.loader().load(ORIGIN).await.unwrap_err();

    assert!(err.to_string().contains("duplicate extension"));
    assert!(context.registry().is_empty());
}

#[tokio::test]
async fn test_load_code_uses_data_url() {
    let harness = harness_for(StaticExtension::new(test_descriptor("inline")).into_object());
    let context = harness.context();

    context.loader().load_code("class Inline {}").await.unwrap();

    let (origin, _) = context.registry().entries().remove(0);
    assert!(origin.starts_with("data:text/javascript;base64,"));
    assert_eq!(harness.fetcher.calls(), 0);
    let (_, source) = &harness.scripts.injected()[0];
    assert!(source.contains("class Inline {}"));
}

#[tokio::test]
async fn test_sanitized_opcode_reaches_engine() {
    let descriptor = json!({"id": "foo1", "blocks": [{"opcode": "a<b", "blockType": "command"}]});
    let harness = harness_for(StaticExtension::new(descriptor).into_object());
    let context = harness.context();

    context.loader().load(ORIGIN).await.unwrap();

    let registered = harness.host.engine.registered();
    let block = registered[0].block("ab").unwrap();
    assert_eq!(block.opcode(), Some("ab"));
    assert_eq!(block.text(), &Value::from("ab"));
}

#[tokio::test]
async fn test_empty_dynamic_menu_names_producer() {
    let descriptor = json!({
        "id": "colors",
        "menus": {"colorMenu": {"items": "getColors"}},
    });
    let extension = StaticExtension::new(descriptor).with_method("getColors", |_| Ok(json!([])));
    let harness = harness_for(extension.into_object());
    let context = harness.context();

    context.loader().load(ORIGIN).await.unwrap();

    let entry = context.registry().get(ORIGIN).unwrap();
    let menu = entry.info.menu("colorMenu").unwrap();
    let MenuItems::Dynamic(producer) = &menu.items else {
        panic!("expected a dynamic menu");
    };
    let err = producer.items().unwrap_err();
    assert!(err.to_string().contains("getColors"), "{err}");
}

#[tokio::test]
async fn test_refresh_reforwards_live_info() {
    let extension = StaticExtension::new(test_descriptor("live"));
    let shared = Arc::new(extension);
    let harness = harness_for(Arc::clone(&shared) as Arc<dyn ExtensionObject>);
    let context = harness.context();
    let mut refreshed = context.bus().subscribe_type("extension_refreshed");

    context.loader().load(ORIGIN).await.unwrap();
    shared.set_info(json!({
        "id": "live",
        "name": "Live v2",
        "blocks": [{"opcode": "added", "blockType": "reporter"}],
    }));

    assert_eq!(context.loader().refresh(), 1);

    let refreshed_info = harness.host.engine.refreshed();
    assert_eq!(refreshed_info.len(), 1);
    assert!(refreshed_info[0].block("added").is_some());
    assert_eq!(refreshed_info[0].name, Value::from("Live v2"));
    assert!(refreshed.try_recv().is_some());
}

#[tokio::test]
async fn test_reset_forgets_loaded_extensions() {
    let harness = harness_for(StaticExtension::new(test_descriptor("demo")).into_object());
    let context: TetherContext = harness.context();

    context.loader().load(ORIGIN).await.unwrap();
    context.reset();

    assert!(context.registry().is_empty());
    assert!(context.registry().declared_ids().is_empty());

    context.loader().load(ORIGIN).await.unwrap();
    assert_eq!(harness.fetcher.calls(), 2);
}
