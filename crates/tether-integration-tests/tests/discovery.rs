//! Block-editor and state-store discovery against a simulated host page.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tether_core::HostValue;
use tether_events::{StoreSource, TetherEvent};
use tether_test::{FixtureHost, MockFetcher, MockScriptHost, TestHarness, gui_state};

fn harness_on(host: FixtureHost) -> TestHarness {
    tether_test::setup_test_logging_default();
    TestHarness::on(host, MockScriptHost::new(), MockFetcher::new())
}

#[tokio::test]
async fn test_block_editor_waits_for_listener() {
    let harness = harness_on(FixtureHost::new());
    let context = harness.context();
    let trap = Arc::clone(context.block_editor());

    let waiting = tokio::spawn({
        let trap = Arc::clone(&trap);
        async move { trap.get().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!waiting.is_finished());
    assert!(trap.eager().is_none());

    harness.host.attach_block_editor();

    let handle = tokio::time::timeout(Duration::from_secs(1), waiting)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(handle.get().unwrap().ptr_eq(&harness.host.editor));

    let second = trap.get().await.unwrap();
    assert_eq!(second, handle);
    assert_eq!(trap.eager(), Some(handle));
}

#[tokio::test]
async fn test_block_editor_resolves_immediately_when_wired() {
    let harness = harness_on(FixtureHost::preloaded());
    let context = harness.context();
    let mut resolved = context.bus().subscribe_type("block_editor_resolved");

    let surface = context.build_surface();
    let handle = surface.gui().block_editor().await.unwrap();

    assert!(handle.get().unwrap().ptr_eq(&harness.host.editor));
    assert!(surface.gui().block_editor_eagerly().is_some());
    assert!(resolved.try_recv().is_some());
}

#[tokio::test]
async fn test_store_dispatches_emit_ordered_changes() {
    let harness = harness_on(FixtureHost::new());
    let context = harness.context();
    let trap = Arc::clone(context.store());

    let waiting = tokio::spawn({
        let trap = Arc::clone(&trap);
        async move { trap.get().await }
    });
    tokio::task::yield_now().await;

    let host_store = harness.host.create_counter_store();
    let store = tokio::time::timeout(Duration::from_secs(1), waiting)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(store.source(), StoreSource::Interception);

    let mut changes = store.changes();
    host_store.dispatch(json!({"type": "inc"}));
    store.dispatch(json!({"type": "inc", "by": "extension"})).unwrap();

    let mut seen = Vec::new();
    for _ in 0..2 {
        let event = changes.try_recv().unwrap();
        let TetherEvent::StateChanged { change, .. } = event.as_ref() else {
            panic!("unexpected event {event:?}");
        };
        seen.push((change.previous.get("n"), change.next.get("n"), change.action.clone()));
    }
    assert_eq!(seen[0].0, HostValue::Number(0.0));
    assert_eq!(seen[0].1, HostValue::Number(1.0));
    assert_eq!(seen[1].0, HostValue::Number(1.0));
    assert_eq!(seen[1].1, HostValue::Number(2.0));
    assert_eq!(seen[1].2, json!({"type": "inc", "by": "extension"}));
    assert!(changes.try_recv().is_none());

    assert_eq!(store.state().get("n"), HostValue::Number(2.0));
    assert_eq!(host_store.get_state().get("n"), HostValue::Number(2.0));
}

#[tokio::test]
async fn test_store_falls_back_to_dom() {
    let harness = harness_on(FixtureHost::preloaded());
    let context = harness.context();

    assert!(context.store().eager().is_none());

    let surface = context.build_surface();
    let store = surface.store_eagerly().unwrap();
    assert_eq!(store.source(), StoreSource::Dom);
    assert!(store.is_wired());
    assert!(store.state().get_path("scratchGui.vm").is_truthy());
    assert!(context.store().eager().is_none());
}

#[tokio::test]
async fn test_interception_wins_after_dom_lookup() {
    let harness = harness_on(FixtureHost::preloaded());
    let context = harness.context();
    let surface = context.build_surface();
    assert_eq!(surface.store_eagerly().map(|s| s.source()), Some(StoreSource::Dom));

    let trap = Arc::clone(context.store());
    trap.install();
    let waiting = tokio::spawn(async move { trap.get().await });
    tokio::task::yield_now().await;
    harness.host.create_counter_store();

    let store = tokio::time::timeout(Duration::from_secs(1), waiting)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(store.source(), StoreSource::Interception);
    assert_eq!(
        surface.store_eagerly().map(|s| s.source()),
        Some(StoreSource::Interception)
    );
}

#[tokio::test]
async fn test_dom_fallback_skips_near_matches() {
    let host = FixtureHost::new();
    host.attach_dom_store(json!({"scratchGui": {}}));
    host.attach_dom_store(gui_state());
    let harness = harness_on(host);
    let context = harness.context();

    let store = context.store().locate_in_dom().unwrap();
    assert!(store.state().get("scratchPaint").is_truthy());
}

#[tokio::test]
async fn test_dom_fallback_unavailable_is_none() {
    let host = FixtureHost::new();
    host.attach_dom_store(json!({"unrelated": true}));
    let harness = harness_on(host);
    let context = harness.context();

    assert!(context.store().locate_in_dom().is_none());
}

#[tokio::test]
async fn test_reset_rearms_discovery() {
    let harness = harness_on(FixtureHost::preloaded());
    let context = harness.context();

    context.block_editor().get().await.unwrap();
    context.reset();
    assert!(context.block_editor().eager().is_none());

    let again = context.block_editor().get().await.unwrap();
    assert!(again.get().unwrap().ptr_eq(&harness.host.editor));
}
