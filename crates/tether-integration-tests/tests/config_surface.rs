//! Configuration flowing into a context and the capability surfaces it hands
//! out.

use serde_json::json;
use tether_capabilities::CapabilityError;
use tether_config::Config;
use tether_test::{
    FixtureHost, MockFetcher, MockScriptHost, TestHarness, setup_test_logging_default,
    test_file_with_extension,
};

const RESTRICTED: &str = r#"
[permissions]
fetch_domains = ["cdn.example.org"]
redirect = false
notify = false

[discovery]
block_editor_member = "BlockEditor"
"#;

fn harness() -> TestHarness {
    setup_test_logging_default();
    TestHarness::new(MockScriptHost::new(), MockFetcher::new())
}

#[tokio::test]
async fn test_configured_permissions_gate_surface() {
    let harness = harness();
    let file = test_file_with_extension(RESTRICTED, "toml");
    let config = Config::load_file(file.path()).unwrap();
    let context = harness.builder().with_config(&config).build().unwrap();
    let surface = context.build_surface();

    assert!(surface.can_fetch("https://cdn.example.org/lib.js").await);
    assert!(!surface.can_fetch("/relative.json").await);
    assert!(!surface.can_notify().await);
    assert!(surface.can_record_audio().await);

    let err = surface.fetch("https://elsewhere.example/").await.unwrap_err();
    assert!(matches!(err, CapabilityError::PermissionDenied { .. }));
    assert!(harness.services.fetched().is_empty());

    surface.fetch("https://cdn.example.org/lib.js").await.unwrap();
    assert_eq!(harness.services.fetched(), vec!["https://cdn.example.org/lib.js"]);

    assert!(surface.redirect("https://cdn.example.org/").await.is_err());
    assert!(harness.services.navigated().is_empty());
}

#[tokio::test]
async fn test_open_window_prefixes_noreferrer_and_blocks_scripts() {
    let harness = harness();
    let context = harness.context();
    let surface = context.build_surface();

    surface
        .open_window("https://docs.example/", Some("width=400"))
        .await
        .unwrap();
    let opened = harness.services.opened();
    assert_eq!(opened[0].2, "noreferrer,width=400");

    assert!(!surface.can_open_window("javascript:alert(1)").await);
    assert!(!surface.can_redirect("javascript:alert(1)").await);
    assert!(surface.open_window("javascript:alert(1)", None).await.is_err());
    assert_eq!(harness.services.opened().len(), 1);
}

#[tokio::test]
async fn test_discovery_section_reaches_traps() {
    setup_test_logging_default();
    let config = Config::from_toml_str(RESTRICTED).unwrap();
    let harness = TestHarness::on(FixtureHost::preloaded(), MockScriptHost::new(), MockFetcher::new());
    let context = harness.builder().with_config(&config).build().unwrap();

    // The fixture exposes `ScratchBlocks`, which this configuration no
    // longer looks for.
    let trap = std::sync::Arc::clone(context.block_editor());
    let waiting = tokio::spawn(async move { trap.get().await });
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    assert!(!waiting.is_finished());
    waiting.abort();
}

#[tokio::test]
async fn test_translator_follows_host_locale() {
    let harness = harness();
    let context = harness.context();
    let surface = context.build_surface();
    surface.translator().setup(Some(json!({
        "de": {"_Hello": "Hallo"},
    })));

    assert_eq!(surface.translate(&json!("Hello"), None).unwrap(), "Hello");

    harness.host.engine.set_locale("de");

    assert_eq!(context.translator().language(), "de");
    assert_eq!(surface.translator().language(), "de");
    assert_eq!(surface.translate(&json!("Hello"), None).unwrap(), "Hallo");
    assert!(matches!(
        surface.translate(&json!(42), None),
        Err(CapabilityError::InvalidMessage(_))
    ));
}
