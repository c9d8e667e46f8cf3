//! Shared helpers for integration tests.

use std::sync::Arc;

use tether_core::ExtensionObject;
use tether_test::{MockFetcher, MockScriptHost, ScriptBehaviour, TestHarness};

/// Origin the default harness serves a script for.
#[allow(dead_code)]
pub const ORIGIN: &str = "https://ext.example/demo.js";

/// Harness whose every script registers `extension`, serving a source for
/// [`ORIGIN`].
#[allow(dead_code)]
pub fn harness_for(extension: Arc<dyn ExtensionObject>) -> TestHarness {
    tether_test::setup_test_logging_default();
    let scripts =
        MockScriptHost::new().with_default_behaviour(ScriptBehaviour::Register(extension));
    let fetcher = MockFetcher::new().with_source(ORIGIN, "Scratch.extensions.register(new Demo());");
    TestHarness::new(scripts, fetcher)
}
