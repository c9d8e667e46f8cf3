//! Test harness helpers.

use std::sync::Arc;

use tempfile::{NamedTempFile, TempDir};
use tether_extensions::{TetherContext, TetherContextBuilder};
use tracing_subscriber::EnvFilter;

use crate::fixtures::FixtureHost;
use crate::mocks::{MockFetcher, MockScriptHost, MockServices};

/// Set up test logging with the given filter.
///
/// Safe to call from every test; only the first call installs a subscriber.
///
/// # Example
///
/// ```rust,ignore
/// use tether_test::setup_test_logging;
///
/// #[test]
/// fn my_test() {
///     setup_test_logging("tether_extensions=debug");
/// }
/// ```
pub fn setup_test_logging(filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_test_writer()
        .try_init();
}

/// Set up test logging at `warn`.
pub fn setup_test_logging_default() {
    setup_test_logging("warn");
}

/// Create a temporary directory for testing.
///
/// # Panics
///
/// Panics if the temporary directory cannot be created.
#[must_use]
pub fn test_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

/// Create a temporary file with a specific extension and content.
///
/// # Panics
///
/// Panics if the file cannot be created or written.
#[must_use]
pub fn test_file_with_extension(content: &str, extension: &str) -> NamedTempFile {
    use std::io::Write;

    let mut file = tempfile::Builder::new()
        .suffix(&format!(".{extension}"))
        .tempfile()
        .expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write to temp file");
    file.flush().expect("Failed to flush temp file");
    file
}

/// A simulated page together with the mocks a context is built from.
#[derive(Debug)]
pub struct TestHarness {
    /// The page.
    pub host: FixtureHost,
    /// Script host deciding what each injected script does.
    pub scripts: Arc<MockScriptHost>,
    /// Source fetcher.
    pub fetcher: Arc<MockFetcher>,
    /// Host services seen by capability surfaces.
    pub services: Arc<MockServices>,
}

impl TestHarness {
    /// Harness over an already wired page.
    #[must_use]
    pub fn new(scripts: MockScriptHost, fetcher: MockFetcher) -> Self {
        Self::on(FixtureHost::preloaded(), scripts, fetcher)
    }

    /// Harness over `host`.
    #[must_use]
    pub fn on(host: FixtureHost, scripts: MockScriptHost, fetcher: MockFetcher) -> Self {
        Self {
            host,
            scripts: Arc::new(scripts),
            fetcher: Arc::new(fetcher),
            services: Arc::new(MockServices::new()),
        }
    }

    /// Context builder wired to this harness's mocks.
    #[must_use]
    pub fn builder(&self) -> TetherContextBuilder {
        self.host.context_builder(
            Arc::clone(&self.scripts),
            Arc::clone(&self.fetcher),
            Arc::clone(&self.services),
        )
    }

    /// Build a context with default configuration.
    ///
    /// # Panics
    ///
    /// Panics if the context cannot be built.
    #[must_use]
    pub fn context(&self) -> TetherContext {
        self.builder().build().expect("Failed to build context")
    }
}
