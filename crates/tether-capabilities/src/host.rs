//! Host services the surface forwards to once a permission check passes.

use async_trait::async_trait;
use tether_core::HostValue;
use url::Url;

/// Response of a host fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    /// HTTP status (200 for decoded `data:` URLs).
    pub status: u16,
    /// Final URL after redirects.
    pub url: String,
    /// Raw body.
    pub body: Vec<u8>,
}

impl FetchResponse {
    /// Body decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Whether the status is 2xx.
    #[must_use]
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Side-effecting primitives of the host page.
#[async_trait]
pub trait HostServices: Send + Sync {
    /// Fetch a resource on behalf of an extension.
    async fn fetch(&self, url: &Url) -> anyhow::Result<FetchResponse>;

    /// Open a window; returns the host's window handle (or `Null`).
    fn open_window(&self, url: &str, target: &str, features: &str) -> HostValue;

    /// Navigate the host page.
    fn navigate(&self, url: &str);
}
