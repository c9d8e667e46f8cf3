//! Permission policies for extension capabilities.
//!
//! The surface resolves URLs and applies the rules no policy may relax
//! (unparsable URLs are never fetched or embedded, `javascript:` is never
//! opened or navigated to). Everything else is up to the policy.

use async_trait::async_trait;
use tether_config::PermissionsSection;
use url::Url;

/// Decides what an extension may do through its capability surface.
///
/// Checks are async so an implementation can prompt the user.
#[async_trait]
pub trait PermissionPolicy: Send + Sync {
    /// May the extension fetch `url`?
    async fn can_fetch(&self, url: &Url) -> bool;

    /// May the extension embed content from `url`?
    async fn can_embed(&self, url: &Url) -> bool;

    /// May the extension open a window at `url`? `None` when the URL did not
    /// parse against the document location.
    async fn can_open_window(&self, url: Option<&Url>) -> bool;

    /// May the extension navigate the host page to `url`?
    async fn can_redirect(&self, url: Option<&Url>) -> bool;

    /// May the extension record audio?
    async fn can_record_audio(&self) -> bool;

    /// May the extension record video?
    async fn can_record_video(&self) -> bool;

    /// May the extension read the clipboard?
    async fn can_read_clipboard(&self) -> bool;

    /// May the extension show notifications?
    async fn can_notify(&self) -> bool;

    /// May the extension read the geolocation?
    async fn can_geolocate(&self) -> bool;
}

/// Policy that permits everything (unsandboxed extensions).
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllPolicy;

#[async_trait]
impl PermissionPolicy for AllowAllPolicy {
    async fn can_fetch(&self, _url: &Url) -> bool {
        true
    }

    async fn can_embed(&self, _url: &Url) -> bool {
        true
    }

    async fn can_open_window(&self, _url: Option<&Url>) -> bool {
        true
    }

    async fn can_redirect(&self, _url: Option<&Url>) -> bool {
        true
    }

    async fn can_record_audio(&self) -> bool {
        true
    }

    async fn can_record_video(&self) -> bool {
        true
    }

    async fn can_read_clipboard(&self) -> bool {
        true
    }

    async fn can_notify(&self) -> bool {
        true
    }

    async fn can_geolocate(&self) -> bool {
        true
    }
}

/// Policy that denies everything (for testing).
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAllPolicy;

#[async_trait]
impl PermissionPolicy for DenyAllPolicy {
    async fn can_fetch(&self, _url: &Url) -> bool {
        false
    }

    async fn can_embed(&self, _url: &Url) -> bool {
        false
    }

    async fn can_open_window(&self, _url: Option<&Url>) -> bool {
        false
    }

    async fn can_redirect(&self, _url: Option<&Url>) -> bool {
        false
    }

    async fn can_record_audio(&self) -> bool {
        false
    }

    async fn can_record_video(&self) -> bool {
        false
    }

    async fn can_read_clipboard(&self) -> bool {
        false
    }

    async fn can_notify(&self) -> bool {
        false
    }

    async fn can_geolocate(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Config-driven policy
// ---------------------------------------------------------------------------

/// Policy built from the `[permissions]` config section.
#[derive(Debug, Clone)]
pub struct ConfiguredPolicy {
    permissions: PermissionsSection,
}

impl ConfiguredPolicy {
    /// Wrap a permissions section.
    #[must_use]
    pub fn new(permissions: PermissionsSection) -> Self {
        Self { permissions }
    }
}

impl From<PermissionsSection> for ConfiguredPolicy {
    fn from(permissions: PermissionsSection) -> Self {
        Self::new(permissions)
    }
}

/// `"*"` matches any URL; a domain matches itself and its subdomains. A URL
/// without a host (`data:`, `blob:`) only matches `"*"`.
fn domain_allowed(patterns: &[String], url: &Url) -> bool {
    let host = url.host_str();
    patterns.iter().any(|d| {
        d == "*"
            || host.is_some_and(|h| h.eq_ignore_ascii_case(d) || h.ends_with(&format!(".{d}")))
    })
}

#[async_trait]
impl PermissionPolicy for ConfiguredPolicy {
    async fn can_fetch(&self, url: &Url) -> bool {
        domain_allowed(&self.permissions.fetch_domains, url)
    }

    async fn can_embed(&self, url: &Url) -> bool {
        domain_allowed(&self.permissions.embed_domains, url)
    }

    async fn can_open_window(&self, _url: Option<&Url>) -> bool {
        self.permissions.open_window
    }

    async fn can_redirect(&self, _url: Option<&Url>) -> bool {
        self.permissions.redirect
    }

    async fn can_record_audio(&self) -> bool {
        self.permissions.record_audio
    }

    async fn can_record_video(&self) -> bool {
        self.permissions.record_video
    }

    async fn can_read_clipboard(&self) -> bool {
        self.permissions.read_clipboard
    }

    async fn can_notify(&self) -> bool {
        self.permissions.notify
    }

    async fn can_geolocate(&self) -> bool {
        self.permissions.geolocate
    }
}
