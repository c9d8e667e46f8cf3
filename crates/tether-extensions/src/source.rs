//! Fetching extension source code.
//!
//! `data:` URLs are decoded locally; everything else goes through a
//! [`SourceFetcher`]. [`HttpFetcher`] is the reqwest-backed default.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{CACHE_CONTROL, HeaderMap, HeaderValue, PRAGMA};
use tracing::debug;

use crate::error::{ExtensionError, ExtensionResult};
use crate::loader::LoaderConfig;

/// Retrieves extension source text for an origin.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Fetch the source at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionError::Fetch`] when the source cannot be retrieved.
    async fn fetch_source(&self, url: &str) -> ExtensionResult<String>;
}

/// HTTP fetcher.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a client from the loader configuration. With `no_cache` set
    /// every request asks intermediaries not to serve a cached copy.
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionError::Fetch`] if the client cannot be built.
    pub fn new(config: &LoaderConfig) -> ExtensionResult<Self> {
        let mut headers = HeaderMap::new();
        if config.no_cache {
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
            headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        }
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| ExtensionError::Fetch {
                origin: String::new(),
                message: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch_source(&self, url: &str) -> ExtensionResult<String> {
        let fetch_error = |message: String| ExtensionError::Fetch {
            origin: url.to_owned(),
            message,
        };
        debug!(url, "fetching extension source");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("server returned {status}")));
        }
        response.text().await.map_err(|e| fetch_error(e.to_string()))
    }
}

/// Wrap raw bytes in a base64 `data:` URL.
#[must_use]
pub fn to_data_url(bytes: &[u8]) -> String {
    format!("data:text/javascript;base64,{}", STANDARD.encode(bytes))
}

/// Decode a `data:` URL. Returns `Ok(None)` for any other URL.
///
/// # Errors
///
/// Returns [`ExtensionError::Fetch`] if the URL is malformed.
pub fn decode_data_url(url: &str) -> ExtensionResult<Option<String>> {
    let Some(rest) = url.strip_prefix("data:") else {
        return Ok(None);
    };
    let malformed = |message: &str| ExtensionError::Fetch {
        origin: url.chars().take(64).collect(),
        message: message.to_owned(),
    };
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| malformed("data URL has no payload separator"))?;

    let bytes = if meta.split(';').any(|part| part.eq_ignore_ascii_case("base64")) {
        STANDARD
            .decode(payload.trim())
            .map_err(|e| malformed(&format!("invalid base64 payload: {e}")))?
    } else {
        percent_decode(payload)
    };
    String::from_utf8(bytes)
        .map(Some)
        .map_err(|_| malformed("payload is not UTF-8"))
}

/// Invalid escapes are kept verbatim.
fn percent_decode(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0usize;
    while let Some(&b) = bytes.get(i) {
        let escaped = (b == b'%')
            .then(|| bytes.get(i.saturating_add(1)..i.saturating_add(3)))
            .flatten()
            .and_then(|hex| std::str::from_utf8(hex).ok())
            .and_then(|hex| u8::from_str_radix(hex, 16).ok());
        match escaped {
            Some(decoded) => {
                out.push(decoded);
                i = i.saturating_add(3);
            },
            None => {
                out.push(b);
                i = i.saturating_add(1);
            },
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_url_round_trip() {
        let url = to_data_url(b"Scratch.extensions.register(new X());");
        assert!(url.starts_with("data:text/javascript;base64,"));
        assert_eq!(
            decode_data_url(&url).unwrap().as_deref(),
            Some("Scratch.extensions.register(new X());")
        );
    }

    #[test]
    fn test_percent_encoded_data_url() {
        assert_eq!(
            decode_data_url("data:text/javascript,let%20x%20%3D%201%3B%zz").unwrap().as_deref(),
            Some("let x = 1;%zz")
        );
    }

    #[test]
    fn test_non_data_url_passes_through() {
        assert!(decode_data_url("https://example.com/ext.js").unwrap().is_none());
    }

    #[test]
    fn test_malformed_data_url() {
        assert!(matches!(
            decode_data_url("data:text/javascript;base64"),
            Err(ExtensionError::Fetch { .. })
        ));
        assert!(decode_data_url("data:;base64,!!!").is_err());
    }

    #[test]
    fn test_http_fetcher_builds() {
        let fetcher = HttpFetcher::new(&LoaderConfig::default());
        assert!(fetcher.is_ok());
    }
}
