//! Where key sets come from.
//!
//! [`KeyResolver`](crate::resolver::KeyResolver) only knows the
//! [`KeySetSource`] trait, so tests and pinned-key deployments substitute a
//! [`StaticKeySetSource`] for the [`HttpKeySetSource`] used in production.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header};

use crate::{error::KeySetError, key_set::SigningKeySet};

/// Largest JWKS body accepted by [`HttpKeySetSource`] unless overridden (1 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Provider of the issuer's current key set.
#[async_trait]
pub trait KeySetSource: Send + Sync {
    /// Retrieves the current key set.
    ///
    /// # Errors
    ///
    /// Returns a [`KeySetError`] if the set cannot be retrieved or decoded.
    async fn fetch(&self) -> Result<SigningKeySet, KeySetError>;

    /// Human-readable location for logs.
    fn location(&self) -> &str;
}

/// Fetches a JWKS document over HTTP(S).
///
/// The request is a plain `GET`; no caller credentials are forwarded.
/// Bodies larger than the configured cap are rejected without being read in
/// full.
#[derive(Debug, Clone)]
pub struct HttpKeySetSource {
    client: Client,
    url: String,
    max_body_bytes: usize,
}

impl HttpKeySetSource {
    /// Creates a source for `url` whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`KeySetError::Internal`] if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, KeySetError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KeySetError::internal(format!("cannot build HTTP client: {e}")))?;
        Ok(Self::with_client(client, url))
    }

    /// Creates a source that reuses an existing client.
    #[must_use]
    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self { client, url: url.into(), max_body_bytes: DEFAULT_MAX_BODY_BYTES }
    }

    /// Replaces the body size cap.
    #[must_use]
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// The JWKS URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl KeySetSource for HttpKeySetSource {
    #[tracing::instrument(skip(self), fields(url = %self.url))]
    async fn fetch(&self) -> Result<SigningKeySet, KeySetError> {
        let mut response = self
            .client
            .get(&self.url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?
            .error_for_status()?;

        let limit = self.max_body_bytes;
        if let Some(length) = response.content_length()
            && length > limit as u64
        {
            return Err(oversized(limit));
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > limit {
                return Err(oversized(limit));
            }
            body.extend_from_slice(&chunk);
        }

        SigningKeySet::from_jwks_json(&body)
    }

    fn location(&self) -> &str {
        &self.url
    }
}

fn oversized(limit: usize) -> KeySetError {
    KeySetError::decode(format!("key set document exceeds {limit} bytes"))
}

/// Serves a fixed key set.
#[derive(Debug, Clone, Default)]
pub struct StaticKeySetSource {
    keys: SigningKeySet,
}

impl StaticKeySetSource {
    /// Creates a source that always returns `keys`.
    #[must_use]
    pub fn new(keys: SigningKeySet) -> Self {
        Self { keys }
    }
}

#[async_trait]
impl KeySetSource for StaticKeySetSource {
    async fn fetch(&self) -> Result<SigningKeySet, KeySetError> {
        Ok(self.keys.clone())
    }

    fn location(&self) -> &str {
        "static"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::testutil::{TRUSTED_KID, key_set};

    #[tokio::test]
    async fn test_static_source_returns_same_set() {
        let source = StaticKeySetSource::new(key_set());
        let first = source.fetch().await.unwrap();
        let second = source.fetch().await.unwrap();
        assert_eq!(first.kids(), second.kids());
        assert!(first.get(TRUSTED_KID).is_some());
        assert_eq!(source.location(), "static");
    }

    #[test]
    fn test_http_source_location_is_url() {
        let source =
            HttpKeySetSource::new("https://idp.test/.well-known/jwks.json", Duration::from_secs(1))
                .unwrap();
        assert_eq!(source.location(), "https://idp.test/.well-known/jwks.json");
        assert_eq!(source.url(), source.location());
        assert_eq!(source.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
        assert_eq!(source.with_max_body_bytes(512).max_body_bytes, 512);
    }
}
