//! JWKS fetching and key selection.
//!
//! A key set is fetched by URL and parsed into a [`JwkSet`]. Keys are then
//! selected by `kid` and decoded into a [`DecodingKey`] on every resolution;
//! only the fetched set is ever cached, never the decoded key.
//!
//! # Security
//!
//! - Fetchers are only handed URLs that already passed trust validation
//! - Response bodies are capped (`max_jwks_bytes`) before parsing
//! - No retry at this layer; a failed fetch fails the resolution

use crate::config::{ResolverConfig, DEFAULT_FETCH_TIMEOUT_SECONDS, DEFAULT_MAX_JWKS_BYTES};
use crate::error::{FetchError, KeyError};
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::DecodingKey;
use std::time::Duration;
use tracing::instrument;

/// Retrieves and parses the key set published at a URL.
#[async_trait::async_trait]
pub trait JwksFetcher: Send + Sync {
    /// Fetch the key set at `url`.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` on transport, status, size or parse failure.
    async fn fetch(&self, url: &str) -> Result<JwkSet, FetchError>;
}

/// JWKS fetcher over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpJwksFetcher {
    http_client: reqwest::Client,
    max_jwks_bytes: usize,
}

impl Default for HttpJwksFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpJwksFetcher {
    /// Create a fetcher with the default timeout and size limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(
            Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECONDS),
            DEFAULT_MAX_JWKS_BYTES,
        )
    }

    /// Create a fetcher from resolver configuration.
    #[must_use]
    pub fn from_config(config: &ResolverConfig) -> Self {
        Self::with_limits(config.fetch_timeout, config.max_jwks_bytes)
    }

    /// Create a fetcher with a custom timeout and body size limit.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Total time allowed for one fetch
    /// * `max_jwks_bytes` - Largest accepted response body
    #[must_use]
    pub fn with_limits(timeout: Duration, max_jwks_bytes: usize) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "jku.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            http_client,
            max_jwks_bytes,
        }
    }

    /// Create a fetcher around an existing HTTP client.
    #[must_use]
    pub fn with_client(http_client: reqwest::Client, max_jwks_bytes: usize) -> Self {
        Self {
            http_client,
            max_jwks_bytes,
        }
    }
}

#[async_trait::async_trait]
impl JwksFetcher for HttpJwksFetcher {
    #[instrument(skip_all, fields(url = %url))]
    async fn fetch(&self, url: &str) -> Result<JwkSet, FetchError> {
        tracing::debug!(target: "jku.jwks", url = %url, "Fetching JWKS");

        let mut response = self.http_client.get(url).send().await.map_err(|e| {
            tracing::warn!(target: "jku.jwks", url = %url, error = %e, "Failed to fetch JWKS");
            FetchError::Transport(e.to_string())
        })?;

        if !response.status().is_success() {
            tracing::warn!(
                target: "jku.jwks",
                url = %url,
                status = %response.status(),
                "JWKS endpoint returned error"
            );
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let limit = self.max_jwks_bytes;
        if response
            .content_length()
            .is_some_and(|len| usize::try_from(len).map_or(true, |len| len > limit))
        {
            return Err(FetchError::BodyTooLarge { limit });
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?
        {
            if body.len() + chunk.len() > limit {
                tracing::warn!(target: "jku.jwks", url = %url, limit, "JWKS document too large");
                return Err(FetchError::BodyTooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }

        let jwks: JwkSet = serde_json::from_slice(&body).map_err(|e| {
            tracing::warn!(target: "jku.jwks", url = %url, error = %e, "Failed to parse JWKS response");
            FetchError::Parse(e.to_string())
        })?;

        tracing::debug!(
            target: "jku.jwks",
            url = %url,
            key_count = jwks.keys.len(),
            "JWKS fetched"
        );

        Ok(jwks)
    }
}

/// Select the key with identifier `kid` from `key_set` and decode it.
///
/// # Errors
///
/// - `KeyNotFound` - no key in the set has that identifier
/// - `KeyDecodeFailed` - the key's parameters cannot be decoded
pub fn select_key(key_set: &JwkSet, kid: &str) -> Result<DecodingKey, KeyError> {
    let jwk = key_set.find(kid).ok_or_else(|| {
        tracing::debug!(target: "jku.jwks", kid = %kid, "Key not found in JWKS");
        KeyError::KeyNotFound {
            kid: kid.to_string(),
        }
    })?;

    DecodingKey::from_jwk(jwk).map_err(|source| {
        tracing::debug!(target: "jku.jwks", kid = %kid, error = %source, "Failed to decode JWK");
        KeyError::KeyDecodeFailed {
            kid: kid.to_string(),
            source,
        }
    })
}

/// Mock JWKS fetcher module for testing.
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory fetcher serving fixed key sets by URL.
    #[derive(Default)]
    pub struct MockJwksFetcher {
        key_sets: HashMap<String, JwkSet>,
        failure: Option<FetchError>,
        delay: Option<Duration>,
        call_count: AtomicUsize,
        requested: Mutex<Vec<String>>,
    }

    impl MockJwksFetcher {
        /// A fetcher with no key sets (every fetch returns status 404).
        pub fn new() -> Self {
            Self::default()
        }

        /// A fetcher whose every call fails with `error`.
        pub fn failing(error: FetchError) -> Self {
            Self {
                failure: Some(error),
                ..Self::default()
            }
        }

        /// Serve `key_set` at `url`.
        #[must_use]
        pub fn with_key_set(mut self, url: impl Into<String>, key_set: JwkSet) -> Self {
            self.key_sets.insert(url.into(), key_set);
            self
        }

        /// Sleep before answering each fetch.
        #[must_use]
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        /// Number of fetches performed.
        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        /// URLs requested, in call order.
        pub fn requested_urls(&self) -> Vec<String> {
            self.requested
                .lock()
                .map(|urls| urls.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait::async_trait]
    impl JwksFetcher for MockJwksFetcher {
        async fn fetch(&self, url: &str) -> Result<JwkSet, FetchError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut requested) = self.requested.lock() {
                requested.push(url.to_string());
            }

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            if let Some(error) = &self.failure {
                return Err(error.clone());
            }

            self.key_sets
                .get(url)
                .cloned()
                .ok_or(FetchError::Status(404))
        }
    }
}
