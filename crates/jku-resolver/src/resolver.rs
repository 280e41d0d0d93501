//! Key resolvers: given a token header, produce its verification key.
//!
//! Three implementations of [`KeyResolver`]:
//!
//! - [`KnownKeyResolver`] - one fixed algorithm and key, no network
//! - [`JkuKeyResolver`] - fetches the `jku` key set on every call
//! - [`CachedJkuKeyResolver`] - same resolution, with the fetch behind an
//!   injected [`KeySetCache`]
//!
//! A `jku` resolution is a single linear attempt:
//!
//! 1. `jku` present and non-empty, else `MissingTrustAnchor`
//! 2. trust validator accepts `jku` for the authority domain, else
//!    `UntrustedKeySetUrl`
//! 3. `kid` present and a string, else `MalformedHeader`
//! 4. key set from cache or fetch, else `KeySetFetchFailed`
//! 5. `kid` found in the set, else `KeyNotFound`
//! 6. key decoded, else `KeyDecodeFailed`

use crate::cache::{cache_key, Expiration, KeySetCache};
use crate::config::AuthorityConfig;
use crate::error::{HeaderFieldError, KeyError};
use crate::header::TokenHeader;
use crate::jwks::{select_key, HttpJwksFetcher, JwksFetcher};
use crate::trust::{DomainJkuValidator, JkuValidator};
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::instrument;

/// Resolves the verification key for a token from its header.
#[async_trait::async_trait]
pub trait KeyResolver: Send + Sync {
    /// Return the key that verifies the token carrying `header`.
    ///
    /// # Errors
    ///
    /// Returns a `KeyError`; no key is returned on any failure.
    async fn resolve(&self, header: &TokenHeader) -> Result<DecodingKey, KeyError>;
}

// =============================================================================
// Static resolver
// =============================================================================

/// Resolver for deployments with a single known algorithm and key.
///
/// Rejects any header whose `alg` is not exactly the configured algorithm,
/// which blocks algorithm-substitution attacks; otherwise returns the
/// configured key.
#[derive(Clone)]
pub struct KnownKeyResolver {
    algorithm: Algorithm,
    key: DecodingKey,
}

impl KnownKeyResolver {
    #[must_use]
    pub fn new(algorithm: Algorithm, key: DecodingKey) -> Self {
        Self { algorithm, key }
    }

    fn check_algorithm(&self, header: &TokenHeader) -> Result<(), KeyError> {
        let declared = header.algorithm().ok();
        let matches = declared
            .and_then(|alg| Algorithm::from_str(alg).ok())
            .is_some_and(|alg| alg == self.algorithm);

        if matches {
            return Ok(());
        }

        tracing::debug!(
            target: "jku.resolver",
            expected = ?self.algorithm,
            declared = ?declared,
            "Token rejected: signing algorithm mismatch"
        );
        Err(KeyError::AlgorithmMismatch {
            expected: format!("{:?}", self.algorithm),
            found: declared.map(ToString::to_string),
        })
    }
}

impl fmt::Debug for KnownKeyResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KnownKeyResolver")
            .field("algorithm", &self.algorithm)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[async_trait::async_trait]
impl KeyResolver for KnownKeyResolver {
    async fn resolve(&self, header: &TokenHeader) -> Result<DecodingKey, KeyError> {
        self.check_algorithm(header)?;
        Ok(self.key.clone())
    }
}

// =============================================================================
// Shared jku resolution steps
// =============================================================================

/// Steps 1-2: read `jku` and require the validator to accept it.
///
/// Both `Ok(false)` and `Err(_)` from the validator deny the URL.
fn trusted_key_set_url<'h>(
    header: &'h TokenHeader,
    authority: &AuthorityConfig,
    validator: &dyn JkuValidator,
) -> Result<&'h str, KeyError> {
    let jku = match header.key_set_url() {
        Ok(jku) if !jku.is_empty() => jku,
        // JSON null counts as absent
        Ok(_)
        | Err(
            HeaderFieldError::Missing { .. } | HeaderFieldError::WrongType { found: "null", .. },
        ) => {
            tracing::debug!(target: "jku.resolver", "Token rejected: no jku in header");
            return Err(KeyError::MissingTrustAnchor);
        }
        Err(e @ HeaderFieldError::WrongType { .. }) => {
            tracing::debug!(target: "jku.resolver", error = %e, "Token rejected: jku is not a string");
            return Err(KeyError::MalformedHeader(e));
        }
    };

    let domain = authority.uaa_domain();
    match validator.validate(jku, domain) {
        Ok(true) => Ok(jku),
        Ok(false) => {
            tracing::debug!(target: "jku.resolver", jku = %jku, domain = %domain, "Token rejected: jku not trusted");
            Err(KeyError::UntrustedKeySetUrl {
                url: jku.to_string(),
                domain: domain.to_string(),
                source: None,
            })
        }
        Err(e) => {
            tracing::debug!(target: "jku.resolver", jku = %jku, domain = %domain, error = %e, "Token rejected: jku validation failed");
            Err(KeyError::UntrustedKeySetUrl {
                url: jku.to_string(),
                domain: domain.to_string(),
                source: Some(e),
            })
        }
    }
}

/// Step 3: read `kid`.
fn key_id(header: &TokenHeader) -> Result<&str, KeyError> {
    header.key_id().map_err(|e| {
        tracing::debug!(target: "jku.resolver", error = %e, "Token rejected: no string kid in header");
        KeyError::MalformedHeader(e)
    })
}

/// Step 4 without a cache.
async fn fetch_key_set(fetcher: &dyn JwksFetcher, url: &str) -> Result<JwkSet, KeyError> {
    fetcher
        .fetch(url)
        .await
        .map_err(|source| KeyError::KeySetFetchFailed {
            url: url.to_string(),
            source,
        })
}

// =============================================================================
// Uncached resolver
// =============================================================================

/// `jku` resolver without caching: every call fetches the key set.
///
/// Meant for tests and low-volume callers; use [`CachedJkuKeyResolver`] on a
/// request path.
pub struct JkuKeyResolver {
    authority: AuthorityConfig,
    validator: Arc<dyn JkuValidator>,
    fetcher: Arc<dyn JwksFetcher>,
}

impl JkuKeyResolver {
    /// Create a resolver that fetches over HTTP.
    ///
    /// # Arguments
    ///
    /// * `authority` - Trust anchor for `jku` validation
    /// * `validator` - Policy deciding which `jku` URLs are trusted
    #[must_use]
    pub fn new(authority: AuthorityConfig, validator: Arc<dyn JkuValidator>) -> Self {
        Self {
            authority,
            validator,
            fetcher: Arc::new(HttpJwksFetcher::new()),
        }
    }

    /// Replace the key-set fetcher.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn JwksFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }
}

#[async_trait::async_trait]
impl KeyResolver for JkuKeyResolver {
    #[instrument(skip_all)]
    async fn resolve(&self, header: &TokenHeader) -> Result<DecodingKey, KeyError> {
        let jku = trusted_key_set_url(header, &self.authority, self.validator.as_ref())?;
        let kid = key_id(header)?;

        let key_set = fetch_key_set(self.fetcher.as_ref(), jku).await?;

        select_key(&key_set, kid)
    }
}

// =============================================================================
// Cached resolver
// =============================================================================

/// `jku` resolver with an injected key-set cache.
///
/// On a miss the key set is fetched and stored under
/// `cache_key(authority domain, kid)` with the cache's default expiration.
/// Decoded keys are not cached; they are re-derived from the cached set.
pub struct CachedJkuKeyResolver {
    authority: AuthorityConfig,
    validator: Arc<dyn JkuValidator>,
    fetcher: Arc<dyn JwksFetcher>,
    cache: Arc<dyn KeySetCache>,
}

impl CachedJkuKeyResolver {
    /// Create a resolver using the standard [`DomainJkuValidator`].
    ///
    /// # Arguments
    ///
    /// * `authority` - Trust anchor for `jku` validation
    /// * `cache` - Shared key-set cache, owned by the caller
    #[must_use]
    pub fn with_default_validator(authority: AuthorityConfig, cache: Arc<dyn KeySetCache>) -> Self {
        Self::new(authority, Arc::new(DomainJkuValidator::new()), cache)
    }

    /// Create a resolver with a custom trust validator.
    ///
    /// # Arguments
    ///
    /// * `authority` - Trust anchor for `jku` validation
    /// * `validator` - Policy deciding which `jku` URLs are trusted
    /// * `cache` - Shared key-set cache, owned by the caller
    #[must_use]
    pub fn new(
        authority: AuthorityConfig,
        validator: Arc<dyn JkuValidator>,
        cache: Arc<dyn KeySetCache>,
    ) -> Self {
        Self {
            authority,
            validator,
            fetcher: Arc::new(HttpJwksFetcher::new()),
            cache,
        }
    }

    /// Replace the key-set fetcher.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn JwksFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Step 4 through the cache.
    async fn cached_key_set(&self, jku: &str, kid: &str) -> Result<Arc<JwkSet>, KeyError> {
        let key = cache_key(self.authority.uaa_domain(), kid);

        if let Some(key_set) = self.cache.get(&key).await {
            tracing::debug!(target: "jku.resolver", kid = %kid, "JWKS cache hit");
            return Ok(key_set);
        }

        tracing::debug!(target: "jku.resolver", kid = %kid, jku = %jku, "JWKS cache miss");
        let key_set = Arc::new(fetch_key_set(self.fetcher.as_ref(), jku).await?);
        self.cache
            .set(key, Arc::clone(&key_set), Expiration::Default)
            .await;

        Ok(key_set)
    }
}

#[async_trait::async_trait]
impl KeyResolver for CachedJkuKeyResolver {
    #[instrument(skip_all)]
    async fn resolve(&self, header: &TokenHeader) -> Result<DecodingKey, KeyError> {
        let jku = trusted_key_set_url(header, &self.authority, self.validator.as_ref())?;
        let kid = key_id(header)?;

        let key_set = self.cached_key_set(jku, kid).await?;

        select_key(&key_set, kid)
    }
}
