//! End-to-end resolver tests against a mock JWKS endpoint.
//!
//! Tokens are signed with deterministic Ed25519 keys and name the mock
//! server in their `jku` header. The mock server speaks plain HTTP, so these
//! tests trust it through a closure validator rather than
//! `DomainJkuValidator`, which requires https.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use jku_resolver::cache::{KeySetCache, TtlKeySetCache};
use jku_resolver::config::{AuthorityConfig, ResolverConfig};
use jku_resolver::error::{FetchError, KeyError, TrustError, VerifyError};
use jku_resolver::jwks::{HttpJwksFetcher, JwksFetcher};
use jku_resolver::resolver::{CachedJkuKeyResolver, JkuKeyResolver};
use jku_resolver::trust::{DomainJkuValidator, JkuValidator};
use jku_resolver::verify::decode_verified;
use jku_test_utils::{init_test_tracing, TestClaims, TestClaimsBuilder, TestJwksServer, TestKeypair};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Trusts any `http://{domain}:port/...` URL.
fn trust_local() -> Arc<dyn JkuValidator> {
    Arc::new(|jku: &str, domain: &str| -> Result<bool, TrustError> {
        Ok(jku.starts_with(&format!("http://{domain}:")))
    })
}

fn cached_resolver(server: &TestJwksServer) -> CachedJkuKeyResolver {
    let cache: Arc<dyn KeySetCache> = Arc::new(TtlKeySetCache::new(Duration::from_secs(300)));
    CachedJkuKeyResolver::new(AuthorityConfig::new(server.host()), trust_local(), cache)
}

fn uncached_resolver(server: &TestJwksServer) -> JkuKeyResolver {
    JkuKeyResolver::new(AuthorityConfig::new(server.host()), trust_local())
}

fn validation() -> Validation {
    Validation::new(Algorithm::EdDSA)
}

#[tokio::test]
async fn test_cached_resolver_verifies_token_with_single_fetch() -> Result<()> {
    init_test_tracing();
    let server = TestJwksServer::start().await;
    let keypair = TestKeypair::new(1, "key-1")?;
    server.mount_jwks(&[&keypair], 1).await;

    let resolver = cached_resolver(&server);
    let claims = TestClaimsBuilder::new().for_user("alice").build();
    let token = keypair.sign_token(&claims, Some(&server.jwks_url()))?;

    let first = decode_verified::<TestClaims>(&token, &resolver, &validation()).await?;
    let second = decode_verified::<TestClaims>(&token, &resolver, &validation()).await?;

    assert_eq!(first.claims, claims);
    assert_eq!(second.claims, claims);
    assert_eq!(server.request_count().await, 1);
    Ok(())
}

#[tokio::test]
async fn test_uncached_resolver_fetches_every_time() -> Result<()> {
    let server = TestJwksServer::start().await;
    let keypair = TestKeypair::new(1, "key-1")?;
    server.mount_jwks(&[&keypair], 2).await;

    let resolver = uncached_resolver(&server);
    let token = keypair.sign_token(&TestClaimsBuilder::new().build(), Some(&server.jwks_url()))?;

    for _ in 0..2 {
        decode_verified::<TestClaims>(&token, &resolver, &validation()).await?;
    }
    Ok(())
}

#[tokio::test]
async fn test_selects_signing_key_from_multi_key_set() -> Result<()> {
    let server = TestJwksServer::start().await;
    let current = TestKeypair::new(1, "key-1")?;
    let next = TestKeypair::new(2, "key-2")?;
    server.mount_jwks(&[&current, &next], 1).await;

    let resolver = uncached_resolver(&server);
    let token = next.sign_token(
        &TestClaimsBuilder::new().for_user("bob").build(),
        Some(&server.jwks_url()),
    )?;

    let data = decode_verified::<TestClaims>(&token, &resolver, &validation()).await?;
    assert_eq!(data.claims.sub, "bob");
    Ok(())
}

#[tokio::test]
async fn test_key_rotation_on_uncached_resolver() -> Result<()> {
    let server = TestJwksServer::start().await;
    let retired = TestKeypair::new(1, "key-1")?;
    let current = TestKeypair::new(2, "key-2")?;
    server.mount_jwks(&[&retired], 1).await;

    let resolver = uncached_resolver(&server);
    let old_token = retired.sign_token(&TestClaimsBuilder::new().build(), Some(&server.jwks_url()))?;
    decode_verified::<TestClaims>(&old_token, &resolver, &validation()).await?;

    // Issuer publishes only the new key
    server.reset().await;
    server.mount_jwks(&[&current], 2).await;

    let new_token = current.sign_token(&TestClaimsBuilder::new().build(), Some(&server.jwks_url()))?;
    decode_verified::<TestClaims>(&new_token, &resolver, &validation()).await?;

    let result = decode_verified::<TestClaims>(&old_token, &resolver, &validation()).await;
    assert!(matches!(
        result,
        Err(VerifyError::Key(KeyError::KeyNotFound { kid })) if kid == retired.kid()
    ));
    Ok(())
}

#[tokio::test]
async fn test_unknown_kid_is_key_not_found() -> Result<()> {
    let server = TestJwksServer::start().await;
    let published = TestKeypair::new(1, "key-1")?;
    let rotated_out = TestKeypair::new(9, "key-9")?;
    server.mount_jwks(&[&published], 1).await;

    let resolver = cached_resolver(&server);
    let token = rotated_out.sign_token(&TestClaimsBuilder::new().build(), Some(&server.jwks_url()))?;

    let result = decode_verified::<TestClaims>(&token, &resolver, &validation()).await;
    assert!(matches!(
        result,
        Err(VerifyError::Key(KeyError::KeyNotFound { kid })) if kid == "key-9"
    ));
    Ok(())
}

#[tokio::test]
async fn test_forged_token_with_known_kid_fails_signature() -> Result<()> {
    let server = TestJwksServer::start().await;
    let genuine = TestKeypair::new(1, "key-1")?;
    let forger = TestKeypair::new(2, "key-1")?;
    server.mount_jwks(&[&genuine], 1).await;

    let resolver = cached_resolver(&server);
    let token = forger.sign_token(&TestClaimsBuilder::new().build(), Some(&server.jwks_url()))?;

    let result = decode_verified::<TestClaims>(&token, &resolver, &validation()).await;
    assert!(matches!(
        result,
        Err(VerifyError::Verification(e)) if matches!(e.kind(), ErrorKind::InvalidSignature)
    ));
    Ok(())
}

#[tokio::test]
async fn test_expired_token_fails_after_key_resolution() -> Result<()> {
    let server = TestJwksServer::start().await;
    let keypair = TestKeypair::new(1, "key-1")?;
    server.mount_jwks(&[&keypair], 1).await;

    let resolver = cached_resolver(&server);
    let claims = TestClaimsBuilder::new().expires_in(-3600).build();
    let token = keypair.sign_token(&claims, Some(&server.jwks_url()))?;

    let result = decode_verified::<TestClaims>(&token, &resolver, &validation()).await;
    assert!(matches!(
        result,
        Err(VerifyError::Verification(e)) if matches!(e.kind(), ErrorKind::ExpiredSignature)
    ));
    Ok(())
}

#[tokio::test]
async fn test_missing_jku_never_reaches_server() -> Result<()> {
    let server = TestJwksServer::start().await;
    let keypair = TestKeypair::new(1, "key-1")?;
    server.mount_jwks(&[&keypair], 0).await;

    let resolver = cached_resolver(&server);
    let token = keypair.sign_token(&TestClaimsBuilder::new().build(), None)?;

    let result = decode_verified::<TestClaims>(&token, &resolver, &validation()).await;
    assert!(matches!(
        result,
        Err(VerifyError::Key(KeyError::MissingTrustAnchor))
    ));
    Ok(())
}

#[tokio::test]
async fn test_untrusted_jku_never_reaches_server() -> Result<()> {
    let server = TestJwksServer::start().await;
    let keypair = TestKeypair::new(1, "key-1")?;
    server.mount_jwks(&[&keypair], 0).await;

    // Standard validator: plain-HTTP loopback is outside the authority
    let cache: Arc<dyn KeySetCache> = Arc::new(TtlKeySetCache::new(Duration::from_secs(300)));
    let resolver = CachedJkuKeyResolver::with_default_validator(
        AuthorityConfig::new("tenant.authserver.example"),
        Arc::clone(&cache),
    );
    let token = keypair.sign_token(&TestClaimsBuilder::new().build(), Some(&server.jwks_url()))?;

    let result = decode_verified::<TestClaims>(&token, &resolver, &validation()).await;
    assert!(matches!(
        result,
        Err(VerifyError::Key(KeyError::UntrustedKeySetUrl { source: None, .. }))
    ));
    Ok(())
}

#[tokio::test]
async fn test_server_error_is_fetch_failure_and_not_cached() -> Result<()> {
    let server = TestJwksServer::start().await;
    let keypair = TestKeypair::new(1, "key-1")?;
    server.mount_status(500, 2).await;

    let resolver = cached_resolver(&server);
    let token = keypair.sign_token(&TestClaimsBuilder::new().build(), Some(&server.jwks_url()))?;

    for _ in 0..2 {
        let result = decode_verified::<TestClaims>(&token, &resolver, &validation()).await;
        assert!(matches!(
            result,
            Err(VerifyError::Key(KeyError::KeySetFetchFailed {
                source: FetchError::Status(500),
                ..
            }))
        ));
    }
    Ok(())
}

#[tokio::test]
async fn test_unparseable_key_set_is_fetch_failure() -> Result<()> {
    let server = TestJwksServer::start().await;
    let keypair = TestKeypair::new(1, "key-1")?;
    server.mount_raw("<html>not a key set</html>", 1).await;

    let resolver = uncached_resolver(&server);
    let token = keypair.sign_token(&TestClaimsBuilder::new().build(), Some(&server.jwks_url()))?;

    let result = decode_verified::<TestClaims>(&token, &resolver, &validation()).await;
    assert!(matches!(
        result,
        Err(VerifyError::Key(KeyError::KeySetFetchFailed {
            source: FetchError::Parse(_),
            ..
        }))
    ));
    Ok(())
}

#[tokio::test]
async fn test_oversized_key_set_is_rejected() -> Result<()> {
    let server = TestJwksServer::start().await;
    let keypair = TestKeypair::new(1, "key-1")?;
    server.mount_jwks(&[&keypair], 1).await;

    let fetcher: Arc<dyn JwksFetcher> =
        Arc::new(HttpJwksFetcher::with_limits(Duration::from_secs(5), 32));
    let resolver = uncached_resolver(&server).with_fetcher(fetcher);
    let token = keypair.sign_token(&TestClaimsBuilder::new().build(), Some(&server.jwks_url()))?;

    let result = decode_verified::<TestClaims>(&token, &resolver, &validation()).await;
    assert!(matches!(
        result,
        Err(VerifyError::Key(KeyError::KeySetFetchFailed {
            source: FetchError::BodyTooLarge { limit: 32 },
            ..
        }))
    ));
    Ok(())
}

#[tokio::test]
async fn test_concurrent_misses_all_resolve() -> Result<()> {
    let server = TestJwksServer::start().await;
    let keypair = TestKeypair::new(1, "key-1")?;
    // No single-flight: racing misses may each fetch
    server.mount_jwks(&[&keypair], 1..=8).await;

    let resolver = cached_resolver(&server);
    let token = keypair.sign_token(&TestClaimsBuilder::new().build(), Some(&server.jwks_url()))?;
    let validation = validation();

    let results = futures::future::join_all(
        (0..8).map(|_| decode_verified::<TestClaims>(&token, &resolver, &validation)),
    )
    .await;

    assert!(results.iter().all(|r| r.is_ok()));

    // Once populated, the cache serves every later call
    let before = server.request_count().await;
    decode_verified::<TestClaims>(&token, &resolver, &validation).await?;
    assert_eq!(server.request_count().await, before);
    Ok(())
}

#[tokio::test]
async fn test_domain_validator_trusts_authority_subdomain() {
    // The standard policy, checked with the URL shapes issuers publish
    let validator = DomainJkuValidator::new();

    assert_eq!(
        validator.validate(
            "https://tenant.authserver.example/token_keys",
            "authserver.example"
        ),
        Ok(true)
    );
    assert_eq!(
        validator.validate(
            "https://tenant.authserver.example.evil.example/token_keys",
            "authserver.example"
        ),
        Ok(false)
    );
}

#[tokio::test]
async fn test_resolver_wired_from_config() -> Result<()> {
    let server = TestJwksServer::start().await;
    let keypair = TestKeypair::new(4, "key-4")?;
    server.mount_jwks(&[&keypair], 1).await;

    let vars = HashMap::from([
        ("JKU_CACHE_TTL_SECONDS".to_string(), "120".to_string()),
        ("JKU_CACHE_CLEANUP_INTERVAL_SECONDS".to_string(), "30".to_string()),
        ("JKU_FETCH_TIMEOUT_SECONDS".to_string(), "5".to_string()),
    ]);
    let config = ResolverConfig::from_vars(&vars)?;

    let cache = Arc::new(TtlKeySetCache::from_config(&config));
    let cancel_token = CancellationToken::new();
    let janitor = cache.spawn_janitor(config.cache_cleanup_interval, cancel_token.clone());

    let resolver = CachedJkuKeyResolver::new(
        AuthorityConfig::new(server.host()),
        trust_local(),
        Arc::clone(&cache) as Arc<dyn KeySetCache>,
    )
    .with_fetcher(Arc::new(HttpJwksFetcher::from_config(&config)));

    let token = keypair.sign_token(&TestClaimsBuilder::new().build(), Some(&server.jwks_url()))?;
    decode_verified::<TestClaims>(&token, &resolver, &validation()).await?;
    decode_verified::<TestClaims>(&token, &resolver, &validation()).await?;
    assert_eq!(cache.len().await, 1);

    cancel_token.cancel();
    janitor.await?;
    Ok(())
}
