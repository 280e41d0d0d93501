//! Verification-key resolution for tokens that name their own key set.
//!
//! An authority signs tokens and publishes its public keys as a JWKS
//! document. Each token carries a `jku` header (where the key set lives)
//! and a `kid` header (which key in the set signed it). This crate turns
//! such a header into a [`jsonwebtoken::DecodingKey`]:
//!
//! 1. the `jku` URL is checked against the configured authority domain
//!    ([`trust`]) before anything is fetched,
//! 2. the key set is fetched ([`jwks`]), optionally through an injected
//!    expiring cache ([`cache`]),
//! 3. the `kid` entry is looked up and decoded ([`resolver`]).
//!
//! [`verify::decode_verified`] plugs any [`resolver::KeyResolver`] into
//! `jsonwebtoken::decode`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use jku_resolver::cache::TtlKeySetCache;
//! use jku_resolver::config::AuthorityConfig;
//! use jku_resolver::resolver::CachedJkuKeyResolver;
//! use jku_resolver::verify::decode_verified;
//!
//! let cache = Arc::new(TtlKeySetCache::new(Duration::from_secs(300)));
//! let resolver = CachedJkuKeyResolver::with_default_validator(
//!     AuthorityConfig::new("tenant.authserver.example"),
//!     cache,
//! );
//!
//! let claims = decode_verified::<MyClaims>(token, &resolver, &validation).await?;
//! ```

#![warn(clippy::pedantic)]

/// Module for resolution and verification error types
pub mod error;

/// Module for authority and resolver configuration
pub mod config;

/// Module for the untrusted token header model
pub mod header;

/// Module for jku trust validation
pub mod trust;

/// Module for JWKS fetching and key selection
pub mod jwks;

/// Module for the expiring key-set cache
pub mod cache;

/// Module for key resolvers (static, uncached, cached)
pub mod resolver;

/// Module for plugging a resolver into token verification
pub mod verify;

pub use error::{KeyError, VerifyError};
pub use resolver::KeyResolver;
