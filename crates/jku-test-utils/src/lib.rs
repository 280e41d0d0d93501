//! # JKU Test Utilities
//!
//! Shared test utilities for the `jku-resolver` crate.
//!
//! This crate provides:
//! - Deterministic Ed25519 fixtures (fixed keys, JWK/JWKS JSON, signed tokens)
//! - Test claims builder (`TestClaimsBuilder`)
//! - Mock JWKS server (`TestJwksServer`, wiremock-backed)
//! - Test tracing setup
//!
//! ## Usage
//!
//! ```rust,ignore
//! use jku_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let keypair = TestKeypair::new(1, "key-1")?;
//!     let server = TestJwksServer::start().await;
//!     server.mount_jwks(&[&keypair], 1).await;
//!
//!     let claims = TestClaimsBuilder::new().for_user("alice").build();
//!     let token = keypair.sign_token(&claims, Some(&server.jwks_url()))?;
//! }
//! ```

pub mod crypto_fixtures;
pub mod jwks_server;
pub mod token_builders;
pub mod tracing_init;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use jwks_server::*;
pub use token_builders::*;
pub use tracing_init::*;
