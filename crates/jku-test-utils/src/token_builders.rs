//! Builder patterns for test data construction
//!
//! Provides a fluent API for creating test token claims.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Claims carried by test tokens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestClaims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

/// Builder for creating test JWT claims
///
/// # Example
/// ```rust,ignore
/// let claims = TestClaimsBuilder::new()
///     .for_user("alice")
///     .issued_by("https://tenant.authserver.example")
///     .expires_in(3600)
///     .build();
/// ```
pub struct TestClaimsBuilder {
    sub: String,
    exp: i64,
    iat: i64,
    iss: Option<String>,
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

impl TestClaimsBuilder {
    /// Create a new claims builder with defaults (valid for one hour)
    pub fn new() -> Self {
        let now = now();
        Self {
            sub: "test-subject".to_string(),
            exp: now + 3600,
            iat: now,
            iss: None,
        }
    }

    /// Set the subject
    pub fn for_user(mut self, subject: &str) -> Self {
        self.sub = subject.to_string();
        self
    }

    /// Set the issuer
    pub fn issued_by(mut self, issuer: &str) -> Self {
        self.iss = Some(issuer.to_string());
        self
    }

    /// Set expiration in seconds from now (negative for an expired token)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = now() + seconds;
        self
    }

    pub fn build(self) -> TestClaims {
        TestClaims {
            sub: self.sub,
            exp: self.exp,
            iat: self.iat,
            iss: self.iss,
        }
    }
}

impl Default for TestClaimsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
