//! Deterministic cryptographic fixtures for testing
//!
//! Provides reproducible Ed25519 keypairs, their JWK/JWKS representations,
//! and tokens signed with them. All fixtures are deterministic based on seed
//! values.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use ring::signature::{Ed25519KeyPair, KeyPair};
use serde::Serialize;
use thiserror::Error;

/// Test fixture error type
#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),

    #[error("Token signing failed: {0}")]
    Signing(String),
}

/// Deterministic Ed25519 keypair with a key identifier.
///
/// # Example
/// ```rust,ignore
/// let keypair = TestKeypair::new(1, "key-1")?;
/// let jwks = TestKeypair::jwks_json(&[&keypair]);
/// let token = keypair.sign_token(&claims, Some("https://127.0.0.1/jwks"))?;
/// ```
#[derive(Debug, Clone)]
pub struct TestKeypair {
    kid: String,
    public_key_bytes: Vec<u8>,
    private_key_pkcs8: Vec<u8>,
}

impl TestKeypair {
    /// Create a keypair from a seed value (0-255).
    ///
    /// The same seed always produces the same keypair.
    pub fn new(seed: u8, kid: &str) -> Result<Self, FixtureError> {
        let seed_bytes = seed_bytes(seed);

        let key_pair = Ed25519KeyPair::from_seed_unchecked(&seed_bytes)
            .map_err(|e| FixtureError::Crypto(format!("Failed to generate test keypair: {e:?}")))?;

        Ok(Self {
            kid: kid.to_string(),
            public_key_bytes: key_pair.public_key().as_ref().to_vec(),
            private_key_pkcs8: build_pkcs8_from_seed(&seed_bytes),
        })
    }

    /// Key identifier.
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Raw 32-byte public key.
    pub fn public_key_bytes(&self) -> &[u8] {
        &self.public_key_bytes
    }

    /// Public key as an OKP JWK.
    pub fn jwk_json(&self) -> serde_json::Value {
        serde_json::json!({
            "kty": "OKP",
            "kid": self.kid,
            "crv": "Ed25519",
            "x": URL_SAFE_NO_PAD.encode(&self.public_key_bytes),
            "alg": "EdDSA",
            "use": "sig"
        })
    }

    /// JWKS document containing the given keypairs.
    pub fn jwks_json(keypairs: &[&TestKeypair]) -> serde_json::Value {
        serde_json::json!({
            "keys": keypairs.iter().map(|k| k.jwk_json()).collect::<Vec<_>>()
        })
    }

    /// Sign `claims` as an EdDSA token with this key's `kid` and an optional
    /// `jku` header.
    pub fn sign_token<T: Serialize>(
        &self,
        claims: &T,
        jku: Option<&str>,
    ) -> Result<String, FixtureError> {
        let mut header = Header::new(Algorithm::EdDSA);
        header.typ = Some("JWT".to_string());
        header.kid = Some(self.kid.clone());
        header.jku = jku.map(ToString::to_string);

        self.sign_with_header(&header, claims)
    }

    /// Sign `claims` with a caller-built header.
    pub fn sign_with_header<T: Serialize>(
        &self,
        header: &Header,
        claims: &T,
    ) -> Result<String, FixtureError> {
        let encoding_key = EncodingKey::from_ed_der(&self.private_key_pkcs8);
        encode(header, claims, &encoding_key).map_err(|e| FixtureError::Signing(e.to_string()))
    }
}

/// Create a deterministic 32-byte seed from a single byte.
fn seed_bytes(seed: u8) -> [u8; 32] {
    let mut seed_bytes = [0u8; 32];
    seed_bytes[0] = seed;
    for (i, byte) in seed_bytes.iter_mut().enumerate().skip(1) {
        *byte = seed.wrapping_mul(i as u8).wrapping_add(i as u8);
    }
    seed_bytes
}

/// Build PKCS#8 v1 document from Ed25519 seed.
///
/// Ring doesn't expose PKCS#8 for a seeded Ed25519 key, so it is assembled
/// by hand. Test-only.
fn build_pkcs8_from_seed(seed: &[u8; 32]) -> Vec<u8> {
    let mut pkcs8 = Vec::with_capacity(48);

    // Outer SEQUENCE, 46 bytes
    pkcs8.extend_from_slice(&[0x30, 0x2e]);

    // Version: INTEGER 0
    pkcs8.extend_from_slice(&[0x02, 0x01, 0x00]);

    // AlgorithmIdentifier: SEQUENCE { OID 1.3.101.112 }
    pkcs8.extend_from_slice(&[0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70]);

    // privateKey: OCTET STRING { OCTET STRING (32-byte seed) }
    pkcs8.extend_from_slice(&[0x04, 0x22, 0x04, 0x20]);
    pkcs8.extend_from_slice(seed);

    pkcs8
}
