//! Error types for key resolution and token verification.
//!
//! Every failure is terminal for the current call: nothing is retried and no
//! partial key is ever returned. Hosting verification layers are expected to
//! fail closed on any of these.

use thiserror::Error;

/// Errors produced while parsing the compact form of a token header.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    /// Token size exceeds `MAX_JWT_SIZE_BYTES`.
    #[error("token exceeds the maximum allowed size")]
    TokenTooLarge,

    /// Token is not `header.payload.signature`, or the header is not
    /// base64url-encoded JSON object.
    #[error("token is not a well-formed JWT")]
    MalformedToken,
}

/// A header field read that did not yield a value of the expected type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderFieldError {
    /// The field is not present in the header.
    #[error("header field `{field}` is missing")]
    Missing { field: String },

    /// The field is present but holds a value of another type.
    #[error("header field `{field}` must be a {expected}, found {found}")]
    WrongType {
        field: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Failures reported by a trust validator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrustError {
    /// The key-set URL could not be parsed.
    #[error("invalid key-set URL: {0}")]
    InvalidUrl(String),

    /// No authority domain was configured to validate against.
    #[error("no authority domain configured")]
    MissingAuthorityDomain,

    /// Validator-specific failure.
    #[error("trust validation failed: {0}")]
    Other(String),
}

/// Failures while retrieving or parsing a key set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The request could not be sent or the response body not read.
    #[error("JWKS request failed: {0}")]
    Transport(String),

    /// The endpoint answered with a non-success status.
    #[error("JWKS endpoint returned status {0}")]
    Status(u16),

    /// The response body exceeds the configured limit.
    #[error("JWKS document exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    /// The response body is not a JWKS document.
    #[error("invalid JWKS document: {0}")]
    Parse(String),
}

/// Key resolution failures.
#[derive(Error, Debug)]
pub enum KeyError {
    /// The header's `alg` differs from the single algorithm a static
    /// resolver accepts.
    #[error("unexpected signing method: {}, expected: {expected}", .found.as_deref().unwrap_or("<none>"))]
    AlgorithmMismatch {
        expected: String,
        found: Option<String>,
    },

    /// No (or an empty) `jku` in the header.
    #[error("no jku in header available to validate trust")]
    MissingTrustAnchor,

    /// The trust validator did not accept the `jku` URL.
    #[error("jku {url} is not trusted for authority domain {domain}")]
    UntrustedKeySetUrl {
        url: String,
        domain: String,
        #[source]
        source: Option<TrustError>,
    },

    /// A header field needed for resolution is missing or mistyped.
    #[error("malformed token header: {0}")]
    MalformedHeader(#[source] HeaderFieldError),

    /// The key set could not be fetched or parsed.
    #[error("can't fetch public JWKS from {url}")]
    KeySetFetchFailed {
        url: String,
        #[source]
        source: FetchError,
    },

    /// The key set holds no key with the requested identifier.
    #[error("unable to find key {kid:?}")]
    KeyNotFound { kid: String },

    /// The key was found but cannot be turned into a decoding key.
    #[error("unable to decode key {kid:?}")]
    KeyDecodeFailed {
        kid: String,
        #[source]
        source: jsonwebtoken::errors::Error,
    },
}

/// Failures of the end-to-end verification helper.
#[derive(Error, Debug)]
pub enum VerifyError {
    #[error(transparent)]
    Header(#[from] HeaderError),

    #[error(transparent)]
    Key(#[from] KeyError),

    /// Signature or claim validation failed.
    #[error("token verification failed: {0}")]
    Verification(#[source] jsonwebtoken::errors::Error),
}
