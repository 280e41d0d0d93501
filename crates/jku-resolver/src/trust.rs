//! Trust validation for key-set URLs taken from token headers.
//!
//! A `jku` header is chosen by whoever produced the token, so it must be
//! checked against the configured authority domain before the URL is
//! fetched. The policy is pluggable through [`JkuValidator`]; any closure
//! `Fn(&str, &str) -> Result<bool, TrustError>` is a validator.
//!
//! Resolvers deny a URL when the validator returns `Ok(false)` or `Err(_)`.

use crate::error::TrustError;
use url::Url;

/// Decides whether a key-set URL belongs to the expected authority.
pub trait JkuValidator: Send + Sync {
    /// Returns `Ok(true)` only if `jku_url` may be trusted for
    /// `authority_domain`.
    ///
    /// # Errors
    ///
    /// Returns `TrustError` when the decision cannot be made (e.g. an
    /// unparseable URL). Callers treat errors as a denial.
    fn validate(&self, jku_url: &str, authority_domain: &str) -> Result<bool, TrustError>;
}

impl<F> JkuValidator for F
where
    F: Fn(&str, &str) -> Result<bool, TrustError> + Send + Sync,
{
    fn validate(&self, jku_url: &str, authority_domain: &str) -> Result<bool, TrustError> {
        self(jku_url, authority_domain)
    }
}

/// Standard domain-matching validator.
///
/// A URL is trusted when it:
/// - uses `https`
/// - carries no user-info, query or fragment
/// - has a host equal to the authority domain, or a subdomain of it
///   (matched on a label boundary, case-insensitive)
#[derive(Debug, Clone, Copy, Default)]
pub struct DomainJkuValidator;

impl DomainJkuValidator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl JkuValidator for DomainJkuValidator {
    fn validate(&self, jku_url: &str, authority_domain: &str) -> Result<bool, TrustError> {
        let domain = authority_domain.trim().trim_end_matches('.').to_ascii_lowercase();
        if domain.is_empty() {
            return Err(TrustError::MissingAuthorityDomain);
        }

        let url = Url::parse(jku_url).map_err(|e| TrustError::InvalidUrl(e.to_string()))?;

        if url.scheme() != "https" {
            tracing::debug!(target: "jku.trust", scheme = %url.scheme(), "jku rejected: scheme is not https");
            return Ok(false);
        }

        if !url.username().is_empty() || url.password().is_some() {
            tracing::debug!(target: "jku.trust", "jku rejected: URL carries credentials");
            return Ok(false);
        }

        if url.query().is_some() || url.fragment().is_some() {
            tracing::debug!(target: "jku.trust", "jku rejected: URL carries query or fragment");
            return Ok(false);
        }

        let Some(host) = url.host_str() else {
            return Err(TrustError::InvalidUrl(format!("{jku_url} has no host")));
        };
        let host = host.trim_end_matches('.').to_ascii_lowercase();

        let trusted = host == domain
            || host
                .strip_suffix(domain.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'));

        if !trusted {
            tracing::debug!(target: "jku.trust", host = %host, domain = %domain, "jku rejected: host outside authority domain");
        }

        Ok(trusted)
    }
}
