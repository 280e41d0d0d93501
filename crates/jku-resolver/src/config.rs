//! Authority and resolver configuration.
//!
//! [`AuthorityConfig`] is the trust anchor and is always built by the caller.
//! [`ResolverConfig`] tunes the fetch and cache machinery and can be loaded
//! from environment variables.

use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default key-set cache TTL in seconds (5 minutes).
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 300;

/// Upper bound for the key-set cache TTL (1 day).
pub const MAX_CACHE_TTL_SECONDS: u64 = 86_400;

/// Default interval between expired-entry sweeps in seconds.
pub const DEFAULT_CACHE_CLEANUP_INTERVAL_SECONDS: u64 = 600;

/// Default HTTP timeout for key-set fetches in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECONDS: u64 = 10;

/// Upper bound for the key-set fetch timeout.
pub const MAX_FETCH_TIMEOUT_SECONDS: u64 = 60;

/// Default cap on the size of a fetched JWKS document (64KB).
pub const DEFAULT_MAX_JWKS_BYTES: usize = 65_536;

/// The authority whose key sets are trusted.
///
/// Immutable once built; resolvers hold their own copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityConfig {
    uaa_domain: String,
}

impl AuthorityConfig {
    /// Create an authority configuration for the given UAA domain
    /// (e.g. `tenant.authserver.example`).
    #[must_use]
    pub fn new(uaa_domain: impl Into<String>) -> Self {
        Self {
            uaa_domain: uaa_domain.into(),
        }
    }

    /// The expected authority domain.
    #[must_use]
    pub fn uaa_domain(&self) -> &str {
        &self.uaa_domain
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Tuning for key-set fetching and caching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Default expiration applied to cached key sets.
    pub cache_ttl: Duration,

    /// How often the cache janitor sweeps expired entries.
    pub cache_cleanup_interval: Duration,

    /// HTTP timeout for a single key-set fetch.
    pub fetch_timeout: Duration,

    /// Largest JWKS document accepted from an endpoint.
    pub max_jwks_bytes: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECONDS),
            cache_cleanup_interval: Duration::from_secs(DEFAULT_CACHE_CLEANUP_INTERVAL_SECONDS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECONDS),
            max_jwks_bytes: DEFAULT_MAX_JWKS_BYTES,
        }
    }
}

impl ResolverConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a variable is set but not a
    /// valid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the offending variable.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let cache_ttl = parse_seconds(
            vars,
            "JKU_CACHE_TTL_SECONDS",
            DEFAULT_CACHE_TTL_SECONDS,
            Some(MAX_CACHE_TTL_SECONDS),
        )?;

        let cache_cleanup_interval = parse_seconds(
            vars,
            "JKU_CACHE_CLEANUP_INTERVAL_SECONDS",
            DEFAULT_CACHE_CLEANUP_INTERVAL_SECONDS,
            None,
        )?;

        let fetch_timeout = parse_seconds(
            vars,
            "JKU_FETCH_TIMEOUT_SECONDS",
            DEFAULT_FETCH_TIMEOUT_SECONDS,
            Some(MAX_FETCH_TIMEOUT_SECONDS),
        )?;

        let max_jwks_bytes = if let Some(value_str) = vars.get("JKU_MAX_JWKS_BYTES") {
            let value: usize = value_str.parse().map_err(|e| {
                ConfigError::InvalidValue(format!(
                    "JKU_MAX_JWKS_BYTES must be a valid positive integer, got '{value_str}': {e}"
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidValue(
                    "JKU_MAX_JWKS_BYTES must be greater than 0".to_string(),
                ));
            }

            value
        } else {
            DEFAULT_MAX_JWKS_BYTES
        };

        Ok(Self {
            cache_ttl,
            cache_cleanup_interval,
            fetch_timeout,
            max_jwks_bytes,
        })
    }
}

fn parse_seconds(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
    max: Option<u64>,
) -> Result<Duration, ConfigError> {
    let Some(value_str) = vars.get(name) else {
        return Ok(Duration::from_secs(default));
    };

    let value: u64 = value_str.parse().map_err(|e| {
        ConfigError::InvalidValue(format!(
            "{name} must be a valid positive integer, got '{value_str}': {e}"
        ))
    })?;

    if value == 0 {
        return Err(ConfigError::InvalidValue(format!(
            "{name} must be greater than 0"
        )));
    }

    if let Some(max) = max {
        if value > max {
            return Err(ConfigError::InvalidValue(format!(
                "{name} must not exceed {max} seconds, got {value}"
            )));
        }
    }

    Ok(Duration::from_secs(value))
}
