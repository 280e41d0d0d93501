//! Expiring cache of fetched key sets.
//!
//! The cache is owned by the caller and injected into
//! [`CachedJkuKeyResolver`](crate::resolver::CachedJkuKeyResolver), so one
//! instance can be shared by every resolution running in a process (and each
//! test can use its own). Entries are keyed by [`cache_key`], which combines
//! the authority domain and the key identifier rather than the URL alone.
//!
//! Concurrent misses for the same key each fetch and each write the entry;
//! both writes store an equivalent key set.

use crate::config::ResolverConfig;
use jsonwebtoken::jwk::JwkSet;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Build the cache key for a key set resolved for `authority_domain`/`kid`.
#[must_use]
pub fn cache_key(authority_domain: &str, kid: &str) -> String {
    format!("jwks_{authority_domain}_{kid}")
}

/// Lifetime requested for a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiration {
    /// The cache's own default TTL.
    #[default]
    Default,
    /// Never expires.
    Never,
    /// Expires after the given duration.
    After(Duration),
}

/// Time-expiring map from cache key to key set.
///
/// Implementations must be safe for concurrent `get`/`set`.
#[async_trait::async_trait]
pub trait KeySetCache: Send + Sync {
    /// Look up a live entry.
    async fn get(&self, key: &str) -> Option<Arc<JwkSet>>;

    /// Insert or replace an entry.
    async fn set(&self, key: String, key_set: Arc<JwkSet>, expiration: Expiration);
}

struct CacheEntry {
    key_set: Arc<JwkSet>,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |expires_at| expires_at > now)
    }
}

/// In-memory [`KeySetCache`] with a default TTL.
///
/// Expired entries are never returned; they are dropped on the next `get`
/// of the same key, by [`TtlKeySetCache::purge_expired`], or by the
/// janitor task started with [`TtlKeySetCache::spawn_janitor`].
pub struct TtlKeySetCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    default_ttl: Duration,
}

impl TtlKeySetCache {
    /// Create an empty cache.
    ///
    /// # Arguments
    ///
    /// * `default_ttl` - Lifetime of entries stored with `Expiration::Default`
    #[must_use]
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
        }
    }

    /// Create an empty cache with the configured default TTL.
    #[must_use]
    pub fn from_config(config: &ResolverConfig) -> Self {
        Self::new(config.cache_ttl)
    }

    /// The TTL applied to `Expiration::Default` entries.
    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
        tracing::debug!(target: "jku.cache", "Key-set cache cleared");
    }

    /// Drop expired entries and return how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// Start a background task that purges expired entries every `interval`.
    ///
    /// The task exits when `cancel_token` is cancelled.
    pub fn spawn_janitor(
        self: &Arc<Self>,
        interval: Duration,
        cancel_token: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move { run_janitor(cache, interval, cancel_token).await })
    }
}

#[instrument(skip_all, name = "jku.cache.janitor")]
async fn run_janitor(cache: Arc<TtlKeySetCache>, interval: Duration, cancel_token: CancellationToken) {
    tracing::debug!(
        target: "jku.cache",
        interval_secs = interval.as_secs(),
        "Starting key-set cache janitor"
    );

    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = cache.purge_expired().await;
                if removed > 0 {
                    tracing::debug!(target: "jku.cache", removed, "Purged expired key sets");
                }
            }
            () = cancel_token.cancelled() => {
                tracing::debug!(target: "jku.cache", "Key-set cache janitor received shutdown signal, exiting");
                break;
            }
        }
    }
}

#[async_trait::async_trait]
impl KeySetCache for TtlKeySetCache {
    async fn get(&self, key: &str) -> Option<Arc<JwkSet>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.is_live(now) => return Some(Arc::clone(&entry.key_set)),
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: drop it unless a concurrent `set` already replaced it.
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            entries.remove(key);
        }
        None
    }

    async fn set(&self, key: String, key_set: Arc<JwkSet>, expiration: Expiration) {
        let expires_at = match expiration {
            Expiration::Default => Some(Instant::now() + self.default_ttl),
            Expiration::After(ttl) => Some(Instant::now() + ttl),
            Expiration::Never => None,
        };

        self.entries.write().await.insert(
            key,
            CacheEntry {
                key_set,
                expires_at,
            },
        );
    }
}

/// Recording cache module for testing.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Wraps a [`TtlKeySetCache`] and counts calls.
    pub struct RecordingKeySetCache {
        inner: TtlKeySetCache,
        get_count: AtomicUsize,
        set_count: AtomicUsize,
        hit_count: AtomicUsize,
    }

    impl RecordingKeySetCache {
        pub fn new(default_ttl: Duration) -> Self {
            Self {
                inner: TtlKeySetCache::new(default_ttl),
                get_count: AtomicUsize::new(0),
                set_count: AtomicUsize::new(0),
                hit_count: AtomicUsize::new(0),
            }
        }

        /// Number of `get` calls.
        pub fn get_count(&self) -> usize {
            self.get_count.load(Ordering::SeqCst)
        }

        /// Number of `set` calls.
        pub fn set_count(&self) -> usize {
            self.set_count.load(Ordering::SeqCst)
        }

        /// Number of `get` calls that returned an entry.
        pub fn hit_count(&self) -> usize {
            self.hit_count.load(Ordering::SeqCst)
        }

        /// The wrapped cache.
        pub fn inner(&self) -> &TtlKeySetCache {
            &self.inner
        }
    }

    #[async_trait::async_trait]
    impl KeySetCache for RecordingKeySetCache {
        async fn get(&self, key: &str) -> Option<Arc<JwkSet>> {
            self.get_count.fetch_add(1, Ordering::SeqCst);
            let found = self.inner.get(key).await;
            if found.is_some() {
                self.hit_count.fetch_add(1, Ordering::SeqCst);
            }
            found
        }

        async fn set(&self, key: String, key_set: Arc<JwkSet>, expiration: Expiration) {
            self.set_count.fetch_add(1, Ordering::SeqCst);
            self.inner.set(key, key_set, expiration).await;
        }
    }
}
