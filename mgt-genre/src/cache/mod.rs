//! Response cache
//!
//! Content-addressed key/value cache for provider responses and aggregate
//! results. Keys are SHA-256 digests of normalized (artist, title) plus the
//! provider id or the aggregate marker. Expiry is lazy: an entry is expired
//! once its age exceeds its TTL, checked at read time against the injected
//! clock. Writes replace entries wholesale (last write wins).
//!
//! Store failures never fail a resolution: they are logged and treated as
//! a miss (reads) or skipped (writes).

pub mod memory;
pub mod sqlite;
pub mod sweeper;

use crate::error::Result;
use crate::types::{AggregationResult, AlbumIdentity, ProviderId, ProviderResponse};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mgt_common::time::Clock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use sweeper::CacheSweeper;

/// Marker used in aggregate keys in place of a provider id
const AGGREGATE_MARKER: &str = "aggregate";

/// Hex SHA-256 digest identifying one cache entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    fn digest(scope: &str, material: &str) -> Self {
        let digest = Sha256::digest(format!("{}\u{1f}{}", scope, material).as_bytes());
        CacheKey(format!("{:x}", digest))
    }

    /// Key for one provider's raw response
    pub fn provider(album: &AlbumIdentity, provider: ProviderId) -> Self {
        Self::digest(provider.as_str(), &album.key_material())
    }

    /// Key for the aggregate result over a given provider set
    pub fn aggregate(album: &AlbumIdentity, providers: &BTreeSet<ProviderId>) -> Self {
        let ids: Vec<&str> = providers.iter().map(|p| p.as_str()).collect();
        let scope = format!("{}[{}]", AGGREGATE_MARKER, ids.join(","));
        Self::digest(&scope, &album.key_material())
    }

    /// Wrap an existing digest (as read back from a store)
    pub fn from_digest(digest: impl Into<String>) -> Self {
        CacheKey(digest.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One stored value; replaced wholesale, never mutated
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: CacheKey,
    /// Serialized JSON value
    pub value: String,
    pub created_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn expires_at(&self) -> DateTime<Utc> {
        chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| self.created_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Age strictly greater than TTL
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }
}

/// Backing store for cache entries
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;

    /// Insert or replace
    async fn put(&self, entry: CacheEntry) -> Result<()>;

    /// Delete every entry expired at `now`; returns the number removed
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize>;

    async fn len(&self) -> Result<usize>;

    /// Flush and release resources
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Typed cache facade over a store and a clock
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    provider_ttl: Duration,
    aggregate_ttl: Duration,
}

impl ResponseCache {
    pub fn new(
        store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        provider_ttl: Duration,
        aggregate_ttl: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            provider_ttl,
            aggregate_ttl,
        }
    }

    pub fn provider_ttl(&self) -> Duration {
        self.provider_ttl
    }

    pub fn aggregate_ttl(&self) -> Duration {
        self.aggregate_ttl
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Fresh value for `key`, or `None` on miss, expiry or store error
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let entry = match self.store.get(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        if entry.is_expired(self.clock.now()) {
            // Deletion is left to purge_expired
            debug!(key = %key, "Cache entry expired");
            return None;
        }

        match serde_json::from_str(&entry.value) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "Undecodable cache entry, treating as miss");
                None
            }
        }
    }

    /// Store `value` under `key` for `ttl`
    pub async fn put<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: Duration) {
        let value = match serde_json::to_string(value) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to encode cache entry");
                return;
            }
        };

        let entry = CacheEntry {
            key: key.clone(),
            value,
            created_at: self.clock.now(),
            ttl,
        };
        if let Err(e) = self.store.put(entry).await {
            warn!(key = %key, error = %e, "Cache write failed");
        }
    }

    pub async fn get_provider(
        &self,
        album: &AlbumIdentity,
        provider: ProviderId,
    ) -> Option<ProviderResponse> {
        self.get(&CacheKey::provider(album, provider)).await
    }

    pub async fn put_provider(&self, album: &AlbumIdentity, response: &ProviderResponse) {
        let key = CacheKey::provider(album, response.provider_id);
        self.put(&key, response, self.provider_ttl).await
    }

    pub async fn get_aggregate(
        &self,
        album: &AlbumIdentity,
        providers: &BTreeSet<ProviderId>,
    ) -> Option<AggregationResult> {
        self.get(&CacheKey::aggregate(album, providers)).await
    }

    pub async fn put_aggregate(
        &self,
        providers: &BTreeSet<ProviderId>,
        result: &AggregationResult,
        ttl: Duration,
    ) {
        let key = CacheKey::aggregate(&result.album, providers);
        self.put(&key, result, ttl).await
    }

    /// Drop expired entries now; returns the number removed
    pub async fn purge_expired(&self) -> usize {
        match self.store.purge_expired(self.clock.now()).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(error = %e, "Cache purge failed");
                0
            }
        }
    }

    /// Entries currently held (expired ones included until purged)
    pub async fn len(&self) -> usize {
        self.store.len().await.unwrap_or(0)
    }

    pub async fn close(&self) -> Result<()> {
        self.store.close().await
    }
}
