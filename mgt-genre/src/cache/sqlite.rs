//! SQLite cache store
//!
//! Persists entries across restarts in a single key/value table. Times are
//! stored as Unix milliseconds.

use super::{CacheEntry, CacheKey, CacheStore};
use crate::error::{GenreError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::time::Duration;
use tracing::info;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS genre_cache (
    cache_key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    created_at_ms INTEGER NOT NULL,
    ttl_ms INTEGER NOT NULL,
    expires_at_ms INTEGER NOT NULL
)";

const CREATE_EXPIRY_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_genre_cache_expires ON genre_cache (expires_at_ms)";

/// sqlx-backed store
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) a cache database file
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(mgt_common::Error::from)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self::with_pool(pool).await?;
        info!("Opened cache database: {}", path.display());
        Ok(store)
    }

    /// Use an existing pool (tests pass `sqlite::memory:` pools)
    pub async fn with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        sqlx::query(CREATE_EXPIRY_INDEX).execute(&pool).await?;
        Ok(Self { pool })
    }
}

fn to_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| GenreError::Cache(format!("Invalid cache timestamp: {}", millis)))
}

#[async_trait]
impl CacheStore for SqliteStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let row = sqlx::query(
            "SELECT value, created_at_ms, ttl_ms FROM genre_cache WHERE cache_key = ?",
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let ttl_ms: i64 = row.try_get("ttl_ms")?;
        Ok(Some(CacheEntry {
            key: key.clone(),
            value: row.try_get("value")?,
            created_at: from_millis(row.try_get("created_at_ms")?)?,
            ttl: Duration::from_millis(u64::try_from(ttl_ms).unwrap_or(0)),
        }))
    }

    async fn put(&self, entry: CacheEntry) -> Result<()> {
        let created_at_ms = entry.created_at.timestamp_millis();
        let ttl_ms = to_millis(entry.ttl);
        sqlx::query(
            "INSERT OR REPLACE INTO genre_cache
                (cache_key, value, created_at_ms, ttl_ms, expires_at_ms)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(entry.key.as_str())
        .bind(&entry.value)
        .bind(created_at_ms)
        .bind(ttl_ms)
        .bind(created_at_ms.saturating_add(ttl_ms))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let result = sqlx::query("DELETE FROM genre_cache WHERE expires_at_ms < ?")
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn len(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM genre_cache")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
