//! Durable local cache
//!
//! Key/value mirror of answer values that survives restarts, backed by a
//! SQLite table. Never authoritative: it speeds up cold starts and serves as
//! the offline fallback of last resort, and the whole table is disposable.
//! Absent or corrupt rows are treated as a cache miss, never an error.
//!
//! Keys are namespaced `<domain>-<userId>-<step>` with the field key string
//! appended, matching the legacy client's layout so the migration engine can
//! enumerate old data.

use chrono::{DateTime, Utc};
use coachbook_common::model::{CacheEntry, FieldKey};
use coachbook_common::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, warn};

/// Namespace domain for answer mirror entries
pub const CACHE_DOMAIN: &str = "coachbook-responses";

/// Namespace prefix for one user and workbook step
pub fn namespace(user_id: &str, step: u32) -> String {
    format!("{}-{}-{}", CACHE_DOMAIN, user_id, step)
}

/// Full cache key for one field value
pub fn mirror_key(user_id: &str, step: u32, field_key: &FieldKey) -> String {
    format!("{}-{}", namespace(user_id, step), field_key)
}

/// Durable local cache handle
#[derive(Clone)]
pub struct LocalCache {
    db: Pool<Sqlite>,
}

impl LocalCache {
    /// Open (or create) the cache database at `path`
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let db = SqlitePoolOptions::new().connect_with(options).await?;
        let cache = Self { db };
        cache.init().await?;
        Ok(cache)
    }

    /// Wrap an existing pool (used by tests with `sqlite::memory:`)
    pub async fn with_pool(db: Pool<Sqlite>) -> Result<Self> {
        let cache = Self { db };
        cache.init().await?;
        Ok(cache)
    }

    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_cache (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                written_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// Read one raw value; any failure is a miss
    pub async fn get(&self, key: &str) -> Option<String> {
        match sqlx::query_scalar::<_, String>("SELECT value FROM kv_cache WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.db)
            .await
        {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Cache read failed; treating as miss");
                None
            }
        }
    }

    /// Write one raw value with the current timestamp
    pub async fn put(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kv_cache (key, value, written_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, written_at = excluded.written_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// Remove one entry; removing a missing key is not an error
    pub async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv_cache WHERE key = ?")
            .bind(key)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    /// All key/value pairs whose key starts with `prefix`
    pub async fn entries_with_prefix(&self, prefix: &str) -> Vec<(String, String)> {
        let pattern = format!("{}%", like_escape(prefix));
        match sqlx::query_as::<_, (String, String)>(
            "SELECT key, value FROM kv_cache WHERE key LIKE ? ESCAPE '\\' ORDER BY key",
        )
        .bind(pattern)
        .fetch_all(&self.db)
        .await
        {
            Ok(rows) => rows,
            Err(e) => {
                warn!(prefix, error = %e, "Cache scan failed; treating as empty");
                Vec::new()
            }
        }
    }

    /// Delete every entry whose key starts with `prefix`; returns the count
    pub async fn remove_with_prefix(&self, prefix: &str) -> Result<usize> {
        let pattern = format!("{}%", like_escape(prefix));
        let result = sqlx::query("DELETE FROM kv_cache WHERE key LIKE ? ESCAPE '\\'")
            .bind(pattern)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    /// Mirror entry for one field, if present and well-formed
    pub async fn mirror_get(
        &self,
        user_id: &str,
        step: u32,
        field_key: &FieldKey,
    ) -> Option<CacheEntry> {
        let key = mirror_key(user_id, step, field_key);
        let row = match sqlx::query_as::<_, (String, String)>(
            "SELECT value, written_at FROM kv_cache WHERE key = ?",
        )
        .bind(&key)
        .fetch_optional(&self.db)
        .await
        {
            Ok(row) => row?,
            Err(e) => {
                warn!(key, error = %e, "Cache read failed; treating as miss");
                return None;
            }
        };

        let written_at = match DateTime::parse_from_rfc3339(&row.1) {
            Ok(ts) => ts.with_timezone(&Utc),
            Err(e) => {
                warn!(key, error = %e, "Corrupt cache timestamp; treating as miss");
                return None;
            }
        };

        Some(CacheEntry {
            field_key: field_key.clone(),
            value: row.0,
            written_at,
        })
    }

    /// Mirror one field value after a confirmed durable write
    pub async fn mirror_put(
        &self,
        user_id: &str,
        step: u32,
        field_key: &FieldKey,
        value: &str,
    ) -> Result<()> {
        let key = mirror_key(user_id, step, field_key);
        self.put(&key, value).await?;
        debug!(key, "Mirrored value to local cache");
        Ok(())
    }
}

/// Escape LIKE wildcards so prefixes containing `%` or `_` match literally
fn like_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}
