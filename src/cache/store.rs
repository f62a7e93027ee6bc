//! SQLite-backed recent documents cache
//!
//! Writes commit first; cap enforcement runs afterwards as a background task,
//! so the table may briefly hold more rows than the cap. Reads clamp to the
//! cap, which keeps that window invisible to callers.

use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use parking_lot::Mutex;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use tokio::task::JoinSet;

use super::schema::initialize_schema;
use super::types::{CacheContent, CacheError, CacheRecord, Result};

/// Persistent least-recently-saved document cache
///
/// Dropping the last clone aborts cleanup passes that have not finished yet.
/// Call [`DocumentCache::settle`] before dropping to keep them; an aborted pass
/// only leaves extra rows until the next `put`, since reads clamp to the cap.
#[derive(Clone)]
pub struct DocumentCache {
    inner: Arc<DocumentCacheInner>,
}

struct DocumentCacheInner {
    pool: SqlitePool,
    capacity: usize,
    /// Last `last_access` handed out; stamps are strictly increasing
    last_stamp: AtomicI64,
    /// Cleanup passes spawned by `put`; aborted when the cache is dropped
    cleanups: Mutex<JoinSet<()>>,
}

impl DocumentCache {
    /// Open (or create) the cache database at `database_url`
    pub async fn open(database_url: &str, capacity: usize) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::from_pool(pool, capacity).await
    }

    /// Session-only cache that lives as long as this value
    pub async fn in_memory(capacity: usize) -> Result<Self> {
        // A single connection that never expires, otherwise the database vanishes
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Self::from_pool(pool, capacity).await
    }

    /// Wrap an existing pool, creating the schema if needed
    pub async fn from_pool(pool: SqlitePool, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(CacheError::StorageUnavailable(
                "cache capacity must be at least 1".to_string(),
            ));
        }

        initialize_schema(&pool).await?;

        let (newest,): (i64,) =
            sqlx::query_as("SELECT COALESCE(MAX(last_access), 0) FROM documents")
                .fetch_one(&pool)
                .await?;

        Ok(Self {
            inner: Arc::new(DocumentCacheInner {
                pool,
                capacity,
                last_stamp: AtomicI64::new(newest),
                cleanups: Mutex::new(JoinSet::new()),
            }),
        })
    }

    /// Maximum number of records retained
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Insert or overwrite the record for `name`, then schedule cap enforcement
    pub async fn put(&self, name: &str, content: CacheContent) -> Result<()> {
        let last_access = self.next_access_stamp();
        let (payload, is_reference): (&[u8], bool) = match &content {
            CacheContent::Bytes(data) => (data.as_ref(), false),
            CacheContent::Reference(reference) => (reference.as_bytes(), true),
        };

        sqlx::query(
            r#"
            INSERT INTO documents (name, content, is_reference, last_access)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                content = excluded.content,
                is_reference = excluded.is_reference,
                last_access = excluded.last_access
            "#,
        )
        .bind(name)
        .bind(payload)
        .bind(is_reference)
        .bind(last_access)
        .execute(&self.inner.pool)
        .await?;

        tracing::debug!(
            name = %name,
            is_reference = is_reference,
            size = content.len(),
            last_access = last_access,
            "Document saved to cache"
        );

        self.schedule_cleanup();
        Ok(())
    }

    /// Most recently saved records first, at most `limit` (and never more than the cap)
    pub async fn list_recent(&self, limit: usize) -> Result<Vec<CacheRecord>> {
        let limit = limit.min(self.inner.capacity);

        let rows = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT name, content, is_reference, last_access
            FROM documents
            ORDER BY last_access DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.inner.pool)
        .await?;

        rows.into_iter().map(DocumentRow::into_record).collect()
    }

    /// Delete every record
    pub async fn clear(&self) -> Result<()> {
        let result = sqlx::query("DELETE FROM documents")
            .execute(&self.inner.pool)
            .await?;

        tracing::info!(removed = result.rows_affected(), "Document cache cleared");
        Ok(())
    }

    /// Delete every record outside the `capacity` most recent; returns the number removed
    pub async fn enforce_cap(&self) -> Result<u64> {
        evict_beyond(&self.inner.pool, self.inner.capacity).await
    }

    /// Wait for all cleanup passes scheduled so far
    pub async fn settle(&self) {
        let mut pending = std::mem::take(&mut *self.inner.cleanups.lock());
        while let Some(joined) = pending.join_next().await {
            if let Err(e) = joined {
                tracing::warn!("Cache cleanup task failed: {}", e);
            }
        }
    }

    /// Raw number of stored rows, which may briefly exceed the cap
    pub async fn len(&self) -> Result<usize> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.inner.pool)
            .await?;

        Ok(count as usize)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    fn schedule_cleanup(&self) {
        let pool = self.inner.pool.clone();
        let capacity = self.inner.capacity;

        let mut cleanups = self.inner.cleanups.lock();
        while cleanups.try_join_next().is_some() {}

        cleanups.spawn(async move {
            match evict_beyond(&pool, capacity).await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed = removed, "Evicted old cache records"),
                Err(e) => tracing::warn!("Cache cleanup failed: {}", e),
            }
        });
    }

    fn next_access_stamp(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut current = self.inner.last_stamp.load(Ordering::Acquire);
        loop {
            let next = now.max(current + 1);
            match self.inner.last_stamp.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Single statement, so the retained set is always computed from a fresh view
async fn evict_beyond(pool: &SqlitePool, capacity: usize) -> Result<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM documents
        WHERE name NOT IN (
            SELECT name FROM documents
            ORDER BY last_access DESC
            LIMIT ?
        )
        "#,
    )
    .bind(capacity as i64)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    name: String,
    content: Vec<u8>,
    is_reference: bool,
    last_access: i64,
}

impl DocumentRow {
    fn into_record(self) -> Result<CacheRecord> {
        let content = if self.is_reference {
            let reference = String::from_utf8(self.content).map_err(|e| CacheError::CorruptRecord {
                name: self.name.clone(),
                reason: e.to_string(),
            })?;
            CacheContent::Reference(reference)
        } else {
            CacheContent::Bytes(Bytes::from(self.content))
        };

        Ok(CacheRecord {
            name: self.name,
            content,
            last_access: self.last_access,
        })
    }
}
