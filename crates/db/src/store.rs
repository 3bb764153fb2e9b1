//! SQLite implementation of the core store traits.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`)
//! so lexical comparison in SQL matches chronological order. Every
//! read-modify-write runs in a `BEGIN IMMEDIATE` transaction, which takes the
//! database write lock up front and serializes writers across processes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::{Row, SqliteConnection};
use tracing::debug;
use workdesk_core::chrono::{DateTime, SecondsFormat, Utc};
use workdesk_core::clock::{Clock, SystemClock};
use workdesk_core::store::{
    KeyValueStore, StoreError, StoreKey, ValueUpdate, WindowAdmission, WindowStore,
};

use crate::DbPool;

const BEGIN_IMMEDIATE: &str = "BEGIN IMMEDIATE";

pub struct SqliteStore {
    pool: DbPool,
    clock: Arc<dyn Clock>,
}

impl SqliteStore {
    pub fn new(pool: DbPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    pub fn with_system_clock(pool: DbPool) -> Self {
        Self::new(pool, Arc::new(SystemClock))
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Deletes every expired value and window row. Returns the number of rows removed.
    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        let now = timestamp(self.clock.now());
        let mut tx = self.pool.begin_with(BEGIN_IMMEDIATE).await.map_err(backend)?;

        let values = sqlx::query("DELETE FROM kv_entry WHERE expires_at <= ?")
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(backend)?
            .rows_affected();
        let windows = sqlx::query("DELETE FROM window_entry WHERE expires_at <= ?")
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(backend)?
            .rows_affected();

        tx.commit().await.map_err(backend)?;
        debug!(event_name = "store.purge_expired", values, windows, "expired rows purged");
        Ok(values + windows)
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &StoreKey) -> Result<Option<String>, StoreError> {
        let raw_key = key.to_string();
        let now = timestamp(self.clock.now());

        let row = sqlx::query("SELECT value, expires_at FROM kv_entry WHERE store_key = ?")
            .bind(&raw_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        let Some(row) = row else {
            return Ok(None);
        };

        let expires_at: String = row.try_get("expires_at").map_err(backend)?;
        if expires_at > now {
            return row.try_get::<String, _>("value").map(Some).map_err(backend);
        }

        sqlx::query("DELETE FROM kv_entry WHERE store_key = ? AND expires_at <= ?")
            .bind(&raw_key)
            .bind(&now)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(None)
    }

    async fn set(&self, key: &StoreKey, value: String, ttl: Duration) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut conn = self.pool.acquire().await.map_err(backend)?;
        upsert_value(&mut conn, key, value, now + chrono_duration(ttl), now).await
    }

    async fn delete(&self, key: &StoreKey) -> Result<bool, StoreError> {
        let affected = sqlx::query("DELETE FROM kv_entry WHERE store_key = ?")
            .bind(key.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?
            .rows_affected();
        Ok(affected > 0)
    }

    async fn update(
        &self,
        key: &StoreKey,
        ttl: Duration,
        apply: ValueUpdate<'_>,
    ) -> Result<String, StoreError> {
        let mut tx = self.pool.begin_with(BEGIN_IMMEDIATE).await.map_err(backend)?;
        // read the clock once the write lock is held
        let now = self.clock.now();

        let current: Option<String> = sqlx::query_scalar(
            "SELECT value FROM kv_entry WHERE store_key = ? AND expires_at > ?",
        )
        .bind(key.to_string())
        .bind(timestamp(now))
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?;

        // an `Err` drops `tx`, which rolls back
        let value = apply(current)?;
        upsert_value(&mut tx, key, value.clone(), now + chrono_duration(ttl), now).await?;
        tx.commit().await.map_err(backend)?;
        Ok(value)
    }
}

#[async_trait]
impl WindowStore for SqliteStore {
    async fn prune_and_list(
        &self,
        key: &StoreKey,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StoreError> {
        let raw_key = key.to_string();
        let mut tx = self.pool.begin_with(BEGIN_IMMEDIATE).await.map_err(backend)?;
        let now = self.clock.now();

        prune_window(&mut tx, &raw_key, cutoff, now).await?;
        let listed = list_window(&mut tx, &raw_key).await?;
        tx.commit().await.map_err(backend)?;
        Ok(listed)
    }

    async fn push(
        &self,
        key: &StoreKey,
        at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let raw_key = key.to_string();
        let mut tx = self.pool.begin_with(BEGIN_IMMEDIATE).await.map_err(backend)?;
        let expires_at = self.clock.now() + chrono_duration(ttl);

        append_window(&mut tx, &raw_key, at, expires_at).await?;
        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn try_push(
        &self,
        key: &StoreKey,
        at: DateTime<Utc>,
        cutoff: DateTime<Utc>,
        limit: u32,
        ttl: Duration,
    ) -> Result<WindowAdmission, StoreError> {
        let raw_key = key.to_string();
        let mut tx = self.pool.begin_with(BEGIN_IMMEDIATE).await.map_err(backend)?;
        let now = self.clock.now();

        prune_window(&mut tx, &raw_key, cutoff, now).await?;
        let listed = list_window(&mut tx, &raw_key).await?;
        let used = u32::try_from(listed.len()).unwrap_or(u32::MAX);

        let admission = if used >= limit {
            WindowAdmission::Full { oldest: listed.first().copied() }
        } else {
            append_window(&mut tx, &raw_key, at, now + chrono_duration(ttl)).await?;
            WindowAdmission::Admitted { used: used + 1 }
        };
        tx.commit().await.map_err(backend)?;
        Ok(admission)
    }

    async fn remove(&self, key: &StoreKey, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let affected = sqlx::query(
            "DELETE FROM window_entry WHERE id = (
                SELECT id FROM window_entry
                WHERE store_key = ? AND occurred_at = ?
                ORDER BY id DESC
                LIMIT 1
            )",
        )
        .bind(key.to_string())
        .bind(timestamp(at))
        .execute(&self.pool)
        .await
        .map_err(backend)?
        .rows_affected();
        Ok(affected > 0)
    }
}

async fn upsert_value(
    conn: &mut SqliteConnection,
    key: &StoreKey,
    value: String,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO kv_entry (store_key, namespace, user_id, scope, value, expires_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(store_key) DO UPDATE SET
            value = excluded.value,
            expires_at = excluded.expires_at,
            updated_at = excluded.updated_at",
    )
    .bind(key.to_string())
    .bind(&key.namespace)
    .bind(&key.user_id)
    .bind(&key.scope)
    .bind(value)
    .bind(timestamp(expires_at))
    .bind(timestamp(now))
    .execute(&mut *conn)
    .await
    .map_err(backend)?;
    Ok(())
}

async fn prune_window(
    conn: &mut SqliteConnection,
    raw_key: &str,
    cutoff: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    sqlx::query(
        "DELETE FROM window_entry
         WHERE store_key = ? AND (occurred_at < ? OR expires_at <= ?)",
    )
    .bind(raw_key)
    .bind(timestamp(cutoff))
    .bind(timestamp(now))
    .execute(&mut *conn)
    .await
    .map_err(backend)?;
    Ok(())
}

async fn list_window(
    conn: &mut SqliteConnection,
    raw_key: &str,
) -> Result<Vec<DateTime<Utc>>, StoreError> {
    let rows: Vec<String> = sqlx::query_scalar(
        "SELECT occurred_at FROM window_entry WHERE store_key = ? ORDER BY occurred_at ASC",
    )
    .bind(raw_key)
    .fetch_all(&mut *conn)
    .await
    .map_err(backend)?;

    rows.iter().map(|raw| parse_timestamp(raw)).collect()
}

/// Appends `at` and moves the expiry of every entry under the key to `expires_at`.
async fn append_window(
    conn: &mut SqliteConnection,
    raw_key: &str,
    at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<(), StoreError> {
    let expires_at = timestamp(expires_at);
    sqlx::query("INSERT INTO window_entry (store_key, occurred_at, expires_at) VALUES (?, ?, ?)")
        .bind(raw_key)
        .bind(timestamp(at))
        .bind(&expires_at)
        .execute(&mut *conn)
        .await
        .map_err(backend)?;
    sqlx::query("UPDATE window_entry SET expires_at = ? WHERE store_key = ?")
        .bind(&expires_at)
        .bind(raw_key)
        .execute(&mut *conn)
        .await
        .map_err(backend)?;
    Ok(())
}

fn backend(error: sqlx::Error) -> StoreError {
    StoreError::Backend(error.to_string())
}

fn chrono_duration(duration: Duration) -> workdesk_core::chrono::Duration {
    workdesk_core::chrono::Duration::from_std(duration)
        .unwrap_or_else(|_| workdesk_core::chrono::Duration::weeks(5_200))
}

fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| StoreError::Backend(format!("invalid stored timestamp `{raw}`: {error}")))
}
