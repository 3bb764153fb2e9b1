//! Key-value backends for conversation state and rate-limit windows.
//!
//! Both traits are keyed by [`StoreKey`], which always belongs to exactly one
//! `(namespace, user, scope)` triple. Implementations must make each method
//! atomic for its key, across every process sharing the backend; callers never
//! hold a lock across two calls, so read-modify-write goes through
//! [`KeyValueStore::update`] and [`WindowStore::try_push`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::clock::{Clock, SystemClock};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreKey {
    pub namespace: String,
    pub user_id: String,
    pub scope: String,
}

impl StoreKey {
    pub fn new(
        namespace: impl Into<String>,
        user_id: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self { namespace: namespace.into(), user_id: user_id.into(), scope: scope.into() }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.namespace, self.user_id, self.scope)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend unavailable: {0}")]
    Backend(String),
    #[error("could not encode value for `{key}`: {source}")]
    Encode { key: String, source: serde_json::Error },
    #[error("could not decode value for `{key}`: {source}")]
    Decode { key: String, source: serde_json::Error },
}

/// Computes a new value from the live one (`None` when absent or expired).
pub type ValueUpdate<'a> =
    Box<dyn FnOnce(Option<String>) -> Result<String, StoreError> + Send + 'a>;

/// Opaque string values with a per-key time-to-live.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &StoreKey) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &StoreKey, value: String, ttl: Duration) -> Result<(), StoreError>;
    async fn delete(&self, key: &StoreKey) -> Result<bool, StoreError>;

    /// Replaces the value with `apply(current)` and resets the TTL as one atomic step.
    ///
    /// No other writer can observe or change the key between the read and the
    /// write. An `Err` from `apply` leaves the stored value untouched.
    async fn update(
        &self,
        key: &StoreKey,
        ttl: Duration,
        apply: ValueUpdate<'_>,
    ) -> Result<String, StoreError>;
}

/// Result of a bounded append to a window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowAdmission {
    /// The timestamp was appended; `used` includes it.
    Admitted { used: u32 },
    /// The window already held `limit` entries and nothing was appended.
    Full { oldest: Option<DateTime<Utc>> },
}

/// Ordered timestamp sets used for sliding-window counting.
#[async_trait]
pub trait WindowStore: Send + Sync {
    /// Drops every timestamp older than `cutoff` and returns the remainder, oldest first.
    async fn prune_and_list(
        &self,
        key: &StoreKey,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StoreError>;

    /// Appends `at` and resets the key's expiry to `ttl` from now.
    async fn push(
        &self,
        key: &StoreKey,
        at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Prunes entries older than `cutoff`, then appends `at` only when fewer
    /// than `limit` remain. Pruning, counting and appending are one atomic step.
    async fn try_push(
        &self,
        key: &StoreKey,
        at: DateTime<Utc>,
        cutoff: DateTime<Utc>,
        limit: u32,
        ttl: Duration,
    ) -> Result<WindowAdmission, StoreError>;

    /// Removes one entry recorded at `at`. Returns whether one was found.
    async fn remove(&self, key: &StoreKey, at: DateTime<Utc>) -> Result<bool, StoreError>;
}

pub(crate) fn chrono_duration(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::weeks(5_200))
}

#[derive(Clone, Debug)]
struct ValueEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
struct WindowEntry {
    timestamps: Vec<DateTime<Utc>>,
    expires_at: DateTime<Utc>,
}

/// Process-local backend. Expired keys are dropped on access.
pub struct InMemoryStore {
    values: RwLock<HashMap<String, ValueEntry>>,
    windows: RwLock<HashMap<String, WindowEntry>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { values: RwLock::default(), windows: RwLock::default(), clock }
    }

    pub async fn len(&self) -> usize {
        let now = self.clock.now();
        let values = self.values.read().await;
        let windows = self.windows.read().await;
        values.values().filter(|entry| entry.expires_at > now).count()
            + windows.values().filter(|entry| entry.expires_at > now).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &StoreKey) -> Result<Option<String>, StoreError> {
        let now = self.clock.now();
        let raw_key = key.to_string();
        {
            let values = self.values.read().await;
            match values.get(&raw_key) {
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        let mut values = self.values.write().await;
        if values.get(&raw_key).is_some_and(|entry| entry.expires_at <= now) {
            values.remove(&raw_key);
        }
        Ok(None)
    }

    async fn set(&self, key: &StoreKey, value: String, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = self.clock.now() + chrono_duration(ttl);
        let mut values = self.values.write().await;
        values.insert(key.to_string(), ValueEntry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &StoreKey) -> Result<bool, StoreError> {
        let mut values = self.values.write().await;
        Ok(values.remove(&key.to_string()).is_some())
    }

    async fn update(
        &self,
        key: &StoreKey,
        ttl: Duration,
        apply: ValueUpdate<'_>,
    ) -> Result<String, StoreError> {
        let now = self.clock.now();
        let raw_key = key.to_string();
        let mut values = self.values.write().await;

        let current = values
            .get(&raw_key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone());
        let value = apply(current)?;
        values.insert(
            raw_key,
            ValueEntry { value: value.clone(), expires_at: now + chrono_duration(ttl) },
        );
        Ok(value)
    }
}

#[async_trait]
impl WindowStore for InMemoryStore {
    async fn prune_and_list(
        &self,
        key: &StoreKey,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StoreError> {
        let now = self.clock.now();
        let raw_key = key.to_string();
        let mut windows = self.windows.write().await;

        let Some(entry) = windows.get_mut(&raw_key) else {
            return Ok(Vec::new());
        };
        if entry.expires_at <= now {
            windows.remove(&raw_key);
            return Ok(Vec::new());
        }

        entry.timestamps.retain(|timestamp| *timestamp >= cutoff);
        if entry.timestamps.is_empty() {
            windows.remove(&raw_key);
            return Ok(Vec::new());
        }
        Ok(entry.timestamps.clone())
    }

    async fn push(
        &self,
        key: &StoreKey,
        at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let expires_at = self.clock.now() + chrono_duration(ttl);
        let mut windows = self.windows.write().await;
        let entry = windows
            .entry(key.to_string())
            .or_insert_with(|| WindowEntry { timestamps: Vec::new(), expires_at });

        let position = entry.timestamps.partition_point(|existing| *existing <= at);
        entry.timestamps.insert(position, at);
        entry.expires_at = expires_at;
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
        let now = self.clock.now();
        let raw_key = key.to_string();
        let mut windows = self.windows.write().await;

        if windows.get(&raw_key).is_some_and(|entry| entry.expires_at <= now) {
            windows.remove(&raw_key);
        }
        let entry = windows
            .entry(raw_key.clone())
            .or_insert_with(|| WindowEntry { timestamps: Vec::new(), expires_at: now });
        entry.timestamps.retain(|timestamp| *timestamp >= cutoff);

        let used = u32::try_from(entry.timestamps.len()).unwrap_or(u32::MAX);
        if used >= limit {
            let oldest = entry.timestamps.first().copied();
            if oldest.is_none() {
                windows.remove(&raw_key);
            }
            return Ok(WindowAdmission::Full { oldest });
        }

        let position = entry.timestamps.partition_point(|existing| *existing <= at);
        entry.timestamps.insert(position, at);
        entry.expires_at = now + chrono_duration(ttl);
        Ok(WindowAdmission::Admitted { used: used + 1 })
    }

    async fn remove(&self, key: &StoreKey, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let raw_key = key.to_string();
        let mut windows = self.windows.write().await;
        let Some(entry) = windows.get_mut(&raw_key) else {
            return Ok(false);
        };
        let Some(position) = entry.timestamps.iter().position(|timestamp| *timestamp == at) else {
            return Ok(false);
        };

        entry.timestamps.remove(position);
        if entry.timestamps.is_empty() {
            windows.remove(&raw_key);
        }
        Ok(true)
    }
}
