//! Time-boxed memoization of source-adapter results.
//!
//! Fetching the published sheets and the Meta insights on every dashboard
//! load would hammer the upstreams, so adapter output is cached for a short
//! window under typed dataset keys. The two sheet datasets share one
//! staleness domain (they are always refreshed together); Meta data has its
//! own, since operators refresh it independently after editing mappings.
//!
//! Entries are stored as JSON wrapped in a SHA-256-checksummed envelope; an
//! entry that fails validation is treated as a miss and refetched.

use moka::future::Cache;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Default time-to-live for cached datasets: 5 minutes.
pub const CACHE_TTL: Duration = Duration::from_secs(300);

/// Logical dataset identifiers. Adapters and handlers use these instead of
/// ad-hoc key strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetKey {
    AdsSheet,
    SetupSheet,
    MetaInsights,
}

impl DatasetKey {
    fn is_sheet(&self) -> bool {
        matches!(self, DatasetKey::AdsSheet | DatasetKey::SetupSheet)
    }
}

/// Checksummed wrapper around a cached JSON document.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEnvelope {
    data: String,
    checksum: String,
}

impl CacheEnvelope {
    fn seal(data: String) -> Self {
        let checksum = Self::compute_checksum(&data);
        Self { data, checksum }
    }

    fn compute_checksum(data: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn open(self) -> Option<String> {
        if Self::compute_checksum(&self.data) == self.checksum {
            Some(self.data)
        } else {
            tracing::warn!(
                "Cache validation failed: checksum mismatch (data length {})",
                self.data.len()
            );
            None
        }
    }
}

/// Shared cache for source-adapter datasets.
pub struct DashboardCache {
    sheets: Cache<DatasetKey, String>,
    meta: Cache<DatasetKey, String>,
}

impl DashboardCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sheets: Cache::builder().time_to_live(ttl).max_capacity(8).build(),
            meta: Cache::builder().time_to_live(ttl).max_capacity(8).build(),
        }
    }

    fn domain(&self, key: DatasetKey) -> &Cache<DatasetKey, String> {
        if key.is_sheet() {
            &self.sheets
        } else {
            &self.meta
        }
    }

    /// Reads a cached dataset, returning `None` on miss, expiry, decode
    /// failure, or checksum mismatch.
    pub async fn get<T: DeserializeOwned>(&self, key: DatasetKey) -> Option<T> {
        let raw = self.domain(key).get(&key).await?;
        let envelope: CacheEnvelope = serde_json::from_str(&raw).ok()?;
        let data = envelope.open()?;
        match serde_json::from_str(&data) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Cached {:?} failed to decode: {}", key, e);
                None
            }
        }
    }

    /// Stores a dataset. Serialization failures are logged and dropped; the
    /// cache is an optimization, never a required write.
    pub async fn insert<T: Serialize>(&self, key: DatasetKey, value: &T) {
        match serde_json::to_string(value) {
            Ok(data) => {
                let envelope = CacheEnvelope::seal(data);
                let raw = serde_json::to_string(&envelope).unwrap_or_default();
                self.domain(key).insert(key, raw).await;
            }
            Err(e) => tracing::warn!("Failed to serialize {:?} for caching: {}", key, e),
        }
    }

    /// Drops both sheet-derived datasets. Used by force refresh.
    pub async fn invalidate_sheets(&self) {
        self.sheets.invalidate_all();
        self.sheets.run_pending_tasks().await;
    }

    /// Drops Meta-derived data. Used by force refresh and after a mapping
    /// edit, so the next fetch reflects the new mapping set.
    pub async fn invalidate_meta(&self) {
        self.meta.invalidate_all();
        self.meta.run_pending_tasks().await;
    }
}

impl Default for DashboardCache {
    fn default() -> Self {
        Self::new(CACHE_TTL)
    }
}
