//! Cache namespace — string values with optional expiry.
//!
//! The cache is a lossy accelerator: expired entries stay on disk until
//! overwritten or swept by [`CacheStore::purge_expired`], but are never
//! returned by `get` or `list`.

use std::sync::Arc;
use std::time::Duration;

use dispatch_core::now_ms;
use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::CACHE;
use crate::types::CacheEntry;

/// Handle to the cache namespace.
#[derive(Clone)]
pub struct CacheStore {
    db: Arc<Database>,
}

impl CacheStore {
    pub(crate) fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Read a live value.
    pub fn get(&self, key: &str) -> StateResult<Option<String>> {
        Ok(self.get_entry(key)?.map(|entry| entry.value))
    }

    /// Read a live entry including its expiry.
    pub fn get_entry(&self, key: &str) -> StateResult<Option<CacheEntry>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CACHE).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let entry: CacheEntry =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(entry.is_live(now_ms()).then_some(entry))
            }
            None => Ok(None),
        }
    }

    /// Insert or overwrite a value, expiring after `ttl` if given.
    pub fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> StateResult<()> {
        if key.is_empty() {
            return Err(StateError::InvalidKey("cache key must not be empty".to_string()));
        }
        let entry = CacheEntry {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| now_ms().saturating_add(ttl.as_millis() as u64)),
        };
        let bytes = serde_json::to_vec(&entry).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(CACHE).map_err(map_err!(Table))?;
            table
                .insert(key, bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, expires_at = ?entry.expires_at, "cache entry stored");
        Ok(())
    }

    /// Delete a key. Returns true if a (possibly expired) entry existed.
    pub fn delete(&self, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(CACHE).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "cache entry deleted");
        Ok(existed)
    }

    /// Up to `limit` live entries whose key starts with `prefix`, in key
    /// order.
    pub fn list(&self, prefix: Option<&str>, limit: usize) -> StateResult<Vec<(String, String)>> {
        let prefix = prefix.unwrap_or("");
        let now = now_ms();
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CACHE).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.range(prefix..).map_err(map_err!(Read))? {
            if results.len() >= limit {
                break;
            }
            let (key, value) = entry.map_err(map_err!(Read))?;
            if !key.value().starts_with(prefix) {
                break;
            }
            let entry: CacheEntry =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if entry.is_live(now) {
                results.push((key.value().to_string(), entry.value));
            }
        }
        Ok(results)
    }

    /// Remove every expired entry. Returns the number removed.
    pub fn purge_expired(&self) -> StateResult<u32> {
        let now = now_ms();
        // Collect keys in a read transaction first.
        let expired: Vec<String> = {
            let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(CACHE).map_err(map_err!(Table))?;
            let mut keys = Vec::new();
            for entry in table.iter().map_err(map_err!(Read))? {
                let (key, value) = entry.map_err(map_err!(Read))?;
                let entry: CacheEntry =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                if !entry.is_live(now) {
                    keys.push(key.value().to_string());
                }
            }
            keys
        };
        if expired.is_empty() {
            return Ok(0);
        }
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut count = 0;
        {
            let mut table = txn.open_table(CACHE).map_err(map_err!(Table))?;
            for key in &expired {
                // Re-check: the key may have been refreshed since the scan.
                let still_expired = match table.get(key.as_str()).map_err(map_err!(Read))? {
                    Some(guard) => serde_json::from_slice::<CacheEntry>(guard.value())
                        .map(|e| !e.is_live(now))
                        .unwrap_or(true),
                    None => false,
                };
                if still_expired {
                    table.remove(key.as_str()).map_err(map_err!(Write))?;
                    count += 1;
                }
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(count, "expired cache entries purged");
        Ok(count)
    }
}
