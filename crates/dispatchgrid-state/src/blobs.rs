//! Blob bucket — opaque bodies with a small metadata record.
//!
//! Body and metadata live in separate tables so listing never loads
//! bodies. Both are written in the same transaction.

use std::sync::Arc;

use dispatch_core::now_ms;
use redb::{Database, ReadableDatabase};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::{BLOB_META, BLOBS};
use crate::types::{BlobMeta, BlobObject};

/// Handle to the blob bucket.
#[derive(Clone)]
pub struct BlobBucket {
    db: Arc<Database>,
}

impl BlobBucket {
    pub(crate) fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Store (or overwrite) an object.
    pub fn put(&self, key: &str, body: &[u8], content_type: Option<&str>) -> StateResult<BlobMeta> {
        if key.is_empty() {
            return Err(StateError::InvalidKey("object key must not be empty".to_string()));
        }
        let meta = BlobMeta {
            key: key.to_string(),
            content_type: content_type.map(str::to_string),
            size: body.len() as u64,
            uploaded_at: now_ms(),
        };
        let meta_bytes = serde_json::to_vec(&meta).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut bodies = txn.open_table(BLOBS).map_err(map_err!(Table))?;
            bodies.insert(key, body).map_err(map_err!(Write))?;
            let mut metas = txn.open_table(BLOB_META).map_err(map_err!(Table))?;
            metas
                .insert(key, meta_bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, size = meta.size, "blob stored");
        Ok(meta)
    }

    /// Fetch an object with its metadata.
    pub fn get(&self, key: &str) -> StateResult<Option<BlobObject>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let bodies = txn.open_table(BLOBS).map_err(map_err!(Table))?;
        let body = match bodies.get(key).map_err(map_err!(Read))? {
            Some(guard) => guard.value().to_vec(),
            None => return Ok(None),
        };
        let metas = txn.open_table(BLOB_META).map_err(map_err!(Table))?;
        let meta = match metas.get(key).map_err(map_err!(Read))? {
            Some(guard) => serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
            None => BlobMeta {
                key: key.to_string(),
                content_type: None,
                size: body.len() as u64,
                uploaded_at: 0,
            },
        };
        Ok(Some(BlobObject { meta, body }))
    }

    /// Delete an object. Returns true if it existed.
    pub fn delete(&self, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut bodies = txn.open_table(BLOBS).map_err(map_err!(Table))?;
            existed = bodies.remove(key).map_err(map_err!(Write))?.is_some();
            let mut metas = txn.open_table(BLOB_META).map_err(map_err!(Table))?;
            metas.remove(key).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "blob deleted");
        Ok(existed)
    }

    /// Metadata of every object whose key starts with `prefix`, in key
    /// order.
    pub fn list(&self, prefix: Option<&str>) -> StateResult<Vec<BlobMeta>> {
        let prefix = prefix.unwrap_or("");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let metas = txn.open_table(BLOB_META).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in metas.range(prefix..).map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if !key.value().starts_with(prefix) {
                break;
            }
            let meta: BlobMeta =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(meta);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use crate::StateStore;

    #[test]
    fn put_then_get_returns_body_and_type() {
        let bucket = StateStore::open_in_memory().unwrap().blobs();
        bucket
            .put("example.txt", b"Pick of Gods R2 content", Some("text/plain"))
            .unwrap();

        let obj = bucket.get("example.txt").unwrap().unwrap();
        assert_eq!(obj.text(), "Pick of Gods R2 content");
        assert_eq!(obj.meta.content_type.as_deref(), Some("text/plain"));
        assert_eq!(obj.meta.size, 23);
    }

    #[test]
    fn missing_object_is_none() {
        let bucket = StateStore::open_in_memory().unwrap().blobs();
        assert!(bucket.get("missing.txt").unwrap().is_none());
    }

    #[test]
    fn delete_removes_body_and_meta() {
        let bucket = StateStore::open_in_memory().unwrap().blobs();
        bucket.put("a", b"1", None).unwrap();

        assert!(bucket.delete("a").unwrap());
        assert!(bucket.get("a").unwrap().is_none());
        assert!(bucket.list(None).unwrap().is_empty());
        assert!(!bucket.delete("a").unwrap());
    }

    #[test]
    fn list_by_prefix() {
        let bucket = StateStore::open_in_memory().unwrap().blobs();
        bucket.put("logs/2_bob.txt", b"b", None).unwrap();
        bucket.put("logs/1_alice.txt", b"a", None).unwrap();
        bucket.put("upload.png", b"p", Some("image/png")).unwrap();

        let keys: Vec<_> = bucket
            .list(Some("logs/"))
            .unwrap()
            .into_iter()
            .map(|m| m.key)
            .collect();
        assert_eq!(keys, ["logs/1_alice.txt", "logs/2_bob.txt"]);
    }
}
