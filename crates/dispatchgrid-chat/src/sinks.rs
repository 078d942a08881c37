//! Store seams used by the fan-out writer.
//!
//! Implemented for the redb-backed stores; tests substitute failing
//! doubles to exercise the per-target failure policy.

use std::time::Duration;

use dispatchgrid_state::{BlobBucket, CacheStore, ChatMessage, MessageLog, StateResult};

/// The relational message log (source of truth).
pub trait MessageSink: Send + Sync {
    fn append(&self, message: &ChatMessage) -> StateResult<()>;
    fn recent(&self, limit: usize) -> StateResult<Vec<ChatMessage>>;
}

/// The cache namespace.
pub trait CacheSink: Send + Sync {
    fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> StateResult<()>;
    fn list(&self, limit: usize) -> StateResult<Vec<(String, String)>>;
}

/// The blob bucket.
pub trait BlobSink: Send + Sync {
    fn put(&self, key: &str, body: &[u8], content_type: Option<&str>) -> StateResult<()>;
}

impl MessageSink for MessageLog {
    fn append(&self, message: &ChatMessage) -> StateResult<()> {
        MessageLog::append(self, message).map(|_| ())
    }

    fn recent(&self, limit: usize) -> StateResult<Vec<ChatMessage>> {
        MessageLog::recent(self, limit)
    }
}

impl CacheSink for CacheStore {
    fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> StateResult<()> {
        CacheStore::put(self, key, value, ttl)
    }

    fn list(&self, limit: usize) -> StateResult<Vec<(String, String)>> {
        CacheStore::list(self, None, limit)
    }
}

impl BlobSink for BlobBucket {
    fn put(&self, key: &str, body: &[u8], content_type: Option<&str>) -> StateResult<()> {
        BlobBucket::put(self, key, body, content_type).map(|_| ())
    }
}
