//! Chat fan-out writer.
//!
//! One logical write lands in three stores with different guarantees:
//!
//! | Target | Key | Failure |
//! |---|---|---|
//! | message log | `(timestamp, seq)` | fatal, nothing else is written |
//! | cache | `last_<user>`, 1 h expiry | logged and ignored |
//! | blob bucket | `logs/<timestamp>_<user>.txt` | fatal |
//!
//! The log is the source of truth. A blob failure after a successful log
//! append still surfaces to the caller even though the row is committed.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dispatch_core::{AccessMode, GatewayError, GatewayResult, MonotonicClock};
use dispatchgrid_state::{ChatMessage, StateStore};
use serde::Serialize;
use tracing::{debug, warn};

use crate::sinks::{BlobSink, CacheSink, MessageSink};

/// Expiry of the `last_<user>` cache shadow.
pub const LAST_MESSAGE_TTL: Duration = Duration::from_secs(3600);

/// Default number of log rows returned by [`ChatWriter::recent`].
pub const DEFAULT_RECENT_LIMIT: usize = 20;

/// Upper bound for `limit`; larger values are capped.
pub const MAX_RECENT_LIMIT: usize = 200;

/// Number of cache entries included in the snapshot.
pub const CACHE_SNAPSHOT_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recorded {
    pub status: &'static str,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentChat {
    pub messages: Vec<ChatMessage>,
    pub cached_data: BTreeMap<String, String>,
}

/// Cache key shadowing a user's latest message.
pub fn last_message_key(user: &str) -> String {
    format!("last_{user}")
}

/// Blob key of the immutable copy of one message.
pub fn blob_log_key(timestamp: u64, user: &str) -> String {
    format!("logs/{timestamp}_{user}.txt")
}

#[derive(Clone)]
pub struct ChatWriter {
    log: Arc<dyn MessageSink>,
    cache: Arc<dyn CacheSink>,
    blobs: Arc<dyn BlobSink>,
    access: AccessMode,
    clock: Arc<MonotonicClock>,
}

impl ChatWriter {
    /// Writer over the stores of one state database.
    pub fn new(store: &StateStore, access: AccessMode) -> Self {
        Self::with_sinks(
            Arc::new(store.messages()),
            Arc::new(store.cache()),
            Arc::new(store.blobs()),
            access,
        )
    }

    pub fn with_sinks(
        log: Arc<dyn MessageSink>,
        cache: Arc<dyn CacheSink>,
        blobs: Arc<dyn BlobSink>,
        access: AccessMode,
    ) -> Self {
        Self {
            log,
            cache,
            blobs,
            access,
            clock: Arc::new(MonotonicClock::new()),
        }
    }

    /// Append a message and fan it out to the cache and blob bucket.
    pub fn record(&self, user: &str, message: &str) -> GatewayResult<Recorded> {
        self.access.ensure_writable()?;
        if user.is_empty() {
            return Err(GatewayError::validation("Missing user"));
        }
        if message.is_empty() {
            return Err(GatewayError::validation("Missing message"));
        }

        let timestamp = self.clock.now_ms();
        let row = ChatMessage {
            user: user.to_string(),
            message: message.to_string(),
            timestamp,
        };

        self.log.append(&row)?;

        let cache_key = last_message_key(user);
        if let Err(e) = self.cache.put(&cache_key, message, Some(LAST_MESSAGE_TTL)) {
            warn!(key = %cache_key, error = %e, "cache shadow write failed");
        }

        let blob_key = blob_log_key(timestamp, user);
        self.blobs
            .put(&blob_key, message.as_bytes(), Some("text/plain; charset=utf-8"))?;

        debug!(user, timestamp, "chat message recorded");
        Ok(Recorded {
            status: "ok",
            timestamp,
        })
    }

    /// Newest `limit` messages plus a snapshot of the cache.
    ///
    /// The two halves are read separately and may disagree.
    pub fn recent(&self, limit: usize) -> GatewayResult<RecentChat> {
        if limit == 0 {
            return Err(GatewayError::validation("limit must be at least 1"));
        }
        let limit = limit.min(MAX_RECENT_LIMIT);
        let messages = self.log.recent(limit)?;
        let cached_data = self
            .cache
            .list(CACHE_SNAPSHOT_LIMIT)?
            .into_iter()
            .collect();
        Ok(RecentChat {
            messages,
            cached_data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_core::now_ms;
    use dispatchgrid_state::{StateError, StateResult};

    struct FailingCache;

    impl CacheSink for FailingCache {
        fn put(&self, _: &str, _: &str, _: Option<Duration>) -> StateResult<()> {
            Err(StateError::Write("cache offline".into()))
        }
        fn list(&self, _: usize) -> StateResult<Vec<(String, String)>> {
            Err(StateError::Read("cache offline".into()))
        }
    }

    struct FailingBlobs;

    impl BlobSink for FailingBlobs {
        fn put(&self, _: &str, _: &[u8], _: Option<&str>) -> StateResult<()> {
            Err(StateError::Write("bucket offline".into()))
        }
    }

    struct FailingLog;

    impl MessageSink for FailingLog {
        fn append(&self, _: &ChatMessage) -> StateResult<()> {
            Err(StateError::Write("log offline".into()))
        }
        fn recent(&self, _: usize) -> StateResult<Vec<ChatMessage>> {
            Ok(Vec::new())
        }
    }

    fn store() -> StateStore {
        StateStore::open_in_memory().unwrap()
    }

    #[test]
    fn record_fans_out_to_all_three_stores() {
        let store = store();
        let writer = ChatWriter::new(&store, AccessMode::read_write());

        let recorded = writer.record("alice", "hi").unwrap();
        assert_eq!(recorded.status, "ok");
        assert!(recorded.timestamp <= now_ms());

        let rows = store.messages().recent(10).unwrap();
        assert_eq!(
            rows,
            vec![ChatMessage {
                user: "alice".into(),
                message: "hi".into(),
                timestamp: recorded.timestamp,
            }]
        );
        assert_eq!(store.cache().get("last_alice").unwrap().as_deref(), Some("hi"));

        let blob = store
            .blobs()
            .get(&format!("logs/{}_alice.txt", recorded.timestamp))
            .unwrap()
            .unwrap();
        assert_eq!(blob.text(), "hi");
    }

    #[test]
    fn read_only_touches_nothing() {
        let store = store();
        let writer = ChatWriter::new(&store, AccessMode::read_only());

        let err = writer.record("alice", "hi").unwrap_err();
        assert!(matches!(err, GatewayError::AccessDenied(_)));
        assert!(store.messages().is_empty().unwrap());
        assert!(store.cache().get("last_alice").unwrap().is_none());
        assert!(store.blobs().list(None).unwrap().is_empty());
    }

    #[test]
    fn empty_fields_are_validation_errors() {
        let store = store();
        let writer = ChatWriter::new(&store, AccessMode::read_write());
        assert!(matches!(writer.record("", "hi"), Err(GatewayError::Validation(_))));
        assert!(matches!(writer.record("bob", ""), Err(GatewayError::Validation(_))));
        assert!(store.messages().is_empty().unwrap());
    }

    #[test]
    fn cache_failure_is_not_fatal() {
        let store = store();
        let writer = ChatWriter::with_sinks(
            Arc::new(store.messages()),
            Arc::new(FailingCache),
            Arc::new(store.blobs()),
            AccessMode::read_write(),
        );

        let recorded = writer.record("alice", "hi").unwrap();
        assert_eq!(store.messages().len().unwrap(), 1);
        assert!(
            store
                .blobs()
                .get(&blob_log_key(recorded.timestamp, "alice"))
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn blob_failure_is_fatal() {
        let store = store();
        let writer = ChatWriter::with_sinks(
            Arc::new(store.messages()),
            Arc::new(store.cache()),
            Arc::new(FailingBlobs),
            AccessMode::read_write(),
        );

        let err = writer.record("alice", "hi").unwrap_err();
        assert!(matches!(err, GatewayError::Upstream(ref m) if m.contains("bucket offline")));
    }

    #[test]
    fn log_failure_aborts_before_other_writes() {
        let store = store();
        let writer = ChatWriter::with_sinks(
            Arc::new(FailingLog),
            Arc::new(store.cache()),
            Arc::new(store.blobs()),
            AccessMode::read_write(),
        );

        assert!(matches!(writer.record("alice", "hi"), Err(GatewayError::Upstream(_))));
        assert!(store.cache().get("last_alice").unwrap().is_none());
        assert!(store.blobs().list(None).unwrap().is_empty());
    }

    #[test]
    fn recent_lists_newest_first_with_cache_snapshot() {
        let store = store();
        let writer = ChatWriter::new(&store, AccessMode::read_write());
        writer.record("alice", "first").unwrap();
        writer.record("bob", "second").unwrap();

        let recent = writer.recent(DEFAULT_RECENT_LIMIT).unwrap();
        let texts: Vec<_> = recent.messages.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(texts, ["second", "first"]);
        assert_eq!(recent.cached_data.get("last_alice").map(String::as_str), Some("first"));
        assert_eq!(recent.cached_data.get("last_bob").map(String::as_str), Some("second"));

        let json = serde_json::to_value(&recent).unwrap();
        assert!(json.get("cachedData").is_some());
    }

    #[test]
    fn cache_snapshot_is_capped() {
        let store = store();
        let writer = ChatWriter::new(&store, AccessMode::read_write());
        for i in 0..15 {
            writer.record(&format!("user{i:02}"), "m").unwrap();
        }
        let recent = writer.recent(5).unwrap();
        assert_eq!(recent.messages.len(), 5);
        assert_eq!(recent.cached_data.len(), CACHE_SNAPSHOT_LIMIT);
    }

    #[test]
    fn zero_limit_is_rejected() {
        let store = store();
        let writer = ChatWriter::new(&store, AccessMode::read_write());
        writer.record("alice", "hi").unwrap();
        assert!(matches!(writer.recent(0), Err(GatewayError::Validation(_))));
        assert_eq!(writer.recent(MAX_RECENT_LIMIT + 50).unwrap().messages.len(), 1);
    }

    #[test]
    fn same_user_burst_keeps_one_blob_per_message() {
        let store = store();
        let writer = ChatWriter::new(&store, AccessMode::read_write());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let writer = writer.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        writer.record("alice", &format!("{t}-{i}")).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.messages().len().unwrap(), 400);
        assert_eq!(store.blobs().list(Some("logs/")).unwrap().len(), 400);
    }
}
