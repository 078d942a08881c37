//! Per-actor durable record storage.
//!
//! Each actor sees a private key/value namespace. Records live in one
//! table keyed by `(actor_id, key)`, so listing an actor is a single
//! ordered range scan and two actors can never observe each other's
//! keys. Every operation is its own transaction: a committed `put` is
//! visible to the next `get` on the same actor.

use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::ACTOR_RECORDS;
use crate::types::Record;

/// Handle to one actor instance's private storage.
#[derive(Clone)]
pub struct ActorStore {
    db: Arc<Database>,
    actor_id: String,
}

impl ActorStore {
    pub(crate) fn new(db: Arc<Database>, actor_id: &str) -> StateResult<Self> {
        if actor_id.is_empty() {
            return Err(StateError::InvalidKey("actor id must not be empty".to_string()));
        }
        Ok(Self {
            db,
            actor_id: actor_id.to_string(),
        })
    }

    /// Read one record.
    pub fn get(&self, key: &str) -> StateResult<Option<serde_json::Value>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ACTOR_RECORDS).map_err(map_err!(Table))?;
        match table
            .get((self.actor_id.as_str(), key))
            .map_err(map_err!(Read))?
        {
            Some(guard) => {
                let value = serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Insert or overwrite one record.
    pub fn put(&self, key: &str, value: &serde_json::Value) -> StateResult<()> {
        if key.is_empty() {
            return Err(StateError::InvalidKey("record key must not be empty".to_string()));
        }
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(ACTOR_RECORDS).map_err(map_err!(Table))?;
            table
                .insert((self.actor_id.as_str(), key), bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(actor = %self.actor_id, %key, "actor record stored");
        Ok(())
    }

    /// Delete one record. Returns true if it existed.
    pub fn delete(&self, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(ACTOR_RECORDS).map_err(map_err!(Table))?;
            existed = table
                .remove((self.actor_id.as_str(), key))
                .map_err(map_err!(Write))?
                .is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(actor = %self.actor_id, %key, existed, "actor record deleted");
        Ok(existed)
    }

    /// All records whose key starts with `prefix`, in ascending
    /// byte-lexicographic key order.
    ///
    /// Returns a snapshot; calling again re-reads current state.
    pub fn list(&self, prefix: Option<&str>) -> StateResult<Vec<Record>> {
        let prefix = prefix.unwrap_or("");
        let actor = self.actor_id.as_str();
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ACTOR_RECORDS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.range((actor, prefix)..).map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            let (owner, record_key) = key.value();
            if owner != actor || !record_key.starts_with(prefix) {
                break;
            }
            let value = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(Record {
                key: record_key.to_string(),
                value,
            });
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use crate::StateStore;
    use serde_json::json;

    #[test]
    fn put_then_get_round_trips() {
        let store = StateStore::open_in_memory().unwrap();
        let actor = store.actor("example").unwrap();
        let value = json!({"user": "alice", "n": 3, "tags": ["a", "b"]});

        actor.put("k1", &value).unwrap();
        assert_eq!(actor.get("k1").unwrap(), Some(value));
    }

    #[test]
    fn delete_then_get_is_absent() {
        let store = StateStore::open_in_memory().unwrap();
        let actor = store.actor("example").unwrap();
        actor.put("k1", &json!(1)).unwrap();

        assert!(actor.delete("k1").unwrap());
        assert!(!actor.delete("k1").unwrap());
        assert!(actor.get("k1").unwrap().is_none());
    }

    #[test]
    fn list_is_key_ordered() {
        let store = StateStore::open_in_memory().unwrap();
        let actor = store.actor("example").unwrap();
        for key in ["b", "a", "c", "B", "aa"] {
            actor.put(key, &json!(key)).unwrap();
        }

        let keys: Vec<_> = actor.list(None).unwrap().into_iter().map(|r| r.key).collect();
        assert_eq!(keys, ["B", "a", "aa", "b", "c"]);
    }

    #[test]
    fn list_filters_by_prefix_and_is_restartable() {
        let store = StateStore::open_in_memory().unwrap();
        let actor = store.actor("example").unwrap();
        actor.put("msg:1", &json!(1)).unwrap();
        actor.put("msg:2", &json!(2)).unwrap();
        actor.put("other", &json!(3)).unwrap();

        let first = actor.list(Some("msg:")).unwrap();
        let second = actor.list(Some("msg:")).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].key, "msg:1");
    }

    #[test]
    fn actors_are_isolated() {
        let store = StateStore::open_in_memory().unwrap();
        let a = store.actor("a").unwrap();
        let ab = store.actor("ab").unwrap();
        a.put("k", &json!("from a")).unwrap();
        ab.put("k", &json!("from ab")).unwrap();

        assert_eq!(a.list(None).unwrap().len(), 1);
        assert_eq!(a.get("k").unwrap(), Some(json!("from a")));
        assert_eq!(ab.get("k").unwrap(), Some(json!("from ab")));
        assert!(store.actor("b").unwrap().list(None).unwrap().is_empty());
    }

    #[test]
    fn empty_identifiers_are_rejected() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.actor("").is_err());
        assert!(store.actor("x").unwrap().put("", &json!(1)).is_err());
    }
}
