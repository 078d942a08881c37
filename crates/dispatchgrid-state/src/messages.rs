//! Append-only chat message log.
//!
//! Rows are keyed by `(timestamp_ms, seq)`. `seq` disambiguates rows that
//! share a millisecond, so iteration order is timestamp order with ties
//! broken by insertion order.

use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata};
use tracing::debug;

use crate::error::StateResult;
use crate::tables::MESSAGES;
use crate::types::ChatMessage;

/// Handle to the message log.
#[derive(Clone)]
pub struct MessageLog {
    db: Arc<Database>,
}

impl MessageLog {
    pub(crate) fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append one row. Returns the sequence number assigned within the
    /// row's millisecond.
    pub fn append(&self, message: &ChatMessage) -> StateResult<u64> {
        let bytes = serde_json::to_vec(message).map_err(map_err!(Serialize))?;
        let ts = message.timestamp;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let seq;
        {
            let mut table = txn.open_table(MESSAGES).map_err(map_err!(Table))?;
            seq = match table
                .range((ts, 0)..=(ts, u64::MAX))
                .map_err(map_err!(Read))?
                .next_back()
            {
                Some(entry) => {
                    let (key, _) = entry.map_err(map_err!(Read))?;
                    key.value().1 + 1
                }
                None => 0,
            };
            table
                .insert((ts, seq), bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(user = %message.user, timestamp = ts, seq, "message appended");
        Ok(seq)
    }

    /// The newest `limit` rows, most recent first.
    pub fn recent(&self, limit: usize) -> StateResult<Vec<ChatMessage>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(MESSAGES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))?.rev() {
            if results.len() >= limit {
                break;
            }
            let (_, value) = entry.map_err(map_err!(Read))?;
            let message: ChatMessage =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(message);
        }
        Ok(results)
    }

    /// Total number of rows.
    pub fn len(&self) -> StateResult<u64> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(MESSAGES).map_err(map_err!(Table))?;
        table.len().map_err(map_err!(Read))
    }

    pub fn is_empty(&self) -> StateResult<bool> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::StateStore;
    use crate::types::ChatMessage;

    fn msg(user: &str, text: &str, timestamp: u64) -> ChatMessage {
        ChatMessage {
            user: user.to_string(),
            message: text.to_string(),
            timestamp,
        }
    }

    #[test]
    fn recent_is_newest_first() {
        let log = StateStore::open_in_memory().unwrap().messages();
        log.append(&msg("alice", "one", 1000)).unwrap();
        log.append(&msg("bob", "two", 2000)).unwrap();
        log.append(&msg("alice", "three", 3000)).unwrap();

        let texts: Vec<_> = log
            .recent(10)
            .unwrap()
            .into_iter()
            .map(|m| m.message)
            .collect();
        assert_eq!(texts, ["three", "two", "one"]);
    }

    #[test]
    fn same_millisecond_keeps_insertion_order() {
        let log = StateStore::open_in_memory().unwrap().messages();
        assert_eq!(log.append(&msg("alice", "first", 5000)).unwrap(), 0);
        assert_eq!(log.append(&msg("alice", "second", 5000)).unwrap(), 1);

        let recent = log.recent(2).unwrap();
        assert_eq!(recent[0].message, "second");
        assert_eq!(recent[1].message, "first");
        assert_eq!(log.len().unwrap(), 2);
    }

    #[test]
    fn recent_respects_limit() {
        let log = StateStore::open_in_memory().unwrap().messages();
        for i in 0..30 {
            log.append(&msg("u", &i.to_string(), 1000 + i)).unwrap();
        }
        let recent = log.recent(20).unwrap();
        assert_eq!(recent.len(), 20);
        assert_eq!(recent[0].message, "29");
        assert_eq!(recent[19].message, "10");
    }
}
