//! dispatchgrid-chat — the chat fan-out write path.
//!
//! [`ChatWriter`] is the canonical multi-target write built on the state
//! stores: an append to the message log, a best-effort cache shadow, and
//! an immutable blob copy.

pub mod sinks;
pub mod writer;

pub use sinks::{BlobSink, CacheSink, MessageSink};
pub use writer::{
    CACHE_SNAPSHOT_LIMIT, ChatWriter, DEFAULT_RECENT_LIMIT, LAST_MESSAGE_TTL, RecentChat,
    Recorded, blob_log_key, last_message_key,
};
