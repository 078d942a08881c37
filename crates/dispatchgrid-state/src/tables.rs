//! redb table definitions for the DispatchGrid state store.
//!
//! String-keyed tables hold JSON-serialized domain types in `&[u8]`
//! columns. Actor records use a `(actor_id, key)` tuple key so one actor's
//! records form a contiguous, key-ordered range. The message log is keyed
//! by `(timestamp_ms, seq)`.

use redb::TableDefinition;

/// Registry namespaces keyed by `{name}`.
pub const NAMESPACES: TableDefinition<&str, &[u8]> = TableDefinition::new("namespaces");

/// Published scripts keyed by `{namespace}/{name}`.
pub const SCRIPTS: TableDefinition<&str, &[u8]> = TableDefinition::new("scripts");

/// Per-actor durable records keyed by `(actor_id, key)`.
pub const ACTOR_RECORDS: TableDefinition<(&str, &str), &[u8]> =
    TableDefinition::new("actor_records");

/// Cache namespace entries keyed by `{key}`.
pub const CACHE: TableDefinition<&str, &[u8]> = TableDefinition::new("cache");

/// Chat message log keyed by `(timestamp_ms, seq)`.
pub const MESSAGES: TableDefinition<(u64, u64), &[u8]> = TableDefinition::new("messages");

/// Raw blob bodies keyed by `{key}`.
pub const BLOBS: TableDefinition<&str, &[u8]> = TableDefinition::new("blobs");

/// Blob metadata keyed by `{key}`.
pub const BLOB_META: TableDefinition<&str, &[u8]> = TableDefinition::new("blob_meta");
