//! Domain types persisted by the DispatchGrid state store.
//!
//! All types are serializable to/from JSON for storage in redb tables.

use dispatch_core::BindingSet;
use serde::{Deserialize, Serialize};

// ── Registry ──────────────────────────────────────────────────────

/// A named container of scripts owned by one account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NamespaceRecord {
    pub name: String,
    pub account_scope: String,
    /// Unix timestamp (ms) when the namespace was created.
    pub created_at: u64,
}

/// A published script: code plus the bindings it runs with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScriptRecord {
    pub namespace: String,
    pub name: String,
    /// Logical file name of the entry point, e.g. `foo.mjs`.
    pub entry_module: String,
    pub code_body: String,
    pub bindings: BindingSet,
    /// Unix timestamp (ms) of the last publish.
    pub modified_at: u64,
}

impl ScriptRecord {
    /// Build the composite key for the scripts table.
    pub fn table_key(&self) -> String {
        script_key(&self.namespace, &self.name)
    }
}

/// Composite key for a script within a namespace.
pub fn script_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// Result of a create-if-absent write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

// ── Actor records ─────────────────────────────────────────────────

/// One key/value pair from an actor's private storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    pub key: String,
    pub value: serde_json::Value,
}

// ── Cache ─────────────────────────────────────────────────────────

/// Cache namespace entry with optional expiry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    pub value: String,
    /// Unix timestamp (ms) after which the entry is invisible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl CacheEntry {
    pub fn is_live(&self, now_ms: u64) -> bool {
        self.expires_at.is_none_or(|at| now_ms < at)
    }
}

// ── Chat log ──────────────────────────────────────────────────────

/// One appended chat message. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub user: String,
    pub message: String,
    /// Unix timestamp (ms) assigned at write time.
    pub timestamp: u64,
}

// ── Blobs ─────────────────────────────────────────────────────────

/// Metadata stored next to each blob body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlobMeta {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub size: u64,
    /// Unix timestamp (ms) of the upload.
    pub uploaded_at: u64,
}

/// A blob body together with its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobObject {
    pub meta: BlobMeta,
    pub body: Vec<u8>,
}

impl BlobObject {
    /// Body decoded as UTF-8, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
