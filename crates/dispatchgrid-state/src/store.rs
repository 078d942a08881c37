//! StateStore — redb-backed persistence for DispatchGrid.
//!
//! Owns the database handle, creates tables, stores the local registry
//! (namespaces and scripts), and hands out typed handles for the actor,
//! cache, message log, and blob stores. Supports both on-disk and
//! in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::actor::ActorStore;
use crate::blobs::BlobBucket;
use crate::cache::CacheStore;
use crate::error::StateResult;
use crate::messages::MessageLog;
use crate::tables::*;
use crate::types::*;

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(NAMESPACES).map_err(map_err!(Table))?;
        txn.open_table(SCRIPTS).map_err(map_err!(Table))?;
        txn.open_table(ACTOR_RECORDS).map_err(map_err!(Table))?;
        txn.open_table(CACHE).map_err(map_err!(Table))?;
        txn.open_table(MESSAGES).map_err(map_err!(Table))?;
        txn.open_table(BLOBS).map_err(map_err!(Table))?;
        txn.open_table(BLOB_META).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Handles ────────────────────────────────────────────────────

    /// Private storage of one actor instance.
    pub fn actor(&self, actor_id: &str) -> StateResult<ActorStore> {
        ActorStore::new(self.db.clone(), actor_id)
    }

    /// The cache namespace.
    pub fn cache(&self) -> CacheStore {
        CacheStore::new(self.db.clone())
    }

    /// The chat message log.
    pub fn messages(&self) -> MessageLog {
        MessageLog::new(self.db.clone())
    }

    /// The blob bucket.
    pub fn blobs(&self) -> BlobBucket {
        BlobBucket::new(self.db.clone())
    }

    // ── Namespaces ─────────────────────────────────────────────────

    /// Get a namespace by name.
    pub fn get_namespace(&self, name: &str) -> StateResult<Option<NamespaceRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(NAMESPACES).map_err(map_err!(Table))?;
        match table.get(name).map_err(map_err!(Read))? {
            Some(guard) => {
                let ns: NamespaceRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(ns))
            }
            None => Ok(None),
        }
    }

    /// Insert a namespace unless one with the same name exists.
    ///
    /// The existence check and insert share one write transaction, so
    /// concurrent callers observe exactly one `Created`.
    pub fn create_namespace(&self, ns: &NamespaceRecord) -> StateResult<CreateOutcome> {
        let value = serde_json::to_vec(ns).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let outcome;
        {
            let mut table = txn.open_table(NAMESPACES).map_err(map_err!(Table))?;
            if table.get(ns.name.as_str()).map_err(map_err!(Read))?.is_some() {
                outcome = CreateOutcome::AlreadyExists;
            } else {
                table
                    .insert(ns.name.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
                outcome = CreateOutcome::Created;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(name = %ns.name, ?outcome, "namespace create");
        Ok(outcome)
    }

    /// List all namespaces in name order.
    pub fn list_namespaces(&self) -> StateResult<Vec<NamespaceRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(NAMESPACES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let ns: NamespaceRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(ns);
        }
        Ok(results)
    }

    // ── Scripts ────────────────────────────────────────────────────

    /// Insert or fully replace a script.
    pub fn put_script(&self, script: &ScriptRecord) -> StateResult<()> {
        let key = script.table_key();
        let value = serde_json::to_vec(script).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(SCRIPTS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "script stored");
        Ok(())
    }

    /// Get a script by namespace and name.
    pub fn get_script(&self, namespace: &str, name: &str) -> StateResult<Option<ScriptRecord>> {
        let key = script_key(namespace, name);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SCRIPTS).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let script: ScriptRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(script))
            }
            None => Ok(None),
        }
    }

    /// List all scripts in a namespace, in name order.
    pub fn list_scripts(&self, namespace: &str) -> StateResult<Vec<ScriptRecord>> {
        let prefix = format!("{namespace}/");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SCRIPTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.range(prefix.as_str()..).map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if !key.value().starts_with(&prefix) {
                break;
            }
            let script: ScriptRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(script);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_core::{BindingDescriptor, BindingSet};

    fn test_namespace(name: &str) -> NamespaceRecord {
        NamespaceRecord {
            name: name.to_string(),
            account_scope: "acct".to_string(),
            created_at: 1000,
        }
    }

    fn test_script(namespace: &str, name: &str, code: &str) -> ScriptRecord {
        ScriptRecord {
            namespace: namespace.to_string(),
            name: name.to_string(),
            entry_module: format!("{name}.mjs"),
            code_body: code.to_string(),
            bindings: BindingSet::new(vec![BindingDescriptor::PlainText {
                name: "MESSAGE".to_string(),
                text: "hi".to_string(),
            }])
            .unwrap(),
            modified_at: 1000,
        }
    }

    // ── Namespaces ─────────────────────────────────────────────────

    #[test]
    fn namespace_create_then_get() {
        let store = StateStore::open_in_memory().unwrap();
        let ns = test_namespace("prod");

        assert_eq!(store.create_namespace(&ns).unwrap(), CreateOutcome::Created);
        assert_eq!(store.get_namespace("prod").unwrap(), Some(ns));
    }

    #[test]
    fn namespace_create_is_idempotent() {
        let store = StateStore::open_in_memory().unwrap();
        let ns = test_namespace("prod");

        assert_eq!(store.create_namespace(&ns).unwrap(), CreateOutcome::Created);
        assert_eq!(
            store.create_namespace(&ns).unwrap(),
            CreateOutcome::AlreadyExists
        );
        assert_eq!(store.list_namespaces().unwrap().len(), 1);
    }

    #[test]
    fn namespace_get_nonexistent_returns_none() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.get_namespace("nope").unwrap().is_none());
    }

    // ── Scripts ────────────────────────────────────────────────────

    #[test]
    fn script_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let script = test_script("ns", "api", "v1");

        store.put_script(&script).unwrap();
        assert_eq!(store.get_script("ns", "api").unwrap(), Some(script));
    }

    #[test]
    fn script_put_replaces_code_and_bindings() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_script(&test_script("ns", "api", "v1")).unwrap();

        let mut replacement = test_script("ns", "api", "v2");
        replacement.bindings = BindingSet::empty();
        store.put_script(&replacement).unwrap();

        let stored = store.get_script("ns", "api").unwrap().unwrap();
        assert_eq!(stored.code_body, "v2");
        assert!(stored.bindings.is_empty());
    }

    #[test]
    fn scripts_listed_per_namespace() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_script(&test_script("ns1", "b", "x")).unwrap();
        store.put_script(&test_script("ns1", "a", "x")).unwrap();
        store.put_script(&test_script("ns2", "c", "x")).unwrap();

        let names: Vec<_> = store
            .list_scripts("ns1")
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(store.list_scripts("ns2").unwrap().len(), 1);
        assert!(store.list_scripts("ns").unwrap().is_empty());
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.create_namespace(&test_namespace("prod")).unwrap();
            store.put_script(&test_script("prod", "api", "v1")).unwrap();
            store.cache().put("k", "v", None).unwrap();
        }

        // Reopen the same database file.
        let store = StateStore::open(&db_path).unwrap();
        assert!(store.get_namespace("prod").unwrap().is_some());
        assert_eq!(
            store.get_script("prod", "api").unwrap().unwrap().code_body,
            "v1"
        );
        assert_eq!(store.cache().get("k").unwrap().as_deref(), Some("v"));
    }

    // ── Edge cases ─────────────────────────────────────────────────

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.list_namespaces().unwrap().is_empty());
        assert!(store.list_scripts("any").unwrap().is_empty());
        assert!(store.get_script("any", "thing").unwrap().is_none());
        assert!(store.messages().recent(10).unwrap().is_empty());
        assert!(store.blobs().get("nope").unwrap().is_none());
    }
}
