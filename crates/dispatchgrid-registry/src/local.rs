//! Local provisioning provider backed by the redb state store.
//!
//! Used for single-node runs and tests. Scripts are stored in full so a
//! local dispatcher can read back the exact code that was published.

use async_trait::async_trait;
use dispatch_core::now_ms;
use dispatchgrid_state::{ScriptRecord, StateStore};
use tracing::info;

use crate::provisioning::*;

pub struct LocalProvisioning {
    store: StateStore,
    account_id: String,
}

impl LocalProvisioning {
    pub fn new(store: StateStore, account_id: impl Into<String>) -> Self {
        Self {
            store,
            account_id: account_id.into(),
        }
    }
}

fn summary(record: &ScriptRecord) -> PublishedScript {
    PublishedScript {
        namespace: record.namespace.clone(),
        name: record.name.clone(),
        entry_module: Some(record.entry_module.clone()),
        modified_at: Some(record.modified_at),
    }
}

#[async_trait]
impl ProvisioningApi for LocalProvisioning {
    async fn get_namespace(
        &self,
        name: &str,
    ) -> Result<Option<NamespaceRecord>, ProvisioningError> {
        Ok(self.store.get_namespace(name)?)
    }

    async fn create_namespace(&self, name: &str) -> Result<CreateOutcome, ProvisioningError> {
        let record = NamespaceRecord {
            name: name.to_string(),
            account_scope: self.account_id.clone(),
            created_at: now_ms(),
        };
        let outcome = self.store.create_namespace(&record)?;
        if outcome == CreateOutcome::Created {
            info!(namespace = name, account = %self.account_id, "namespace created");
        }
        Ok(outcome)
    }

    async fn get_script(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<PublishedScript>, ProvisioningError> {
        Ok(self.store.get_script(namespace, name)?.as_ref().map(summary))
    }

    async fn upload_script(
        &self,
        upload: &ScriptUpload,
    ) -> Result<PublishedScript, ProvisioningError> {
        let record = ScriptRecord {
            namespace: upload.namespace.clone(),
            name: upload.name.clone(),
            entry_module: upload.entry_module.clone(),
            code_body: upload.code_body.clone(),
            bindings: upload.bindings.clone(),
            modified_at: now_ms(),
        };
        self.store.put_script(&record)?;
        Ok(summary(&record))
    }
}
