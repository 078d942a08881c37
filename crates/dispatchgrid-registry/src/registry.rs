//! Script registry — get-or-create namespaces and idempotent script upsert.

use std::sync::Arc;

use dispatch_core::{AccessMode, BindingSet, GatewayError, GatewayResult};
use serde::Serialize;
use tracing::{debug, info};

use crate::provisioning::*;

/// Longest script name the platform accepts.
pub const MAX_SCRIPT_NAME_LEN: usize = 63;

/// Result of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Published {
    pub namespace: String,
    pub script: String,
}

/// Publishes scripts through a [`ProvisioningApi`].
///
/// Holds no locks: concurrent publishes into a brand-new namespace may
/// both try to create it, and the provider's `AlreadyExists` outcome makes
/// that harmless.
#[derive(Clone)]
pub struct ScriptRegistry {
    provider: Arc<dyn ProvisioningApi>,
    access: AccessMode,
}

impl ScriptRegistry {
    pub fn new(provider: Arc<dyn ProvisioningApi>, access: AccessMode) -> Self {
        Self { provider, access }
    }

    /// Make sure `name` exists, creating it if the lookup finds nothing.
    pub async fn ensure_namespace(&self, name: &str) -> GatewayResult<()> {
        if name.is_empty() {
            return Err(GatewayError::validation("namespace must not be empty"));
        }
        self.access.ensure_writable()?;

        if self.provider.get_namespace(name).await?.is_some() {
            debug!(namespace = name, "namespace exists");
            return Ok(());
        }

        match self.provider.create_namespace(name).await? {
            CreateOutcome::Created => info!(namespace = name, "namespace provisioned"),
            CreateOutcome::AlreadyExists => {
                debug!(namespace = name, "namespace created concurrently")
            }
        }
        Ok(())
    }

    /// Create or fully replace `script_name` in `namespace`.
    ///
    /// All validation happens before any provider call. Code and bindings
    /// go out in a single upload; if that call fails the previous version
    /// may or may not still be live, and the caller should retry the whole
    /// publish.
    pub async fn publish(
        &self,
        namespace: &str,
        script_name: &str,
        code_body: &str,
        bindings: BindingSet,
    ) -> GatewayResult<Published> {
        self.access.ensure_writable()?;
        if namespace.is_empty() {
            return Err(GatewayError::validation("namespace must not be empty"));
        }
        validate_script_name(script_name)?;
        if code_body.is_empty() {
            return Err(GatewayError::validation("code must not be empty"));
        }

        self.ensure_namespace(namespace).await?;

        let upload = ScriptUpload {
            namespace: namespace.to_string(),
            name: script_name.to_string(),
            entry_module: format!("{script_name}.mjs"),
            code_body: code_body.to_string(),
            bindings,
        };
        self.provider.upload_script(&upload).await?;

        info!(
            namespace,
            script = script_name,
            bindings = upload.bindings.len(),
            "script published"
        );
        Ok(Published {
            namespace: namespace.to_string(),
            script: script_name.to_string(),
        })
    }

    /// Summary of a published script, if it exists.
    pub async fn lookup_script(
        &self,
        namespace: &str,
        name: &str,
    ) -> GatewayResult<Option<PublishedScript>> {
        Ok(self.provider.get_script(namespace, name).await?)
    }
}

/// Script names are 1–63 characters of `[a-z0-9_-]`.
pub fn validate_script_name(name: &str) -> GatewayResult<()> {
    if name.is_empty() {
        return Err(GatewayError::validation("scriptName must not be empty"));
    }
    if name.len() > MAX_SCRIPT_NAME_LEN {
        return Err(GatewayError::validation(format!(
            "scriptName must be at most {MAX_SCRIPT_NAME_LEN} characters"
        )));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
    {
        return Err(GatewayError::validation(
            "scriptName may only contain lowercase letters, digits, '-' and '_'",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use dispatch_core::BindingDescriptor;
    use dispatchgrid_state::StateStore;

    use crate::local::LocalProvisioning;

    fn local() -> (ScriptRegistry, StateStore) {
        let store = StateStore::open_in_memory().unwrap();
        let provider = Arc::new(LocalProvisioning::new(store.clone(), "acct"));
        (ScriptRegistry::new(provider, AccessMode::read_write()), store)
    }

    fn bindings(text: &str) -> BindingSet {
        BindingSet::new(vec![BindingDescriptor::PlainText {
            name: "MESSAGE".to_string(),
            text: text.to_string(),
        }])
        .unwrap()
    }

    /// Provider that counts calls and fails every one of them.
    #[derive(Default)]
    struct Unreachable {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProvisioningApi for Unreachable {
        async fn get_namespace(
            &self,
            _: &str,
        ) -> Result<Option<NamespaceRecord>, ProvisioningError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ProvisioningError::Api { status: 500, message: "boom".into() })
        }
        async fn create_namespace(&self, _: &str) -> Result<CreateOutcome, ProvisioningError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ProvisioningError::Api { status: 500, message: "boom".into() })
        }
        async fn get_script(
            &self,
            _: &str,
            _: &str,
        ) -> Result<Option<PublishedScript>, ProvisioningError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ProvisioningError::Api { status: 500, message: "boom".into() })
        }
        async fn upload_script(
            &self,
            _: &ScriptUpload,
        ) -> Result<PublishedScript, ProvisioningError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ProvisioningError::Api { status: 500, message: "boom".into() })
        }
    }

    #[tokio::test]
    async fn ensure_namespace_twice_leaves_one() {
        let (registry, store) = local();
        registry.ensure_namespace("ns").await.unwrap();
        registry.ensure_namespace("ns").await.unwrap();

        let all = store.list_namespaces().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "ns");
        assert_eq!(all[0].account_scope, "acct");
    }

    #[tokio::test]
    async fn concurrent_ensure_namespace_is_safe() {
        let (registry, store) = local();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.ensure_namespace("fresh").await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.list_namespaces().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn publish_twice_replaces() {
        let (registry, store) = local();
        registry
            .publish("ns", "foo", "v1", bindings("one"))
            .await
            .unwrap();
        let published = registry
            .publish("ns", "foo", "v2", BindingSet::empty())
            .await
            .unwrap();
        assert_eq!(
            published,
            Published { namespace: "ns".into(), script: "foo".into() }
        );

        let stored = store.get_script("ns", "foo").unwrap().unwrap();
        assert_eq!(stored.code_body, "v2");
        assert_eq!(stored.entry_module, "foo.mjs");
        assert!(stored.bindings.is_empty());
    }

    #[tokio::test]
    async fn lookup_reports_published_scripts() {
        let (registry, _) = local();
        assert!(registry.lookup_script("ns", "foo").await.unwrap().is_none());

        registry.publish("ns", "foo", "v1", bindings("x")).await.unwrap();
        let found = registry.lookup_script("ns", "foo").await.unwrap().unwrap();
        assert_eq!(found.entry_module.as_deref(), Some("foo.mjs"));
    }

    #[tokio::test]
    async fn validation_happens_before_any_provider_call() {
        let provider = Arc::new(Unreachable::default());
        let registry = ScriptRegistry::new(provider.clone(), AccessMode::read_write());

        for (ns, name, code) in [("", "foo", "x"), ("ns", "", "x"), ("ns", "foo", ""), ("ns", "Foo!", "x")] {
            let err = registry.publish(ns, name, code, BindingSet::empty()).await.unwrap_err();
            assert!(matches!(err, GatewayError::Validation(_)), "{ns}/{name}: {err:?}");
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn read_only_rejects_before_provider_call() {
        let provider = Arc::new(Unreachable::default());
        let registry = ScriptRegistry::new(provider.clone(), AccessMode::read_only());

        let err = registry
            .publish("ns", "foo", "code", BindingSet::empty())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::AccessDenied(_)));
        assert!(matches!(
            registry.ensure_namespace("ns").await.unwrap_err(),
            GatewayError::AccessDenied(_)
        ));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn provider_failure_is_upstream() {
        let registry = ScriptRegistry::new(Arc::new(Unreachable::default()), AccessMode::read_write());
        let err = registry
            .publish("ns", "foo", "code", BindingSet::empty())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Upstream(ref m) if m.contains("boom")));
    }

    #[test]
    fn script_name_rules() {
        assert!(validate_script_name("pick-of-gods-chat-worker").is_ok());
        assert!(validate_script_name("a_1").is_ok());
        assert!(validate_script_name(&"a".repeat(63)).is_ok());
        assert!(validate_script_name(&"a".repeat(64)).is_err());
        assert!(validate_script_name("has space").is_err());
        assert!(validate_script_name("UPPER").is_err());
    }
}
