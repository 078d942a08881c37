//! The Registry Provisioning API seam.
//!
//! [`ProvisioningApi`] is the narrow interface to whatever platform hosts
//! published scripts. Lookups return `Option` for "absent" instead of an
//! error, and namespace creation reports [`CreateOutcome::AlreadyExists`]
//! instead of failing, so callers never branch on error kinds.

use async_trait::async_trait;
use dispatch_core::{BindingSet, GatewayError};
use dispatchgrid_state::StateError;
use serde::Serialize;
use thiserror::Error;

pub use dispatchgrid_state::{CreateOutcome, NamespaceRecord};

/// Errors from a provisioning provider.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("provisioning request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The platform returned a non-2xx status code.
    #[error("provisioning API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The platform answered with something we could not decode.
    #[error("unexpected provisioning response: {0}")]
    Decode(String),

    /// The local registry store failed.
    #[error(transparent)]
    State(#[from] StateError),
}

impl From<ProvisioningError> for GatewayError {
    fn from(err: ProvisioningError) -> Self {
        GatewayError::Upstream(err.to_string())
    }
}

/// Everything needed to create or replace one script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptUpload {
    pub namespace: String,
    pub name: String,
    /// File name of the entry module, e.g. `foo.mjs`.
    pub entry_module: String,
    pub code_body: String,
    pub bindings: BindingSet,
}

/// What the platform reports about a published script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedScript {
    pub namespace: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_module: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<u64>,
}

/// Platform operations the registry depends on.
#[async_trait]
pub trait ProvisioningApi: Send + Sync {
    /// Fetch a namespace; `None` when it does not exist.
    async fn get_namespace(&self, name: &str)
    -> Result<Option<NamespaceRecord>, ProvisioningError>;

    /// Create a namespace. An existing namespace is reported, not failed.
    async fn create_namespace(&self, name: &str) -> Result<CreateOutcome, ProvisioningError>;

    /// Fetch a script's summary; `None` when it does not exist.
    async fn get_script(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<PublishedScript>, ProvisioningError>;

    /// Create or fully replace a script's code and bindings in one call.
    async fn upload_script(
        &self,
        upload: &ScriptUpload,
    ) -> Result<PublishedScript, ProvisioningError>;
}
