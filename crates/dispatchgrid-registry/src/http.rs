//! REST client for the platform's dispatch-namespace API.
//!
//! Wraps the namespace and script endpoints using [`reqwest`]. Responses
//! use the platform's `{success, errors, result}` envelope; a 404 maps
//! to "absent", a 409 or an "already exists" error on create maps to
//! [`CreateOutcome::AlreadyExists`]. Nothing is retried here.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, info};

use crate::provisioning::*;

/// Media type the platform expects for ES module entry points.
const MODULE_CONTENT_TYPE: &str = "application/javascript+module";

/// HTTP client for one account's dispatch namespaces.
pub struct HttpProvisioning {
    client: reqwest::Client,
    base_url: String,
    account_id: String,
    api_token: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct NamespaceResult {
    namespace_name: Option<String>,
}

impl HttpProvisioning {
    /// Create a client for the API rooted at `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        account_id: impl Into<String>,
        api_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProvisioningError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            account_id: account_id.into(),
            api_token: api_token.into(),
        })
    }

    fn namespaces_url(&self) -> String {
        format!(
            "{}/accounts/{}/workers/dispatch/namespaces",
            self.base_url, self.account_id
        )
    }

    fn namespace_url(&self, name: &str) -> String {
        format!("{}/{}", self.namespaces_url(), name)
    }

    fn script_url(&self, namespace: &str, name: &str) -> String {
        format!("{}/scripts/{}", self.namespace_url(namespace), name)
    }

    // ---- private helpers ----

    /// Read a failed response into an [`ProvisioningError::Api`], joining
    /// the envelope's error messages when the body decodes.
    async fn api_error(response: reqwest::Response) -> ProvisioningError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<Envelope<serde_json::Value>>(&body) {
            Ok(envelope) if !envelope.errors.is_empty() => envelope
                .errors
                .iter()
                .map(|e| format!("{} (code {})", e.message, e.code))
                .collect::<Vec<_>>()
                .join("; "),
            _ => body,
        };
        ProvisioningError::Api { status, message }
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<Option<T>, ProvisioningError> {
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| ProvisioningError::Decode(e.to_string()))?;
        Ok(envelope.result)
    }
}

fn is_already_exists(err: &ProvisioningError) -> bool {
    match err {
        ProvisioningError::Api { status, message } => {
            *status == StatusCode::CONFLICT.as_u16()
                || message.to_ascii_lowercase().contains("already exists")
        }
        _ => false,
    }
}

#[async_trait]
impl ProvisioningApi for HttpProvisioning {
    async fn get_namespace(
        &self,
        name: &str,
    ) -> Result<Option<NamespaceRecord>, ProvisioningError> {
        let response = self
            .client
            .get(self.namespace_url(name))
            .bearer_auth(&self.api_token)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(namespace = name, "namespace absent");
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let result: Option<NamespaceResult> = Self::decode(response).await?;
        Ok(Some(NamespaceRecord {
            name: result
                .and_then(|r| r.namespace_name)
                .unwrap_or_else(|| name.to_string()),
            account_scope: self.account_id.clone(),
            created_at: 0,
        }))
    }

    async fn create_namespace(&self, name: &str) -> Result<CreateOutcome, ProvisioningError> {
        let response = self
            .client
            .post(self.namespaces_url())
            .bearer_auth(&self.api_token)
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await?;

        if response.status().is_success() {
            info!(namespace = name, account = %self.account_id, "namespace created");
            return Ok(CreateOutcome::Created);
        }

        let err = Self::api_error(response).await;
        if is_already_exists(&err) {
            debug!(namespace = name, "namespace already exists");
            Ok(CreateOutcome::AlreadyExists)
        } else {
            Err(err)
        }
    }

    async fn get_script(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<PublishedScript>, ProvisioningError> {
        let response = self
            .client
            .get(self.script_url(namespace, name))
            .bearer_auth(&self.api_token)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        Ok(Some(PublishedScript {
            namespace: namespace.to_string(),
            name: name.to_string(),
            entry_module: None,
            modified_at: None,
        }))
    }

    async fn upload_script(
        &self,
        upload: &ScriptUpload,
    ) -> Result<PublishedScript, ProvisioningError> {
        let metadata = serde_json::json!({
            "main_module": upload.entry_module,
            "bindings": upload.bindings,
        });
        let metadata_part = Part::text(metadata.to_string()).mime_str("application/json")?;
        let module_part = Part::text(upload.code_body.clone())
            .file_name(upload.entry_module.clone())
            .mime_str(MODULE_CONTENT_TYPE)?;
        let form = Form::new()
            .part("metadata", metadata_part)
            .part(upload.entry_module.clone(), module_part);

        let response = self
            .client
            .put(self.script_url(&upload.namespace, &upload.name))
            .bearer_auth(&self.api_token)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        Ok(PublishedScript {
            namespace: upload.namespace.clone(),
            name: upload.name.clone(),
            entry_module: Some(upload.entry_module.clone()),
            modified_at: None,
        })
    }
}
