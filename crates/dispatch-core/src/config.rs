//! Gateway configuration.
//!
//! Built once at process start from environment variables and passed by
//! value into the registry and gateway. Nothing reads the environment
//! after startup.

use std::time::Duration;

use thiserror::Error;

use crate::access::AccessMode;
use crate::bindings::{BindingDescriptor, BindingError, BindingSet};

pub const DEFAULT_SCRIPT_NAME: &str = "pick-of-gods-chat-worker";
pub const DEFAULT_NAMESPACE: &str = "my-dispatch-namespace";
pub const DEFAULT_PROVISIONING_URL: &str = "https://api.cloudflare.com/client/v4";
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },

    #[error("invalid binding set: {0}")]
    Bindings(#[from] BindingError),
}

/// Fully resolved gateway settings.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_token: String,
    pub account_id: String,
    pub default_script: String,
    pub namespace: String,
    pub access: AccessMode,
    /// Human-readable banner, also bound into scripts as `MESSAGE`.
    pub message: String,
    pub kv_namespace_id: Option<String>,
    pub r2_bucket_name: Option<String>,
    pub d1_database_id: Option<String>,
    pub actor_class_name: Option<String>,
    pub provisioning_url: String,
    /// Base URL scripts are forwarded to. `None` disables forwarding.
    pub dispatch_url: Option<String>,
    pub upstream_timeout: Duration,
}

impl GatewayConfig {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let read_only = match get("READONLY") {
            Some(raw) => parse_bool(&raw).ok_or(ConfigError::Invalid {
                var: "READONLY",
                value: raw,
            })?,
            None => false,
        };

        let upstream_timeout = match get("UPSTREAM_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::Invalid {
                    var: "UPSTREAM_TIMEOUT_SECS",
                    value: raw,
                })?,
            None => Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
        };

        Ok(Self {
            api_token: required("CLOUDFLARE_API_TOKEN")?,
            account_id: required("CLOUDFLARE_ACCOUNT_ID")?,
            default_script: get("WORKER_SCRIPT_NAME")
                .unwrap_or_else(|| DEFAULT_SCRIPT_NAME.to_string()),
            namespace: get("DISPATCH_NAMESPACE").unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            access: AccessMode::from_flag(read_only),
            message: lookup("MESSAGE").unwrap_or_default(),
            kv_namespace_id: get("KV_NAMESPACE_ID"),
            r2_bucket_name: get("R2_BUCKET_NAME"),
            d1_database_id: get("D1_DATABASE_ID"),
            actor_class_name: get("DO_CLASS_NAME"),
            provisioning_url: get("PROVISIONING_API_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_PROVISIONING_URL.to_string()),
            dispatch_url: get("DISPATCH_URL").map(|u| u.trim_end_matches('/').to_string()),
            upstream_timeout,
        })
    }

    /// Minimal settings for tests and local runs.
    pub fn local(account_id: &str) -> Self {
        Self {
            api_token: "local".to_string(),
            account_id: account_id.to_string(),
            default_script: DEFAULT_SCRIPT_NAME.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            access: AccessMode::read_write(),
            message: String::new(),
            kv_namespace_id: None,
            r2_bucket_name: None,
            d1_database_id: None,
            actor_class_name: None,
            provisioning_url: DEFAULT_PROVISIONING_URL.to_string(),
            dispatch_url: None,
            upstream_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
        }
    }

    /// Bindings attached to every script published through the gateway.
    ///
    /// Resource bindings are included only when their identifier is
    /// configured; `MESSAGE` is always bound.
    pub fn default_bindings(&self) -> Result<BindingSet, ConfigError> {
        let mut bindings = Vec::new();
        if let Some(id) = &self.kv_namespace_id {
            bindings.push(BindingDescriptor::CacheNamespace {
                name: "KV".to_string(),
                namespace_id: id.clone(),
            });
        }
        if let Some(bucket) = &self.r2_bucket_name {
            bindings.push(BindingDescriptor::ObjectBucket {
                name: "R2_BUCKET".to_string(),
                bucket_name: bucket.clone(),
            });
        }
        if let Some(class) = &self.actor_class_name {
            bindings.push(BindingDescriptor::ActorClass {
                name: "MY_DO".to_string(),
                class_name: class.clone(),
                script_name: None,
            });
        }
        if let Some(id) = &self.d1_database_id {
            bindings.push(BindingDescriptor::RelationalDb {
                name: "DB".to_string(),
                id: id.clone(),
            });
        }
        bindings.push(BindingDescriptor::PlainText {
            name: "MESSAGE".to_string(),
            text: self.message.clone(),
        });
        Ok(BindingSet::new(bindings)?)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
