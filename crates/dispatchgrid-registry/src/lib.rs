//! dispatchgrid-registry — the script registry.
//!
//! Manages named deployment namespaces and the scripts published in them
//! through a pluggable [`ProvisioningApi`]:
//!
//! - [`LocalProvisioning`] keeps the registry in the local redb store
//! - [`HttpProvisioning`] talks to the platform's REST API
//!
//! [`ScriptRegistry`] layers validation, the access-mode gate, and
//! get-or-create namespace provisioning on top of either provider.

pub mod http;
pub mod local;
pub mod provisioning;
pub mod registry;

pub use http::HttpProvisioning;
pub use local::LocalProvisioning;
pub use provisioning::{
    CreateOutcome, NamespaceRecord, ProvisioningApi, ProvisioningError, PublishedScript,
    ScriptUpload,
};
pub use registry::{Published, ScriptRegistry, validate_script_name};
