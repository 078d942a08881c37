//! Binding descriptors attached to published scripts.
//!
//! A binding grants a running script a handle to one external resource
//! under a name. The serialized form matches the platform's upload
//! metadata (`{"type": "kv_namespace", "name": ..., "namespace_id": ...}`).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One resource a script may reference at run time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BindingDescriptor {
    /// Literal string exposed as an environment value.
    PlainText { name: String, text: String },

    /// Key/value cache namespace.
    #[serde(rename = "kv_namespace")]
    CacheNamespace { name: String, namespace_id: String },

    /// Object (blob) bucket.
    #[serde(rename = "r2_bucket")]
    ObjectBucket { name: String, bucket_name: String },

    /// Stateful actor class, optionally hosted by another script.
    #[serde(rename = "durable_object_namespace")]
    ActorClass {
        name: String,
        class_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        script_name: Option<String>,
    },

    /// Relational database.
    #[serde(rename = "d1")]
    RelationalDb { name: String, id: String },

    /// Additional code module uploaded alongside the entry point.
    #[serde(rename = "wasm_module")]
    CodeModule { name: String, part: String },
}

impl BindingDescriptor {
    /// Name under which the running script sees this resource.
    pub fn name(&self) -> &str {
        match self {
            BindingDescriptor::PlainText { name, .. }
            | BindingDescriptor::CacheNamespace { name, .. }
            | BindingDescriptor::ObjectBucket { name, .. }
            | BindingDescriptor::ActorClass { name, .. }
            | BindingDescriptor::RelationalDb { name, .. }
            | BindingDescriptor::CodeModule { name, .. } => name,
        }
    }

    /// Wire tag of this variant.
    pub fn kind(&self) -> &'static str {
        match self {
            BindingDescriptor::PlainText { .. } => "plain_text",
            BindingDescriptor::CacheNamespace { .. } => "kv_namespace",
            BindingDescriptor::ObjectBucket { .. } => "r2_bucket",
            BindingDescriptor::ActorClass { .. } => "durable_object_namespace",
            BindingDescriptor::RelationalDb { .. } => "d1",
            BindingDescriptor::CodeModule { .. } => "wasm_module",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BindingError {
    #[error("binding name must not be empty")]
    EmptyName,

    #[error("duplicate binding name: {0}")]
    DuplicateName(String),
}

/// Ordered list of bindings with unique, non-empty names.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<BindingDescriptor>", into = "Vec<BindingDescriptor>")]
pub struct BindingSet(Vec<BindingDescriptor>);

impl BindingSet {
    pub fn new(bindings: Vec<BindingDescriptor>) -> Result<Self, BindingError> {
        let mut seen = HashSet::new();
        for binding in &bindings {
            let name = binding.name();
            if name.is_empty() {
                return Err(BindingError::EmptyName);
            }
            if !seen.insert(name) {
                return Err(BindingError::DuplicateName(name.to_string()));
            }
        }
        Ok(Self(bindings))
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn get(&self, name: &str) -> Option<&BindingDescriptor> {
        self.0.iter().find(|b| b.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BindingDescriptor> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<Vec<BindingDescriptor>> for BindingSet {
    type Error = BindingError;

    fn try_from(bindings: Vec<BindingDescriptor>) -> Result<Self, Self::Error> {
        Self::new(bindings)
    }
}

impl From<BindingSet> for Vec<BindingDescriptor> {
    fn from(set: BindingSet) -> Self {
        set.0
    }
}
