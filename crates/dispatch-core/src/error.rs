//! Error taxonomy shared by every DispatchGrid component.
//!
//! Crate-local errors (`StateError`, `ProvisioningError`, ...) convert
//! into [`GatewayError`] at their crate boundary. The gateway then maps
//! each variant onto an HTTP status and a `{ "error": <message> }` body,
//! so the `Display` output of every variant is the bare message.

use thiserror::Error;

/// Result type alias for gateway-level operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Malformed or missing input. Never reaches a store.
    #[error("{0}")]
    Validation(String),

    /// Mutating call while the gateway runs read-only.
    #[error("{0}")]
    AccessDenied(String),

    /// Unknown script, key, or object.
    #[error("{0}")]
    NotFound(String),

    /// A registry, store, log, or bucket call failed.
    #[error("{0}")]
    Upstream(String),
}

impl GatewayError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }

    /// HTTP-equivalent status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::Validation(_) => 400,
            GatewayError::AccessDenied(_) => 403,
            GatewayError::NotFound(_) => 404,
            GatewayError::Upstream(_) => 500,
        }
    }
}
