//! dispatch-core — shared types for the DispatchGrid gateway.
//!
//! Everything here is transport- and storage-agnostic: the binding
//! descriptor model attached to published scripts, the process-wide
//! access mode, the error taxonomy every component converts into, and
//! the explicit configuration struct built once at startup.

pub mod access;
pub mod bindings;
pub mod clock;
pub mod config;
pub mod error;

pub use access::AccessMode;
pub use bindings::{BindingDescriptor, BindingError, BindingSet};
pub use clock::{MonotonicClock, now_ms};
pub use config::{ConfigError, GatewayConfig};
pub use error::{GatewayError, GatewayResult};
