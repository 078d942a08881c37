//! dispatchgrid-state — embedded durable storage for DispatchGrid.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for everything the gateway keeps locally:
//!
//! - [`ActorStore`]: strongly consistent per-actor key/value records
//! - [`CacheStore`]: the cache namespace, with optional per-entry expiry
//! - [`MessageLog`]: the append-only chat log
//! - [`BlobBucket`]: object storage for uploads and chat log copies
//! - registry tables backing the local provisioning provider
//!
//! All handles are cheap clones of one `Arc<Database>` and are
//! `Send + Sync`. Every operation runs in its own redb transaction, so a
//! write is visible to the next read on any handle.

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| $crate::error::StateError::$variant(e.to_string())
    };
}

pub mod actor;
pub mod blobs;
pub mod cache;
pub mod error;
pub mod messages;
pub mod store;
pub mod tables;
pub mod types;

pub use actor::ActorStore;
pub use blobs::BlobBucket;
pub use cache::CacheStore;
pub use error::{StateError, StateResult};
pub use messages::MessageLog;
pub use store::StateStore;
pub use types::*;
