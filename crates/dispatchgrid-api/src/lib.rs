//! dispatchgrid-api — the Dispatch Gateway.
//!
//! One axum router classifies every request by its first path segment:
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/` | Management page |
//! | GET | `/status` | Access mode and configuration summary |
//! | POST | `/deploy` | Publish `{scriptName, code}` into the namespace |
//! | GET/POST/DELETE | `/kv` | Cache namespace passthrough |
//! | GET/POST/DELETE | `/r2` | Blob bucket passthrough |
//! | GET/POST | `/chat` | Recent chat messages / record a message |
//! | GET/POST/DELETE | `/actor/{id}` | Per-actor record storage |
//! | GET | `/test` | Store smoke test |
//! | any | `/{script}/...` | Forward to a published script |
//!
//! Mutations answer 403 `{"error": "Read-only mode enabled"}` when the
//! gateway runs read-only. Every error body is `{"error": <message>}`.

pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod page;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use dispatch_core::{GatewayConfig, MonotonicClock};
use dispatchgrid_chat::ChatWriter;
use dispatchgrid_registry::{ProvisioningApi, ScriptRegistry};
use dispatchgrid_state::StateStore;
use tower_http::trace::TraceLayer;

pub use dispatch::{DispatchTarget, HttpDispatcher, RESERVED_SEGMENTS, ScriptDispatcher};
pub use error::{ApiError, ApiResult};

/// Shared state for gateway handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<GatewayConfig>,
    pub store: StateStore,
    pub registry: ScriptRegistry,
    pub chat: ChatWriter,
    /// Source of actor record keys; readings never repeat.
    pub clock: Arc<MonotonicClock>,
    /// `None` disables forwarding; every script route then answers 404.
    pub dispatcher: Option<Arc<dyn ScriptDispatcher>>,
}

impl GatewayState {
    pub fn new(
        config: GatewayConfig,
        store: StateStore,
        provider: Arc<dyn ProvisioningApi>,
        dispatcher: Option<Arc<dyn ScriptDispatcher>>,
    ) -> Self {
        let access = config.access;
        Self {
            registry: ScriptRegistry::new(provider, access),
            chat: ChatWriter::new(&store, access),
            clock: Arc::new(MonotonicClock::new()),
            config: Arc::new(config),
            store,
            dispatcher,
        }
    }
}

/// Build the complete gateway router.
pub fn build_router(state: GatewayState) -> Router {
    let nope = error::method_not_allowed;

    Router::new()
        .route("/", get(page::management_page).fallback(nope))
        .route("/status", get(handlers::status).fallback(nope))
        .route("/deploy", post(handlers::deploy).fallback(nope))
        .route(
            "/kv",
            get(handlers::kv_get)
                .post(handlers::kv_put)
                .delete(handlers::kv_delete)
                .fallback(nope),
        )
        .route(
            "/r2",
            get(handlers::r2_get)
                .post(handlers::r2_put)
                .delete(handlers::r2_delete)
                .fallback(nope),
        )
        .route(
            "/chat",
            get(handlers::chat_recent)
                .post(handlers::chat_post)
                .fallback(nope),
        )
        .route(
            "/actor/{id}",
            get(handlers::actor_list)
                .post(handlers::actor_store)
                .delete(handlers::actor_delete)
                .fallback(nope),
        )
        .route("/test", get(handlers::smoke_test).fallback(nope))
        .fallback(dispatch::dispatch_script)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
