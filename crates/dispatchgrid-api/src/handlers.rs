//! Gateway route handlers.
//!
//! Mutating handlers check the access mode before reading the body, so a
//! read-only gateway answers 403 even for malformed requests. Bodies are
//! taken as raw bytes and decoded here to keep that ordering.

use std::collections::BTreeMap;
use std::time::Duration;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{FromRequest, Multipart, Path, Query, Request, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use dispatch_core::{GatewayError, now_ms};
use dispatchgrid_chat::{DEFAULT_RECENT_LIMIT, RecentChat, Recorded};
use dispatchgrid_registry::Published;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::GatewayState;
use crate::dispatch::is_reserved;
use crate::error::ApiResult;

/// Default page size for `GET /kv?prefix=`.
const KV_LIST_LIMIT: usize = 100;

fn parse_json<T: DeserializeOwned>(body: &Bytes) -> ApiResult<T> {
    serde_json::from_slice(body)
        .map_err(|e| GatewayError::validation(format!("Invalid JSON body: {e}")).into())
}

fn require_key(key: Option<String>) -> ApiResult<String> {
    key.filter(|k| !k.is_empty())
        .ok_or_else(|| GatewayError::validation("Missing key").into())
}

// ── Status ─────────────────────────────────────────────────────

/// GET /status
pub async fn status(State(state): State<GatewayState>) -> Json<Value> {
    let config = &state.config;
    Json(json!({
        "readOnly": config.access.is_read_only(),
        "message": config.message,
        "namespace": config.namespace,
        "defaultScript": config.default_script,
    }))
}

// ── Publish ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    pub script_name: Option<String>,
    pub code: Option<String>,
    pub code_body: Option<String>,
}

/// POST /deploy
pub async fn deploy(State(state): State<GatewayState>, body: Bytes) -> ApiResult<Json<Published>> {
    state.config.access.ensure_writable()?;

    let req: DeployRequest = parse_json(&body)?;
    let script_name = req.script_name.filter(|s| !s.is_empty());
    let code = req.code.or(req.code_body).filter(|c| !c.is_empty());
    let (Some(script_name), Some(code)) = (script_name, code) else {
        return Err(GatewayError::validation("Missing scriptName or code").into());
    };
    if is_reserved(&script_name) {
        return Err(GatewayError::validation(format!(
            "scriptName {script_name:?} is reserved"
        ))
        .into());
    }

    let bindings = state
        .config
        .default_bindings()
        .map_err(|e| GatewayError::upstream(e.to_string()))?;
    let published = state
        .registry
        .publish(&state.config.namespace, &script_name, &code, bindings)
        .await?;

    let marker = json!({ "namespace": published.namespace, "deployedAt": now_ms() });
    if let Err(e) = state
        .store
        .cache()
        .put(&format!("worker:{script_name}"), &marker.to_string(), None)
    {
        warn!(script = %script_name, error = %e, "deploy marker write failed");
    }

    Ok(Json(published))
}

// ── Cache passthrough ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct KvQuery {
    pub key: Option<String>,
    pub prefix: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct KvPut {
    pub key: String,
    pub value: String,
    /// Expiry in seconds.
    pub ttl: Option<u64>,
}

/// GET /kv?key= | GET /kv?prefix=
pub async fn kv_get(State(state): State<GatewayState>, Query(q): Query<KvQuery>) -> ApiResult<Json<Value>> {
    let cache = state.store.cache();
    if let Some(key) = q.key.filter(|k| !k.is_empty()) {
        let value = cache
            .get(&key)?
            .ok_or_else(|| GatewayError::not_found(format!("Key not found: {key}")))?;
        return Ok(Json(json!({ "key": key, "value": value })));
    }
    if let Some(prefix) = q.prefix {
        let entries: Vec<Value> = cache
            .list(Some(&prefix), q.limit.unwrap_or(KV_LIST_LIMIT))?
            .into_iter()
            .map(|(key, value)| json!({ "key": key, "value": value }))
            .collect();
        return Ok(Json(json!({ "entries": entries })));
    }
    Err(GatewayError::validation("Missing key or prefix").into())
}

/// POST /kv
pub async fn kv_put(State(state): State<GatewayState>, body: Bytes) -> ApiResult<Json<Value>> {
    state.config.access.ensure_writable()?;
    let req: KvPut = parse_json(&body)?;
    let key = require_key(Some(req.key))?;
    state
        .store
        .cache()
        .put(&key, &req.value, req.ttl.map(Duration::from_secs))?;
    debug!(%key, "cache entry written");
    Ok(Json(json!({ "key": key, "stored": true })))
}

/// DELETE /kv?key=
pub async fn kv_delete(State(state): State<GatewayState>, Query(q): Query<KvQuery>) -> ApiResult<Json<Value>> {
    state.config.access.ensure_writable()?;
    let key = require_key(q.key)?;
    let deleted = state.store.cache().delete(&key)?;
    Ok(Json(json!({ "key": key, "deleted": deleted })))
}

// ── Blob passthrough ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct BlobQuery {
    pub key: Option<String>,
    pub prefix: Option<String>,
}

/// GET /r2?key= | GET /r2?prefix=
pub async fn r2_get(State(state): State<GatewayState>, Query(q): Query<BlobQuery>) -> ApiResult<Response> {
    let bucket = state.store.blobs();
    if let Some(key) = q.key.filter(|k| !k.is_empty()) {
        let object = bucket
            .get(&key)?
            .ok_or_else(|| GatewayError::not_found(format!("Object not found: {key}")))?;
        let content_type = object
            .meta
            .content_type
            .unwrap_or_else(|| "application/octet-stream".to_string());
        return Ok(([(header::CONTENT_TYPE, content_type)], object.body).into_response());
    }
    if let Some(prefix) = q.prefix {
        let objects = bucket.list(Some(&prefix))?;
        return Ok(Json(json!({ "objects": objects })).into_response());
    }
    Err(GatewayError::validation("Missing key").into())
}

/// POST /r2 (multipart, field `file`)
pub async fn r2_put(
    State(state): State<GatewayState>,
    Query(q): Query<BlobQuery>,
    request: Request,
) -> ApiResult<Json<Value>> {
    state.config.access.ensure_writable()?;

    let mut multipart = Multipart::from_request(request, &state)
        .await
        .map_err(|e| GatewayError::validation(format!("Expected multipart body: {e}")))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| GatewayError::validation(format!("Malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| GatewayError::validation(format!("Failed to read file: {e}")))?;

        let key = require_key(q.key.or(file_name))?;
        let meta = state
            .store
            .blobs()
            .put(&key, &data, content_type.as_deref())?;
        info!(%key, size = meta.size, "object uploaded");
        return Ok(Json(json!({ "success": true, "object": meta })));
    }

    Err(GatewayError::validation("Missing file field").into())
}

/// DELETE /r2?key=
pub async fn r2_delete(State(state): State<GatewayState>, Query(q): Query<BlobQuery>) -> ApiResult<Json<Value>> {
    state.config.access.ensure_writable()?;
    let key = require_key(q.key)?;
    let deleted = state.store.blobs().delete(&key)?;
    Ok(Json(json!({ "key": key, "deleted": deleted })))
}

// ── Chat ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ChatPost {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub message: String,
}

/// GET /chat?limit=
pub async fn chat_recent(
    State(state): State<GatewayState>,
    Query(q): Query<ChatQuery>,
) -> ApiResult<Json<RecentChat>> {
    Ok(Json(state.chat.recent(q.limit.unwrap_or(DEFAULT_RECENT_LIMIT))?))
}

/// POST /chat
pub async fn chat_post(State(state): State<GatewayState>, body: Bytes) -> ApiResult<Json<Recorded>> {
    state.config.access.ensure_writable()?;
    let req: ChatPost = parse_json(&body)?;
    Ok(Json(state.chat.record(&req.user, &req.message)?))
}

// ── Record actor ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ActorQuery {
    pub key: Option<String>,
    pub prefix: Option<String>,
}

/// GET /actor/{id}
pub async fn actor_list(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Query(q): Query<ActorQuery>,
) -> ApiResult<Json<BTreeMap<String, Value>>> {
    let records = state.store.actor(&id)?.list(q.prefix.as_deref())?;
    Ok(Json(records.into_iter().map(|r| (r.key, r.value)).collect()))
}

/// POST /actor/{id}
///
/// Stores the JSON body under a fresh millisecond timestamp key. Keys
/// never repeat within one process, even for requests in the same
/// millisecond.
pub async fn actor_store(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    state.config.access.ensure_writable()?;
    let data: Value = parse_json(&body)?;
    let key = state.clock.now_ms().to_string();
    state.store.actor(&id)?.put(&key, &data)?;
    Ok(Json(json!({ "success": true, "key": key, "stored": data })))
}

/// DELETE /actor/{id}?key=
pub async fn actor_delete(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Query(q): Query<ActorQuery>,
) -> ApiResult<Json<Value>> {
    state.config.access.ensure_writable()?;
    let key = require_key(q.key)?;
    let deleted = state.store.actor(&id)?.delete(&key)?;
    Ok(Json(json!({ "key": key, "deleted": deleted })))
}

// ── Smoke test ─────────────────────────────────────────────────

/// GET /test
///
/// Exercises every store once and reports what came back.
pub async fn smoke_test(State(state): State<GatewayState>) -> ApiResult<Json<Value>> {
    state.config.access.ensure_writable()?;

    let cache = state.store.cache();
    cache.put("KEY", "VALUE", None)?;
    let kv_value = cache.get("KEY")?;
    let kv_list: Vec<String> = cache
        .list(None, KV_LIST_LIMIT)?
        .into_iter()
        .map(|(key, _)| key)
        .collect();
    cache.delete("KEY")?;

    let bucket = state.store.blobs();
    bucket.put("example.txt", b"DispatchGrid blob content", Some("text/plain"))?;
    let r2_value = bucket.get("example.txt")?.map(|o| o.text());

    let actor = state.store.actor("example")?;
    actor.put(&state.clock.now_ms().to_string(), &json!({ "smoke": true }))?;
    let actor_records = actor.list(None)?.len();

    Ok(Json(json!({
        "kvValue": kv_value,
        "kvList": kv_list,
        "r2Value": r2_value,
        "actorRecords": actor_records,
    })))
}
