//! Forwarding requests to published scripts.
//!
//! Any first path segment that is not reserved names a script. The
//! gateway confirms the script is published, then hands the request to a
//! [`ScriptDispatcher`] and returns whatever the script answered.

use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::response::Response;
use bytes::Bytes;
use dispatch_core::{GatewayError, GatewayResult};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{StatusCode, Uri};
use http_body_util::Full;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, warn};

use crate::GatewayState;
use crate::error::{ApiError, ApiResult};

/// First path segments handled by the gateway itself.
pub const RESERVED_SEGMENTS: &[&str] = &["deploy", "kv", "r2", "chat", "actor", "test", "status"];

/// Largest request body forwarded to a script.
pub const MAX_FORWARD_BODY: usize = 8 * 1024 * 1024;

/// Header carrying the namespace of the target script.
pub const NAMESPACE_HEADER: &str = "x-dispatch-namespace";

static HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    header::HOST,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

pub fn is_reserved(segment: &str) -> bool {
    RESERVED_SEGMENTS.contains(&segment)
}

/// Where a forwarded request is going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchTarget {
    pub namespace: String,
    pub script: String,
    /// Remainder of the path after the script segment, `""` or `/...`.
    pub rest: String,
    pub query: Option<String>,
}

impl DispatchTarget {
    /// Split `/script/rest?query` into a target. `None` for the root path.
    pub fn from_uri(namespace: &str, uri: &Uri) -> Option<Self> {
        let path = uri.path().trim_start_matches('/');
        let (script, rest) = match path.find('/') {
            Some(idx) => (&path[..idx], &path[idx..]),
            None => (path, ""),
        };
        if script.is_empty() {
            return None;
        }
        Some(Self {
            namespace: namespace.to_string(),
            script: script.to_string(),
            rest: rest.to_string(),
            query: uri.query().map(str::to_string),
        })
    }
}

/// Delivers a request to a published script.
#[async_trait]
pub trait ScriptDispatcher: Send + Sync {
    async fn dispatch(&self, target: &DispatchTarget, request: Request) -> GatewayResult<Response>;
}

/// Forwards over HTTP/1.1 to `{base_url}/{script}{rest}?{query}`.
pub struct HttpDispatcher {
    base_url: String,
    timeout: Duration,
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HttpDispatcher {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }

    fn target_uri(&self, target: &DispatchTarget) -> GatewayResult<Uri> {
        let mut uri = format!("{}/{}{}", self.base_url, target.script, target.rest);
        if let Some(query) = &target.query {
            uri.push('?');
            uri.push_str(query);
        }
        uri.parse()
            .map_err(|e| GatewayError::upstream(format!("invalid dispatch uri {uri}: {e}")))
    }
}

#[async_trait]
impl ScriptDispatcher for HttpDispatcher {
    async fn dispatch(&self, target: &DispatchTarget, request: Request) -> GatewayResult<Response> {
        let uri = self.target_uri(target)?;
        let (parts, body) = request.into_parts();
        let body = to_bytes(body, MAX_FORWARD_BODY)
            .await
            .map_err(|e| GatewayError::validation(format!("Failed to read request body: {e}")))?;

        let mut outbound = http::Request::builder()
            .method(parts.method)
            .uri(&uri)
            .body(Full::new(body))
            .map_err(|e| GatewayError::upstream(e.to_string()))?;
        *outbound.headers_mut() = strip_hop_by_hop(parts.headers);
        let namespace = HeaderValue::from_str(&target.namespace)
            .map_err(|e| GatewayError::upstream(e.to_string()))?;
        outbound.headers_mut().insert(NAMESPACE_HEADER, namespace);

        debug!(%uri, script = %target.script, "forwarding to script");
        let response = tokio::time::timeout(self.timeout, self.client.request(outbound))
            .await
            .map_err(|_| GatewayError::upstream(format!("script {} timed out", target.script)))?
            .map_err(|e| {
                GatewayError::upstream(format!("script {} unreachable: {e}", target.script))
            })?;

        let (mut parts, body) = response.into_parts();
        parts.headers = strip_hop_by_hop(parts.headers);
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

fn strip_hop_by_hop(mut headers: HeaderMap) -> HeaderMap {
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
    headers.remove("keep-alive");
    headers
}

/// Router fallback: forward to the script named by the first segment.
pub async fn dispatch_script(State(state): State<GatewayState>, request: Request) -> ApiResult<Response> {
    let target = DispatchTarget::from_uri(&state.config.namespace, request.uri())
        .filter(|t| !is_reserved(&t.script))
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Not found"))?;

    let Some(dispatcher) = state.dispatcher.as_ref() else {
        debug!(script = %target.script, "no dispatcher configured");
        return Err(GatewayError::not_found(format!("Script not found: {}", target.script)).into());
    };

    if state
        .registry
        .lookup_script(&target.namespace, &target.script)
        .await?
        .is_none()
    {
        return Err(GatewayError::not_found(format!("Script not found: {}", target.script)).into());
    }

    dispatcher.dispatch(&target, request).await.map_err(|e| {
        warn!(script = %target.script, error = %e, "dispatch failed");
        e.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::routing::any;
    use http_body_util::BodyExt;

    fn target(script: &str, rest: &str, query: Option<&str>) -> DispatchTarget {
        DispatchTarget {
            namespace: "ns".into(),
            script: script.into(),
            rest: rest.into(),
            query: query.map(str::to_string),
        }
    }

    #[test]
    fn target_splits_path_and_query() {
        let uri: Uri = "/foo/a/b?x=1".parse().unwrap();
        assert_eq!(
            DispatchTarget::from_uri("ns", &uri),
            Some(target("foo", "/a/b", Some("x=1")))
        );

        let uri: Uri = "/foo".parse().unwrap();
        assert_eq!(DispatchTarget::from_uri("ns", &uri), Some(target("foo", "", None)));

        let uri: Uri = "/".parse().unwrap();
        assert_eq!(DispatchTarget::from_uri("ns", &uri), None);
    }

    #[test]
    fn reserved_segments() {
        for name in ["deploy", "kv", "r2", "chat", "actor", "test", "status"] {
            assert!(is_reserved(name));
        }
        assert!(!is_reserved("pick-of-gods-chat-worker"));
    }

    #[test]
    fn hop_by_hop_headers_are_dropped() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("gateway"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        let kept = strip_hop_by_hop(headers);
        assert_eq!(kept.len(), 1);
        assert!(kept.contains_key(header::CONTENT_TYPE));
    }

    #[tokio::test]
    async fn http_dispatcher_forwards_path_query_body_and_namespace() {
        let upstream = Router::new().route(
            "/{*path}",
            any(|request: Request| async move {
                let ns = request
                    .headers()
                    .get(NAMESPACE_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let line = format!("{} {}", request.method(), request.uri());
                let body = to_bytes(request.into_body(), 1024).await.unwrap();
                (
                    StatusCode::ACCEPTED,
                    [("x-upstream", "yes")],
                    format!("{line} ns={ns} body={}", String::from_utf8_lossy(&body)),
                )
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, upstream).await.unwrap();
        });

        let dispatcher = HttpDispatcher::new(format!("http://{addr}/"), Duration::from_secs(5));
        let request = http::Request::builder()
            .method("POST")
            .uri("/foo/hello?x=1")
            .header(header::HOST, "gateway.local")
            .body(Body::from("ping"))
            .unwrap();

        let response = dispatcher
            .dispatch(&target("foo", "/hello", Some("x=1")), request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.headers().get("x-upstream").unwrap(), "yes");

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, "POST /foo/hello?x=1 ns=ns body=ping");
    }

    #[tokio::test]
    async fn unreachable_upstream_is_upstream_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dispatcher = HttpDispatcher::new(format!("http://{addr}"), Duration::from_secs(2));
        let request = http::Request::builder().uri("/foo").body(Body::empty()).unwrap();
        let err = dispatcher
            .dispatch(&target("foo", "", None), request)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Upstream(_)));
    }
}
