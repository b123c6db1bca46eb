//! Transparent pass-through to the backend.
//!
//! The verb, path, and body stream through unchanged. `Host` and
//! `Content-Length` are dropped on the way up (the client recomputes
//! framing), `Transfer-Encoding` on the way down. Bodies are never
//! accumulated in memory.

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{HeaderMap, Method},
    response::{IntoResponse, Response},
};
use http_body::Body as _;
use tracing::debug;

use crate::error::GatewayError;
use crate::AppState;

/// Fallback handler: any unmatched path goes to the backend.
pub(crate) async fn passthrough(State(state): State<AppState>, req: Request) -> Response {
    let (parts, body) = req.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());

    debug!("Pass-through {} {}", parts.method, path_and_query);

    let outgoing = if body.size_hint().exact() == Some(0) {
        reqwest::Body::from(Vec::new())
    } else {
        reqwest::Body::wrap_stream(body.into_data_stream())
    };

    send(
        &state,
        parts.method,
        &path_and_query,
        &parts.headers,
        outgoing,
    )
    .await
}

/// Forward a rebuilt request with a buffered body (used by the intercept
/// handlers when they decide to let a call through after all).
pub(crate) async fn forward(
    state: &AppState,
    method: Method,
    path: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Response {
    send(state, method, path, headers, reqwest::Body::from(body)).await
}

async fn send(
    state: &AppState,
    method: Method,
    path_and_query: &str,
    headers: &HeaderMap,
    body: reqwest::Body,
) -> Response {
    let url = format!("{}{}", state.backend.base_url(), path_and_query);

    let mut request = state.proxy_http.request(method, url).body(body);
    for (name, value) in headers {
        if matches!(name.as_str(), "host" | "content-length") {
            continue;
        }
        request = request.header(name, value);
    }

    let upstream = match request.send().await {
        Ok(response) => response,
        Err(e) if e.is_connect() || e.is_timeout() => {
            return GatewayError::BackendUnavailable(e.to_string()).into_response();
        }
        Err(e) => return GatewayError::Internal(e.into()).into_response(),
    };

    let status = upstream.status();
    let mut response_headers = HeaderMap::new();
    for (name, value) in upstream.headers() {
        if name.as_str() == "transfer-encoding" {
            continue;
        }
        response_headers.insert(name.clone(), value.clone());
    }

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    response
}
