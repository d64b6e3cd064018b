//! HTTP middleware: per-client rate limiting and API key authentication.
//!
//! Rejections are logged with the method and path so refused registry
//! mutations show up next to the committed-event log.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap, HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::warn;

use super::json_error;
use super::state::AppState;

/// Routes reachable without credentials.
const PUBLIC_PATHS: &[&str] = &["/health"];

/// Rate limiting middleware. Checks the client's window before routing.
pub(crate) async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let ip = addr.ip();
    let retry_after = match state.rate_limiter.check(ip).await {
        Ok(()) => return next.run(request).await,
        Err(retry_after) => retry_after,
    };

    warn!(
        %ip,
        method = %request.method(),
        path = request.uri().path(),
        retry_after,
        "rate limit exceeded"
    );
    let body = serde_json::json!({
        "error": "rate limit exceeded",
        "kind": "rate_limited",
        "retry_after": retry_after,
    });
    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
    response
}

/// The key a client presented, preferring `Authorization: Bearer` over
/// `X-API-Key`.
fn presented_key(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    bearer.or_else(|| headers.get("x-api-key").and_then(|v| v.to_str().ok()))
}

/// API key authentication middleware.
///
/// If `REAP_API_KEY` is set, every route except those in [`PUBLIC_PATHS`]
/// requires the key. A missing key is 401; a wrong one is 403.
pub(crate) async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(expected) = state.api_key.as_deref() else {
        return next.run(request).await;
    };
    if PUBLIC_PATHS.contains(&request.uri().path()) {
        return next.run(request).await;
    }

    let refusal = match presented_key(request.headers()) {
        Some(key) if key == expected => None,
        Some(_) => Some((StatusCode::FORBIDDEN, "forbidden", "invalid API key")),
        None => Some((
            StatusCode::UNAUTHORIZED,
            "unauthenticated",
            "authentication required",
        )),
    };
    let Some((status, kind, message)) = refusal else {
        return next.run(request).await;
    };
    warn!(
        method = %request.method(),
        path = request.uri().path(),
        kind,
        "request refused"
    );
    json_error(status, kind, message).into_response()
}
