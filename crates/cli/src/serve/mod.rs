//! `reap serve` -- HTTP JSON API over an in-memory farm registry.
//!
//! Security features:
//! - CORS headers on all responses (permissive for local dev)
//! - Per-IP rate limiting (default: 60 req/min, configurable)
//! - Optional API key authentication via REAP_API_KEY env var
//!
//! Endpoints:
//! - GET  /health                          - Server status (exempt from auth)
//! - GET  /metadata                        - Registry name, symbol, total supply
//! - POST /farms                           - Tokenize a farm
//! - GET  /farms/{token_id}                - Full farm record
//! - GET  /farms/{token_id}/exists         - Existence check
//! - GET  /farms/{token_id}/owner          - Current owner
//! - GET  /farms/{token_id}/state          - Current lifecycle state
//! - POST /farms/{token_id}/state          - Transition lifecycle state
//! - POST /farms/{token_id}/transfer       - Transfer ownership
//! - GET  /farms/{token_id}/history        - Lifecycle history
//! - GET  /registry/farms/{index}          - Farm by global index (1-based)
//! - GET  /owners/{owner}/balance          - Farms held by owner
//! - GET  /owners/{owner}/farms            - All farms held by owner
//! - GET  /owners/{owner}/farms/{index}    - Farm by per-owner index (1-based)
//!
//! Mutations carry the acting identity as `caller` in the JSON body.
//! All responses use Content-Type: application/json.

mod handlers;
mod middleware;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Json, Router};
use reap_registry::FarmRegistry;
use reap_storage::MemoryStorage;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use self::handlers::{
    handle_balance_of, handle_exists, handle_farms_of, handle_get_farm, handle_get_state,
    handle_health, handle_metadata, handle_not_found, handle_owner_of, handle_query_farm,
    handle_query_user_farm, handle_state_history, handle_tokenize, handle_transfer,
    handle_transition_state,
};
use self::middleware::{auth_middleware, rate_limit_middleware};
use self::state::{AppState, RateLimiter};
use crate::config::Config;

/// Maximum request body size: 64 KB.
const MAX_BODY_SIZE: usize = 64 * 1024;

/// Rate limit window duration in seconds (1 minute).
const RATE_LIMIT_WINDOW_SECS: u64 = 60;

#[cfg(not(feature = "tls"))]
const TLS_UNAVAILABLE: &str =
    "--tls-cert/--tls-key require reap to be built with the `tls` feature";

/// Construct a JSON error response with the given status code, kind, and message.
fn json_error(status: StatusCode, kind: &str, message: &str) -> impl IntoResponse {
    (
        status,
        Json(serde_json::json!({"error": message, "kind": kind})),
    )
}

fn router(state: Arc<AppState>) -> Router {
    // CORS: permissive for local dev
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/metadata", get(handle_metadata))
        .route("/farms", post(handle_tokenize))
        .route("/farms/{token_id}", get(handle_get_farm))
        .route("/farms/{token_id}/exists", get(handle_exists))
        .route("/farms/{token_id}/owner", get(handle_owner_of))
        .route(
            "/farms/{token_id}/state",
            get(handle_get_state).post(handle_transition_state),
        )
        .route("/farms/{token_id}/transfer", post(handle_transfer))
        .route("/farms/{token_id}/history", get(handle_state_history))
        .route("/registry/farms/{index}", get(handle_query_farm))
        .route("/owners/{owner}/balance", get(handle_balance_of))
        .route("/owners/{owner}/farms", get(handle_farms_of))
        .route("/owners/{owner}/farms/{index}", get(handle_query_user_farm))
        .fallback(handle_not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Start the HTTP server with an empty registry.
///
/// When TLS cert/key paths are provided, the server listens over HTTPS
/// using `axum-server` with rustls. Otherwise it uses plain HTTP. A build
/// without the `tls` feature refuses TLS paths rather than serving cleartext.
pub async fn start_server(
    config: Config,
    _tls_cert: Option<PathBuf>,
    _tls_key: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(not(feature = "tls"))]
    if _tls_cert.is_some() || _tls_key.is_some() {
        return Err(TLS_UNAVAILABLE.into());
    }

    let port = config.server.port;
    if config.api_key.is_some() {
        info!("API key authentication enabled");
    }
    info!(
        rate_limit = config.server.rate_limit,
        "rate limit: requests per minute per IP"
    );

    let registry =
        FarmRegistry::with_event_capacity(MemoryStorage::new(), config.registry.event_capacity);
    let state = Arc::new(AppState {
        registry,
        rate_limiter: RateLimiter::new(config.server.rate_limit),
        api_key: config.api_key,
    });

    spawn_event_logger(&state);
    let app = router(state);
    let addr = format!("0.0.0.0:{}", port);

    // TLS support via axum-server + rustls (requires `tls` feature)
    #[cfg(feature = "tls")]
    if let (Some(cert_path), Some(key_path)) = (&_tls_cert, &_tls_key) {
        let tls =
            axum_server::tls_rustls::RustlsConfig::from_pem_file(cert_path, key_path).await?;
        let socket_addr: std::net::SocketAddr = addr.parse()?;
        info!("Reap registry listening on https://0.0.0.0:{}", port);
        axum_server::bind_rustls(socket_addr, tls)
            .serve(app.into_make_service_with_connect_info::<std::net::SocketAddr>())
            .await?;
        return Ok(());
    }

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Reap registry listening on http://0.0.0.0:{}", port);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("server shut down");
    Ok(())
}

/// Log every committed registry event until the registry goes away.
fn spawn_event_logger(state: &Arc<AppState>) {
    let mut events = state.registry.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => info!(target: "reap::events", "{}", json),
                    Err(e) => tracing::warn!(error = %e, "failed to encode event"),
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event logger lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("received shutdown signal");
}
