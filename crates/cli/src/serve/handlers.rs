//! HTTP route handlers: metadata, tokenize, lifecycle, ownership, and queries.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use reap_registry::{FarmState, Identity, RegistryError, TokenizeRequest};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::json_error;
use super::state::AppState;

/// Map a registry error onto its HTTP status.
fn error_response(e: RegistryError) -> Response {
    let status = match &e {
        RegistryError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        RegistryError::Unauthorized { .. } => StatusCode::FORBIDDEN,
        RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
        RegistryError::DuplicateId { .. } => StatusCode::CONFLICT,
        RegistryError::Internal(_) | RegistryError::Storage(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %e, "registry failure");
    }
    json_error(status, e.kind(), &e.to_string()).into_response()
}

fn ok<T: serde::Serialize>(value: T) -> Response {
    (StatusCode::OK, Json(value)).into_response()
}

fn invalid_input(message: &str) -> Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_input", message).into_response()
}

/// Decode a request body into `T`. Unparseable JSON, a missing JSON
/// content type, and shape errors are all `invalid_input`.
fn parse_body<T: DeserializeOwned>(
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<T, Response> {
    let Json(value) = body.map_err(|e| invalid_input(&e.body_text()))?;
    serde_json::from_value(value)
        .map_err(|e| invalid_input(&format!("invalid request body: {}", e)))
}

/// Unwrap a path parameter, reporting unparseable segments as `invalid_input`.
fn path_param<T>(path: Result<Path<T>, PathRejection>) -> Result<T, Response> {
    path.map(|Path(value)| value)
        .map_err(|e| invalid_input(&e.body_text()))
}

fn parse_identity(value: String) -> Result<Identity, Response> {
    Identity::new(value).map_err(error_response)
}

#[derive(Debug, Deserialize)]
struct TokenizeBody {
    name: String,
    #[serde(default)]
    size: String,
    location: String,
    image_hash: String,
    #[serde(default)]
    soil: String,
    token_id: u64,
    caller: String,
}

#[derive(Debug, Deserialize)]
struct TransitionBody {
    state: String,
    caller: String,
}

#[derive(Debug, Deserialize)]
struct TransferBody {
    to: String,
    caller: String,
}

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not_found", "no such route")
}

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    let response = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(response))
}

/// GET /metadata
pub(crate) async fn handle_metadata(State(state): State<Arc<AppState>>) -> Response {
    let registry = &state.registry;
    match registry.total_supply().await {
        Ok(total_supply) => ok(serde_json::json!({
            "name": registry.name(),
            "symbol": registry.symbol(),
            "total_supply": total_supply,
        })),
        Err(e) => error_response(e),
    }
}

/// POST /farms
pub(crate) async fn handle_tokenize(
    State(state): State<Arc<AppState>>,
    parsed: Result<Json<serde_json::Value>, JsonRejection>,
) -> Response {
    let body: TokenizeBody = match parse_body(parsed) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let caller = match parse_identity(body.caller) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let request = TokenizeRequest {
        name: body.name,
        size: body.size,
        location: body.location,
        image_hash: body.image_hash,
        soil: body.soil,
        token_id: body.token_id,
    };

    match state.registry.tokenize(request, &caller).await {
        Ok(receipt) => (StatusCode::CREATED, Json(receipt)).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /farms/{token_id}
pub(crate) async fn handle_get_farm(
    State(state): State<Arc<AppState>>,
    token_id: Result<Path<u64>, PathRejection>,
) -> Response {
    let token_id = match path_param(token_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match state.registry.get_farm(token_id).await {
        Ok(farm) => ok(farm),
        Err(e) => error_response(e),
    }
}

/// GET /farms/{token_id}/exists
pub(crate) async fn handle_exists(
    State(state): State<Arc<AppState>>,
    token_id: Result<Path<u64>, PathRejection>,
) -> Response {
    let token_id = match path_param(token_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match state.registry.exists(token_id).await {
        Ok(exists) => ok(serde_json::json!({ "token_id": token_id, "exists": exists })),
        Err(e) => error_response(e),
    }
}

/// GET /farms/{token_id}/owner
pub(crate) async fn handle_owner_of(
    State(state): State<Arc<AppState>>,
    token_id: Result<Path<u64>, PathRejection>,
) -> Response {
    let token_id = match path_param(token_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match state.registry.owner_of(token_id).await {
        Ok(owner) => ok(serde_json::json!({ "token_id": token_id, "owner": owner })),
        Err(e) => error_response(e),
    }
}

/// GET /farms/{token_id}/state
pub(crate) async fn handle_get_state(
    State(state): State<Arc<AppState>>,
    token_id: Result<Path<u64>, PathRejection>,
) -> Response {
    let token_id = match path_param(token_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match state.registry.get_token_state(token_id).await {
        Ok(farm_state) => ok(serde_json::json!({ "token_id": token_id, "state": farm_state })),
        Err(e) => error_response(e),
    }
}

/// POST /farms/{token_id}/state
pub(crate) async fn handle_transition_state(
    State(state): State<Arc<AppState>>,
    token_id: Result<Path<u64>, PathRejection>,
    parsed: Result<Json<serde_json::Value>, JsonRejection>,
) -> Response {
    let token_id = match path_param(token_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let body: TransitionBody = match parse_body(parsed) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let caller = match parse_identity(body.caller) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let new_state = match body.state.parse::<FarmState>() {
        Ok(s) => s,
        Err(e) => return error_response(e),
    };

    match state
        .registry
        .transition_state(token_id, new_state, &caller)
        .await
    {
        Ok(receipt) => ok(receipt),
        Err(e) => error_response(e),
    }
}

/// POST /farms/{token_id}/transfer
pub(crate) async fn handle_transfer(
    State(state): State<Arc<AppState>>,
    token_id: Result<Path<u64>, PathRejection>,
    parsed: Result<Json<serde_json::Value>, JsonRejection>,
) -> Response {
    let token_id = match path_param(token_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let body: TransferBody = match parse_body(parsed) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let (to, caller) = match (parse_identity(body.to), parse_identity(body.caller)) {
        (Ok(to), Ok(caller)) => (to, caller),
        (Err(resp), _) | (_, Err(resp)) => return resp,
    };

    match state.registry.transfer(token_id, &to, &caller).await {
        Ok(receipt) => ok(receipt),
        Err(e) => error_response(e),
    }
}

/// GET /farms/{token_id}/history
pub(crate) async fn handle_state_history(
    State(state): State<Arc<AppState>>,
    token_id: Result<Path<u64>, PathRejection>,
) -> Response {
    let token_id = match path_param(token_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match state.registry.state_history(token_id).await {
        Ok(history) => ok(serde_json::json!({ "token_id": token_id, "history": history })),
        Err(e) => error_response(e),
    }
}

/// GET /registry/farms/{index}
pub(crate) async fn handle_query_farm(
    State(state): State<Arc<AppState>>,
    index: Result<Path<u64>, PathRejection>,
) -> Response {
    let index = match path_param(index) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match state.registry.query_tokenized_farm(index).await {
        Ok(farm) => ok(farm),
        Err(e) => error_response(e),
    }
}

/// GET /owners/{owner}/balance
pub(crate) async fn handle_balance_of(
    State(state): State<Arc<AppState>>,
    owner: Result<Path<String>, PathRejection>,
) -> Response {
    let owner = match path_param(owner).and_then(parse_identity) {
        Ok(o) => o,
        Err(resp) => return resp,
    };
    match state.registry.balance_of(&owner).await {
        Ok(balance) => ok(serde_json::json!({ "owner": owner, "balance": balance })),
        Err(e) => error_response(e),
    }
}

/// GET /owners/{owner}/farms
pub(crate) async fn handle_farms_of(
    State(state): State<Arc<AppState>>,
    owner: Result<Path<String>, PathRejection>,
) -> Response {
    let owner = match path_param(owner).and_then(parse_identity) {
        Ok(o) => o,
        Err(resp) => return resp,
    };
    match state.registry.farms_of(&owner).await {
        Ok(farms) => ok(serde_json::json!({ "owner": owner, "farms": farms })),
        Err(e) => error_response(e),
    }
}

/// GET /owners/{owner}/farms/{index}
pub(crate) async fn handle_query_user_farm(
    State(state): State<Arc<AppState>>,
    path: Result<Path<(String, u64)>, PathRejection>,
) -> Response {
    let (owner, index) = match path_param(path) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let owner = match parse_identity(owner) {
        Ok(o) => o,
        Err(resp) => return resp,
    };
    match state.registry.query_user_tokenized_farm(&owner, index).await {
        Ok(farm) => ok(farm),
        Err(e) => error_response(e),
    }
}
