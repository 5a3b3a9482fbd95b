//! Read-only pairing-request introspection, admin-gated.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;

use crate::api::admin::guard::AdminGuard;
use crate::api::api_error;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PairingQuery {
    account_id: Option<String>,
}

/// `GET /admin/pairing/:channel` — pending pairing codes for one channel.
pub async fn list_requests(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    Query(query): Query<PairingQuery>,
    _guard: AdminGuard,
) -> Response {
    match state.orchestrator.pairing().list_requests(&channel, query.account_id.as_deref()).await {
        Ok(requests) => Json(json!({ "channel": channel, "requests": requests })).into_response(),
        Err(e) => api_error(axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// `GET /admin/pairing/:channel/allow` — the merged (scoped + legacy)
/// allowlist for one channel.
pub async fn allow_from(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    Query(query): Query<PairingQuery>,
    _guard: AdminGuard,
) -> Response {
    match state.orchestrator.pairing().read_allow_from_store(&channel, query.account_id.as_deref()).await {
        Ok(entries) => {
            let entries: Vec<_> = entries.iter().map(|e| e.as_str().to_string()).collect();
            Json(json!({ "channel": channel, "allow_from": entries })).into_response()
        }
        Err(e) => api_error(axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
