//! Read-only session-store introspection, admin-gated.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;

use crate::api::admin::guard::AdminGuard;
use crate::api::api_error;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SessionsQuery {
    agent_id: Option<String>,
}

/// `GET /admin/sessions?agent_id=...` — snapshot of every session entry for
/// one agent's store (defaults to the gateway's configured default agent).
pub async fn list_sessions(State(state): State<AppState>, Query(query): Query<SessionsQuery>, _guard: AdminGuard) -> Response {
    let agent_id = query.agent_id.as_deref().unwrap_or(&state.default_agent_id);
    let path = state.orchestrator.sessions().resolve_store_path(None, agent_id);

    match state.orchestrator.sessions().load(&path).await {
        Ok(map) => {
            let entries: Vec<_> = map
                .into_iter()
                .map(|(key, entry)| {
                    json!({
                        "session_key": key.as_str(),
                        "session_id": entry.session_id.to_string(),
                        "updated_at": entry.updated_at,
                        "last_channel": entry.last_channel,
                        "last_to": entry.last_to,
                        "chat_type": entry.chat_type,
                    })
                })
                .collect();
            Json(json!({ "agent_id": agent_id, "store_path": path.display().to_string(), "sessions": entries })).into_response()
        }
        Err(e) => api_error(axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// `POST /admin/sessions/:agent_id/:session_key/reset` — force a session
/// reset, the same operation a `/reset` command triggers from inside a chat.
pub async fn reset_session(
    State(state): State<AppState>,
    Path((agent_id, session_key)): Path<(String, String)>,
    _guard: AdminGuard,
) -> Response {
    let path = state.orchestrator.sessions().resolve_store_path(None, &agent_id);
    let key = oc_domain::model::SessionKey::canonicalize(&session_key);
    match state.orchestrator.sessions().reset_session(&path, &key, "admin-requested").await {
        Ok(entry) => Json(json!({ "session_id": entry.session_id.to_string(), "updated_at": entry.updated_at })).into_response(),
        Err(e) => api_error(axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
