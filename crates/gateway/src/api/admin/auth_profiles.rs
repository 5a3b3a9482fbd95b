//! Read-only auth-profile cooldown/usage introspection, admin-gated.
//! Credentials are never included in the response.

use axum::extract::State;
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use serde_json::json;

use crate::api::admin::guard::AdminGuard;
use crate::api::api_error;
use crate::state::AppState;

/// `GET /admin/auth-profiles` — per-profile cooldown/disable summary,
/// omitting the `credentials` blob entirely.
pub async fn list_profiles(State(state): State<AppState>, _guard: AdminGuard) -> Response {
    match state.orchestrator.auth_profiles().load_all().await {
        Ok(profiles) => {
            let now = Utc::now();
            let summary: Vec<_> = profiles
                .iter()
                .map(|p| {
                    json!({
                        "id": p.id,
                        "provider": p.provider,
                        "type": p.kind,
                        "unusable": p.is_unusable(now),
                        "unusable_until": p.usage_stats.unusable_until(),
                        "error_count": p.usage_stats.error_count,
                        "disabled_reason": p.usage_stats.disabled_reason,
                        "last_used": p.usage_stats.last_used,
                        "last_failure_at": p.usage_stats.last_failure_at,
                    })
                })
                .collect();
            Json(json!({ "profiles": summary })).into_response()
        }
        Err(e) => api_error(axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
