//! HTTP surface: public health/ingress routes plus the admin-gated
//! introspection routes under `/admin`.

pub mod admin;
pub mod inbound;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full route tree. `main.rs` layers CORS/rate-limit/concurrency
/// middleware on top of this and calls `.with_state(state)` last, the same
/// order the teacher's `main.rs` applies to its own `api::router(state)`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(admin::health::health))
        .route("/v1/inbound", post(inbound::receive))
        .nest("/admin", admin::router())
}

/// `{"error": message}` at `status`, the same shape the teacher's
/// `api/router.rs::api_error` builds.
pub fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}
