//! Admin introspection surface: system info, session/pairing/auth-profile
//! snapshots. Every route here is gated by [`guard::AdminGuard`].

pub mod auth_profiles;
pub mod guard;
pub mod health;
pub mod pairing;
pub mod sessions;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/system", get(health::system_info))
        .route("/restart", post(health::restart))
        .route("/sessions", get(sessions::list_sessions))
        .route("/sessions/:agent_id/:session_key/reset", post(sessions::reset_session))
        .route("/pairing/:channel", get(pairing::list_requests))
        .route("/pairing/:channel/allow", get(pairing::allow_from))
        .route("/auth-profiles", get(auth_profiles::list_profiles))
}
