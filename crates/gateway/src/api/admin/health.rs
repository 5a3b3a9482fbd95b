//! Public health probe plus admin-gated system info, grounded in the
//! teacher's `api/admin/health.rs`.

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::api::admin::guard::AdminGuard;
use crate::state::AppState;

/// `GET /healthz` — no auth, safe to hit from a load balancer.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /admin/system` — resolved config summary and on-disk state, gated
/// behind the admin bearer token.
pub async fn system_info(State(state): State<AppState>, _guard: AdminGuard) -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "config_path": state.config_path.display().to_string(),
        "state_dir": state.config.state_dir.display().to_string(),
        "bind_addr": state.config.core.server.bind_addr,
        "port": state.config.core.server.port,
        "admin_token_configured": state.admin_token_hash.is_some(),
        "channels_configured": state.config.channels.webhooks.keys().collect::<Vec<_>>(),
        "default_agent_id": state.default_agent_id,
    }))
}

/// `POST /admin/restart` — signals the server's graceful-shutdown wait to
/// wake up; the process manager (systemd, docker) is expected to restart
/// the binary. Gated behind the admin bearer token.
pub async fn restart(State(state): State<AppState>, _guard: AdminGuard) -> Json<Value> {
    state.shutdown.notify_one();
    Json(json!({ "status": "restarting" }))
}
