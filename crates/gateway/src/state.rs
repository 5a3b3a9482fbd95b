//! Shared application state passed to every Axum handler.

use std::path::PathBuf;
use std::sync::Arc;

use oc_orchestrator::InboundOrchestrator;
use tokio::sync::Notify;

use crate::config::GatewayConfig;

/// Everything an API handler might need: the orchestrator that drives
/// the whole dispatch pipeline, the resolved config, and the admin
/// bearer-token hash used by [`crate::api::admin::guard::AdminGuard`].
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub config_path: PathBuf,
    pub orchestrator: Arc<InboundOrchestrator>,
    /// SHA-256 digest of the admin bearer token, if one is configured via
    /// the environment variable named in `config.core.server.admin_token_env`.
    pub admin_token_hash: Option<Vec<u8>>,
    /// The default agent ID used to resolve a session-store path for
    /// introspection endpoints that aren't scoped to a specific agent.
    pub default_agent_id: String,
    pub shutdown: Arc<Notify>,
}
