use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use sha2::{Digest, Sha256};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use oc_dispatcher::ChannelSender;
use oc_gateway::channels::{EchoAgentRunner, WebhookChannelSender};
use oc_gateway::cli::{Cli, Command, ConfigCommand};
use oc_gateway::config::GatewayConfig;
use oc_gateway::state::AppState;
use oc_gateway::{api, cli, maintenance};
use oc_orchestrator::InboundOrchestrator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to serve when no subcommand is given, mirroring the
        // teacher's `main.rs` dispatch.
        None | Some(Command::Serve) => {
            init_tracing();
            let (config, config_path) = cli::load_config()?;
            run_server(config, config_path).await
        }
        Some(Command::Doctor) => {
            let (config, config_path) = cli::load_config()?;
            let passed = cli::doctor::run(&config, &config_path).await?;
            if !passed {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(sub @ (ConfigCommand::Validate | ConfigCommand::Show))) => {
            let (config, config_path) = cli::load_config()?;
            cli::config_cmd::run(sub, &config, &config_path)
        }
        Some(Command::Version) => {
            println!("openclaw-gateway {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Structured JSON tracing, only turned on for the long-running `serve`
/// command — `doctor`/`config`/`version` stay plain stdout.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,oc_gateway=debug")))
        .json()
        .init();
}

async fn run_server(config: GatewayConfig, config_path: String) -> anyhow::Result<()> {
    tracing::info!("openclaw-gateway starting");

    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            oc_domain::config::ConfigSeverity::Warning => tracing::warn!("config: {}", issue.message),
            oc_domain::config::ConfigSeverity::Error => tracing::error!("config: {}", issue.message),
        }
    }
    if GatewayConfig::has_errors(&issues) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == oc_domain::config::ConfigSeverity::Error).count()
        );
    }

    let config = Arc::new(config);
    std::fs::create_dir_all(&config.state_dir).with_context(|| format!("creating state_dir {}", config.state_dir.display()))?;

    // Release every held session-store lock synchronously on exit signal
    // (spec.md §4.1) rather than relying on the next contending acquirer
    // to reclaim it as stale.
    oc_sessions::lock::install_exit_handlers();

    // ── Channel senders ──────────────────────────────────────────────
    // Every webhook-configured channel gets a real sender; anything the
    // orchestrator addresses that isn't in config still resolves (the
    // webhook-less branch of `WebhookChannelSender` just logs), so we
    // pre-register the configured set and let callers add more names as
    // adapters come online.
    let mut channel_senders: HashMap<String, Arc<dyn ChannelSender>> = HashMap::new();
    for (name, hook) in &config.channels.webhooks {
        let sender: Arc<dyn ChannelSender> = Arc::new(WebhookChannelSender::new(name.clone(), Some(hook.clone())));
        channel_senders.insert(name.clone(), sender);
    }
    tracing::info!(channels = channel_senders.len(), "channel senders ready");

    // ── Agent runner ─────────────────────────────────────────────────
    // No concrete LLM/tool-orchestration runtime ships with this crate
    // (spec.md §1 scopes it out as an external collaborator); the echo
    // runner keeps the gateway linkable and exercisable end to end.
    let agent_runner = Arc::new(EchoAgentRunner);

    // ── Orchestrator ─────────────────────────────────────────────────
    let orchestrator = Arc::new(InboundOrchestrator::new(Arc::new(config.core.clone()), agent_runner, channel_senders));
    tracing::info!("inbound orchestrator ready");

    // ── Admin token (read once, hash for constant-time comparison) ───
    let admin_token_hash = match std::env::var(&config.core.server.admin_token_env) {
        Ok(token) if !token.is_empty() => {
            tracing::info!(env_var = %config.core.server.admin_token_env, "admin bearer-token auth enabled");
            Some(Sha256::digest(token.as_bytes()).to_vec())
        }
        _ => {
            tracing::warn!(
                env_var = %config.core.server.admin_token_env,
                "admin bearer-token auth DISABLED — set this env var to enable"
            );
            None
        }
    };

    let default_agent_id = std::env::var("OC_DEFAULT_AGENT_ID").unwrap_or_else(|_| "default".into());

    let state = AppState {
        config: config.clone(),
        config_path: config_path.clone().into(),
        orchestrator: orchestrator.clone(),
        admin_token_hash,
        default_agent_id,
        shutdown: Arc::new(tokio::sync::Notify::new()),
    };

    // ── Background maintenance sweeps (spec.md §4.1, §4.8, §4.2) ─────
    maintenance::spawn_lock_watchdog(config.state_dir.clone(), config.core.sessions.max_hold_ms, Duration::from_secs(60));
    maintenance::spawn_cooldown_sweep(orchestrator.clone(), config.core.auth_profiles.clone(), Duration::from_secs(60));
    maintenance::spawn_pairing_sweep(orchestrator.clone(), config.channels.webhooks.keys().cloned().collect(), Duration::from_secs(300));

    // `otel.enabled` has no exporter behind it yet (see `config::OtelConfig`
    // and `config.validate()`, which warns on this); nothing to spawn here.

    // ── CORS ──────────────────────────────────────────────────────────
    let cors_layer = build_cors_layer(&config.core.server.cors_allowed_origins);

    // ── Router ────────────────────────────────────────────────────────
    let app = api::router()
        .layer(cors_layer)
        .layer(tower::limit::ConcurrencyLimitLayer::new(256))
        .with_state(state.clone());

    let addr = format!("{}:{}", config.core.server.bind_addr, config.core.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("binding to {addr}"))?;
    tracing::info!(addr = %addr, "openclaw-gateway listening");

    let shutdown = state.shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.notified().await;
            tracing::info!("graceful shutdown signalled via /admin/restart");
        })
        .await
        .context("axum server error")?;

    Ok(())
}

fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    use axum::http::header;

    if allowed_origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(hv) => Some(hv),
            Err(_) => {
                tracing::warn!(origin = %o, "invalid CORS origin, skipping");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
