//! Gateway-level configuration: wraps [`oc_domain::config::Config`] (the
//! core dispatch engine's settings) with the wiring concerns that only
//! the binary itself cares about — HTTP bind/CORS details live in
//! `oc_domain::config::ServerConfig` already; this module adds the
//! outbound channel-sender URLs and optional OpenTelemetry export that
//! the core has no opinion on.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use oc_domain::config::{Config, ConfigError, ConfigSeverity};

/// One configured outbound channel: where the gateway posts a
/// [`oc_domain::model::ReplyPayload`] once the dispatcher has ordered it.
/// Concrete channel wire formats are an external collaborator's concern
/// (spec.md §1); the gateway only knows "POST this JSON envelope here."
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelWebhook {
    pub url: String,
    pub timeout_ms: u64,
}

impl Default for ChannelWebhook {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    /// Channel name (matches `NormalizedInbound::provider` /
    /// `MsgContext::reply_channel()`) → outbound webhook.
    pub webhooks: std::collections::BTreeMap<String, ChannelWebhook>,
}

fn d_otlp_endpoint() -> String {
    "http://localhost:4317".into()
}

/// Reserved OpenTelemetry knobs. No `opentelemetry`/`opentelemetry-otlp`
/// SDK type is wired to this struct — tracing export stays structured
/// JSON via `tracing-subscriber` only (see `main.rs::init_tracing`).
/// Setting `enabled = true` surfaces a [`GatewayConfig::validate`]
/// warning rather than silently doing nothing, so an operator who turns
/// this on in a deployed config finds out at `doctor`/`config validate`
/// time instead of by missing traces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OtelConfig {
    pub enabled: bool,
    pub otlp_endpoint: String,
    pub service_name: String,
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            otlp_endpoint: d_otlp_endpoint(),
            service_name: "openclaw-gateway".into(),
        }
    }
}

fn d_state_dir() -> PathBuf {
    PathBuf::from("data")
}

/// Top-level configuration for the `openclaw-gateway` binary: the core
/// dispatch-engine [`Config`] nested under `[core]`, plus gateway-only
/// wiring sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub core: Config,
    pub channels: ChannelsConfig,
    pub otel: OtelConfig,
    /// Base directory for pairing-store and auth-profile-store files when
    /// their configured paths are relative.
    #[serde(default = "d_state_dir")]
    pub state_dir: PathBuf,
}

impl GatewayConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(Self::from_toml_str(&raw)?)
    }

    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = self.core.validate();
        for (name, hook) in &self.channels.webhooks {
            if hook.url.trim().is_empty() {
                errors.push(ConfigError::warning(
                    format!("channels.webhooks.{name}.url"),
                    "empty webhook URL — replies for this channel will only be logged",
                ));
            }
        }
        if self.otel.enabled {
            errors.push(ConfigError::warning(
                "otel.enabled",
                "no OpenTelemetry exporter is wired into this binary — this flag currently has no effect",
            ));
        }
        errors
    }

    pub fn has_errors(errors: &[ConfigError]) -> bool {
        errors.iter().any(|e| e.severity == ConfigSeverity::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates_clean() {
        let cfg = GatewayConfig::default();
        assert!(!GatewayConfig::has_errors(&cfg.validate()));
    }

    #[test]
    fn empty_webhook_url_is_a_warning_not_an_error() {
        let mut cfg = GatewayConfig::default();
        cfg.channels.webhooks.insert("telegram".into(), ChannelWebhook::default());
        let errors = cfg.validate();
        assert!(!GatewayConfig::has_errors(&errors));
        assert!(errors.iter().any(|e| e.field.contains("telegram")));
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = GatewayConfig::default();
        let s = toml::to_string(&cfg).expect("serialize");
        let parsed = GatewayConfig::from_toml_str(&s).expect("parse");
        assert_eq!(parsed.core.server.port, cfg.core.server.port);
    }
}
