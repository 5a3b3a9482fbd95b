//! Command-line surface. Scoped down from the teacher's (no `init`, `run`,
//! `systemd`, `import`, keychain-backed secret commands — this gateway has
//! no workspace scaffolding, interactive chat, or OpenClaw import story)
//! but keeping the `Serve`/`Doctor`/`Config`/`Version` shape identical.

pub mod config_cmd;
pub mod doctor;

use clap::{Parser, Subcommand};

/// openclaw-gateway — inbound-to-reply dispatch engine.
#[derive(Debug, Parser)]
#[command(name = "openclaw-gateway", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Serve,
    /// Run diagnostic checks against the current configuration.
    Doctor,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

/// Load the gateway config from `OC_GATEWAY_CONFIG` (or `config.toml` in
/// the current directory), falling back to defaults when the file is
/// absent — the same lenient bootstrap the teacher's `load_config` does.
pub fn load_config() -> anyhow::Result<(crate::config::GatewayConfig, String)> {
    let config_path = std::env::var("OC_GATEWAY_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path).map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        crate::config::GatewayConfig::from_toml_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        crate::config::GatewayConfig::default()
    };

    Ok((config, config_path))
}
