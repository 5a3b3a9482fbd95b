pub mod abort;
pub mod access;
pub mod auth_profiles;
pub mod dispatcher;
pub mod error;
pub mod followup;
pub mod pairing;
pub mod server;
pub mod sessions;

pub use abort::AbortConfig;
pub use access::{AccessConfig, DmPolicy, GroupPolicy};
pub use auth_profiles::AuthProfilesConfig;
pub use dispatcher::DispatcherConfig;
pub use error::{ConfigError, ConfigSeverity};
pub use followup::{DropPolicy, FollowupConfig, FollowupMode};
pub use pairing::PairingConfig;
pub use server::ServerConfig;
pub use sessions::{MaintenanceMode, SessionsConfig};

use serde::{Deserialize, Serialize};

/// Top-level gateway configuration. Loaded from `openclaw.toml`; every
/// field has a default so a missing file still produces a usable config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub sessions: SessionsConfig,
    pub pairing: PairingConfig,
    pub access: AccessConfig,
    pub auth_profiles: AuthProfilesConfig,
    pub abort: AbortConfig,
    pub followup: FollowupConfig,
    pub dispatcher: DispatcherConfig,
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn load(path: &std::path::Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw).map_err(|e| crate::error::Error::Config(e.to_string()))
    }

    /// Validate every sub-config and collect all findings; an empty result
    /// does not imply zero warnings, only zero errors/warnings combined.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.sessions.validate());
        errors.extend(self.pairing.validate());
        errors.extend(self.access.validate());
        errors.extend(self.auth_profiles.validate());
        errors.extend(self.abort.validate());
        errors.extend(self.followup.validate());
        errors.extend(self.dispatcher.validate());
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
        let cfg = Config::default();
        let errors = cfg.validate();
        assert!(!Config::has_errors(&errors));
    }

    #[test]
    fn zero_port_is_an_error() {
        let mut cfg = Config::default();
        cfg.server.port = 0;
        let errors = cfg.validate();
        assert!(Config::has_errors(&errors));
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = Config::default();
        let s = toml::to_string(&cfg).expect("serialize");
        let parsed = Config::from_toml_str(&s).expect("parse");
        assert_eq!(parsed.server.port, cfg.server.port);
    }
}
