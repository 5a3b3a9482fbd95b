use serde::{Deserialize, Serialize};

use super::error::ConfigError;

fn d_bind_addr() -> String {
    "0.0.0.0".into()
}

fn d_port() -> u16 {
    8787
}

fn d_admin_token_env() -> String {
    "OC_ADMIN_TOKEN".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
    /// Environment variable name holding the admin bearer token. The token
    /// itself is never stored in config.
    pub admin_token_env: String,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: d_bind_addr(),
            port: d_port(),
            admin_token_env: d_admin_token_env(),
            cors_allowed_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if self.port == 0 {
            errors.push(ConfigError::error("server.port", "port must be non-zero"));
        }
        if self.bind_addr.trim().is_empty() {
            errors.push(ConfigError::error("server.bind_addr", "bind_addr must not be empty"));
        }
        errors
    }
}
