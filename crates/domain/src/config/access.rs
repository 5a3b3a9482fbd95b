use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DmPolicy {
    Open,
    Allowlist,
    Pairing,
    Disabled,
}

impl Default for DmPolicy {
    fn default() -> Self {
        DmPolicy::Allowlist
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupPolicy {
    Open,
    Allowlist,
    Disabled,
}

impl Default for GroupPolicy {
    fn default() -> Self {
        GroupPolicy::Allowlist
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    /// Whether control commands may be parsed from plain text (vs. only
    /// from a native command surface).
    pub text: bool,
    /// Per-surface override of `text`.
    pub allow_text_commands: HashMap<String, bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupConfig {
    pub policy: GroupPolicy,
    pub require_mention: bool,
    pub mention_pattern: Option<String>,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            policy: GroupPolicy::default(),
            require_mention: false,
            mention_pattern: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    pub dm_policy: DmPolicy,
    pub group: GroupConfig,
    pub commands: CommandsConfig,
    /// `access-groups`: named groups of allowlist entries authorized to
    /// issue control commands regardless of the channel's general policy.
    pub access_groups: HashMap<String, Vec<String>>,
    /// Statically-configured DM allowlist entries (spec.md §3
    /// `AllowListEntry`), keyed by channel name. Checked directly under
    /// `DmPolicy::Allowlist`, and merged with the pairing store's
    /// persisted allowlist under `DmPolicy::Pairing`.
    pub dm_allow_from: HashMap<String, Vec<String>>,
    /// Statically-configured group allowlist entries (sender ids or
    /// group ids), keyed by channel name. Checked under
    /// `GroupPolicy::Allowlist`.
    pub group_allow_from: HashMap<String, Vec<String>>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            dm_policy: DmPolicy::default(),
            group: GroupConfig::default(),
            commands: CommandsConfig::default(),
            access_groups: HashMap::new(),
            dm_allow_from: HashMap::new(),
            group_allow_from: HashMap::new(),
        }
    }
}

impl AccessConfig {
    /// Configured DM allowlist for `channel`, or an empty slice if the
    /// channel has no entries configured.
    pub fn dm_allow_from(&self, channel: &str) -> &[String] {
        self.dm_allow_from.get(channel).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Configured group allowlist for `channel`, or an empty slice if the
    /// channel has no entries configured.
    pub fn group_allow_from(&self, channel: &str) -> &[String] {
        self.group_allow_from.get(channel).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if self.group.require_mention && self.group.mention_pattern.is_none() {
            errors.push(ConfigError::warning(
                "access.group.mention_pattern",
                "require_mention is set but no mention_pattern is configured",
            ));
        }
        if self.dm_policy == DmPolicy::Allowlist && self.dm_allow_from.values().all(|v| v.is_empty()) {
            errors.push(ConfigError::warning(
                "access.dm_allow_from",
                "dm_policy is allowlist but no dm_allow_from entries are configured for any channel — every DM will be dropped",
            ));
        }
        if self.group.policy == GroupPolicy::Allowlist && self.group_allow_from.values().all(|v| v.is_empty()) {
            errors.push(ConfigError::warning(
                "access.group_allow_from",
                "group.policy is allowlist but no group_allow_from entries are configured for any channel — every group message will be dropped",
            ));
        }
        errors
    }
}
