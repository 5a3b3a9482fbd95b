//! The decision procedure itself. Pure except for the pairing branch,
//! which upserts a pending request through [`oc_pairing::PairingStore`].

use chrono::{DateTime, Utc};

use oc_domain::config::{AccessConfig, DmPolicy, GroupPolicy, PairingConfig};
use oc_domain::error::Result;
use oc_domain::model::{ChatType, PairingMeta};
use oc_domain::trace::TraceEvent;
use oc_pairing::PairingStore;

/// Whether a control command arrived over the channel's native command
/// surface (e.g. a Telegram `/command`) or was parsed out of plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandSurface {
    Native,
    Text,
}

#[derive(Debug, Clone)]
pub struct AccessInput<'a> {
    pub chat_type: ChatType,
    pub channel: &'a str,
    pub sender_id: &'a str,
    pub group_id: Option<&'a str>,
    /// Configured DM allowlist (checked directly under `DmPolicy::Allowlist`;
    /// merged with the pairing store's allowlist under `DmPolicy::Pairing`).
    pub config_dm_allow_from: &'a [String],
    /// Configured group allowlist entries (sender ids or group ids).
    pub config_group_allow_from: &'a [String],
    pub is_command: bool,
    pub command_surface: CommandSurface,
    pub command_authorized_by_allowlist: bool,
    pub was_mentioned: bool,
    /// When the message was sent, for pairing's historical-backlog grace.
    pub message_timestamp: DateTime<Utc>,
    /// When this gateway connected to the channel, used the same way.
    pub connected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AccessDecision {
    Allow,
    DropSilent { reason: String },
    /// A pairing code was (re)issued; `created=false` means a request was
    /// already pending and no reply should be sent.
    PairingReply { code: String, created: bool },
    CommandDropped { reason: String },
}

pub struct Evaluator<'a> {
    pub access: &'a AccessConfig,
    pub pairing_cfg: &'a PairingConfig,
    pub pairing_store: &'a PairingStore,
}

impl<'a> Evaluator<'a> {
    pub async fn evaluate(&self, input: &AccessInput<'_>) -> Result<AccessDecision> {
        let is_group = matches!(input.chat_type, ChatType::Group | ChatType::Channel);

        // 1. Group allowlist gate.
        if is_group
            && self.access.group.policy == GroupPolicy::Allowlist
            && !self.in_group_allowlist(input)
        {
            return Ok(self.drop_silent(input, "sender/group not in group allowlist"));
        }

        // 2. Disabled policies.
        if (!is_group && self.access.dm_policy == DmPolicy::Disabled)
            || (is_group && self.access.group.policy == GroupPolicy::Disabled)
        {
            return Ok(self.drop_silent(input, "policy disabled"));
        }

        if !is_group {
            match self.access.dm_policy {
                // 3. Open DM: allow outright (subject to command/mention gates below).
                DmPolicy::Open => {}
                // 4. Allowlist DM: pairing approvals are NOT merged in.
                DmPolicy::Allowlist => {
                    if !input.config_dm_allow_from.iter().any(|e| e == input.sender_id) {
                        return Ok(self.drop_silent(input, "sender not in DM allowlist"));
                    }
                }
                // 5. Pairing DM.
                DmPolicy::Pairing => {
                    let already_allowed = input.config_dm_allow_from.iter().any(|e| e == input.sender_id)
                        || self
                            .pairing_store
                            .read_allow_from_store(input.channel, None)
                            .await?
                            .iter()
                            .any(|e| e.as_str() == input.sender_id);

                    if !already_allowed {
                        return self.pairing_branch(input).await;
                    }
                }
                DmPolicy::Disabled => unreachable!("handled above"),
            }
        }

        // 6. Command gate.
        if input.is_command {
            let surface_allows_text = match input.command_surface {
                CommandSurface::Native => true,
                CommandSurface::Text => {
                    *self
                        .access
                        .commands
                        .allow_text_commands
                        .get(input.channel)
                        .unwrap_or(&self.access.commands.text)
                }
            };

            if !surface_allows_text || !input.command_authorized_by_allowlist {
                return Ok(AccessDecision::CommandDropped {
                    reason: "unauthorized control command".to_string(),
                });
            }
        }

        // 7. Mention gate (group only).
        if is_group
            && self.access.group.require_mention
            && !input.was_mentioned
            && !input.is_command
        {
            return Ok(self.drop_silent(input, "no mention"));
        }

        Ok(AccessDecision::Allow)
    }

    fn in_group_allowlist(&self, input: &AccessInput<'_>) -> bool {
        input.config_group_allow_from.iter().any(|e| e == input.sender_id)
            || input
                .group_id
                .is_some_and(|gid| input.config_group_allow_from.iter().any(|e| e == gid))
    }

    fn drop_silent(&self, input: &AccessInput<'_>, reason: &str) -> AccessDecision {
        TraceEvent::AccessDropped {
            session_key: format!("{}:{}", input.channel, input.sender_id),
            reason: reason.to_string(),
        }
        .emit();
        AccessDecision::DropSilent {
            reason: reason.to_string(),
        }
    }

    async fn pairing_branch(&self, input: &AccessInput<'_>) -> Result<AccessDecision> {
        let grace_ms = self.pairing_cfg.pairing_grace_ms;
        if (input.connected_at - input.message_timestamp).num_milliseconds() > grace_ms {
            // Historical backlog: suppress the pairing reply entirely.
            return Ok(AccessDecision::DropSilent {
                reason: "pairing reply suppressed: historical backlog".to_string(),
            });
        }

        let outcome = self
            .pairing_store
            .upsert_pairing_request(input.channel, input.sender_id, PairingMeta::default())
            .await?;

        Ok(AccessDecision::PairingReply {
            code: outcome.code,
            created: outcome.created,
        })
    }
}
