//! `POST /v1/inbound` — the HTTP ingress surface a channel adapter (a
//! Telegram/Slack/Discord bridge, a cron trigger, …) posts a normalized
//! envelope to. Grounded in the teacher's `api/inbound.rs` `InboundEnvelope`
//! deserialize shape, adapted to this crate's [`NormalizedInbound`].

use axum::extract::State;
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use oc_domain::model::InboundMetadata;
use oc_orchestrator::{MessageOutcome, NormalizedInbound};

use crate::api::api_error;
use crate::state::AppState;

/// Wire shape for one inbound message, as posted by a channel adapter.
/// `chat_type` defaults to `"direct"`, matching the teacher's envelope.
#[derive(Debug, Deserialize)]
pub struct InboundEnvelope {
    pub agent_id: String,
    pub channel: String,
    pub body: String,
    #[serde(default)]
    pub raw_body: Option<String>,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub message_sid: Option<String>,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default = "default_chat_type")]
    pub chat_type: String,
    #[serde(default)]
    pub is_cron: bool,
    #[serde(default)]
    pub originating_channel: Option<String>,
    #[serde(default)]
    pub originating_to: Option<String>,
    #[serde(default)]
    pub surface: Option<String>,
}

fn default_chat_type() -> String {
    "direct".to_string()
}

fn outcome_json(outcome: &MessageOutcome) -> serde_json::Value {
    match outcome {
        MessageOutcome::Completed => json!({ "outcome": "completed" }),
        MessageOutcome::Aborted { stopped_subagents } => json!({ "outcome": "aborted", "stopped_subagents": stopped_subagents }),
        MessageOutcome::Dropped { reason } => json!({ "outcome": "dropped", "reason": reason }),
        MessageOutcome::Skipped { reason } => json!({ "outcome": "skipped", "reason": reason }),
        MessageOutcome::Errored { reason } => json!({ "outcome": "errored", "reason": reason }),
    }
}

pub async fn receive(State(state): State<AppState>, Json(envelope): Json<InboundEnvelope>) -> Response {
    let is_direct = envelope.chat_type.eq_ignore_ascii_case("direct");
    let raw_body = envelope.raw_body.clone().unwrap_or_else(|| envelope.body.clone());
    let message_sid = envelope.message_sid.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let inbound = NormalizedInbound {
        provider: envelope.channel.clone(),
        body: envelope.body,
        raw_body,
        from: envelope.from.clone(),
        to: envelope.to,
        meta: InboundMetadata {
            channel: Some(envelope.channel),
            account_id: envelope.account_id.clone(),
            peer_id: Some(envelope.from.clone()),
            group_id: envelope.group_id,
            channel_id: envelope.channel_id,
            thread_id: envelope.thread_id,
            is_direct,
            is_cron: envelope.is_cron,
        },
        message_sid,
        sender_id: envelope.from,
        sender_name: envelope.sender_name,
        account_id: envelope.account_id,
        surface: envelope.surface,
        originating_channel: envelope.originating_channel,
        originating_to: envelope.originating_to,
        timestamp: Utc::now(),
    };

    match state.orchestrator.handle_inbound(inbound, &envelope.agent_id).await {
        Ok(outcome) => Json(outcome_json(&outcome)).into_response(),
        Err(e) => api_error(axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
