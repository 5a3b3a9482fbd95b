//! Stand-ins for the two external-collaborator interfaces spec.md §6
//! defines but deliberately leaves unimplemented: [`ChannelSender`] and
//! [`AgentRunner`]. Concrete channel protocol clients (Telegram, Slack,
//! Discord, …) and the actual LLM/tool-orchestration runtime are each a
//! real deployment's own plugin — this binary only needs *something*
//! that implements the trait so the orchestrator can be wired up and
//! `oc doctor` / the HTTP ingress surface have a live thing to exercise.
//!
//! [`WebhookChannelSender`] posts the outbound [`ReplyPayload`] as JSON to
//! a per-channel URL from config (falling back to a structured log line
//! when no URL is configured) — this is the "any channel adapter" shape
//! every real connector would sit behind. [`EchoAgentRunner`] immediately
//! echoes the inbound text back as the final reply; it exists purely so
//! the gateway binary links and `oc doctor`/integration smoke tests have
//! a deterministic runner to drive against.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_core::Stream;

use oc_dispatcher::{ChannelSender, SendAck, SendError};
use oc_domain::model::ReplyPayload;
use oc_orchestrator::{AgentEvent, AgentRunner, EventStream, RunRequest};

use crate::config::ChannelWebhook;

/// Posts reply payloads to a configured webhook URL; logs and reports
/// success when none is configured (dev-mode / unset channel).
pub struct WebhookChannelSender {
    channel: String,
    webhook: Option<ChannelWebhook>,
    client: reqwest::Client,
}

impl WebhookChannelSender {
    pub fn new(channel: impl Into<String>, webhook: Option<ChannelWebhook>) -> Self {
        Self {
            channel: channel.into(),
            webhook,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChannelSender for WebhookChannelSender {
    async fn send(&self, to: &str, payload: &ReplyPayload) -> Result<SendAck, SendError> {
        let Some(webhook) = &self.webhook else {
            tracing::info!(
                channel = %self.channel,
                to,
                text = ?payload.text,
                media = payload.media_urls.len(),
                "no webhook configured for channel — logging reply instead of sending"
            );
            return Ok(SendAck::default());
        };

        let body = serde_json::json!({
            "channel": self.channel,
            "to": to,
            "text": payload.text,
            "media_urls": payload.media_urls,
            "reply_to_id": payload.reply_to_id,
        });

        let result = self
            .client
            .post(&webhook.url)
            .timeout(Duration::from_millis(webhook.timeout_ms))
            .json(&body)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => Ok(SendAck { message_id: None }),
            Ok(resp) => Err(SendError::Transport {
                to: to.to_string(),
                reason: format!("webhook returned {}", resp.status()),
            }),
            Err(e) => Err(SendError::Transport {
                to: to.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

/// Echoes the inbound message back as the agent's final reply. Not a
/// model invocation of any kind — a deterministic placeholder so the
/// `oc-gateway` binary has something to run until a real `AgentRunner`
/// (backed by an actual LLM/tool loop) is plugged in by the deployer.
pub struct EchoAgentRunner;

#[async_trait]
impl AgentRunner for EchoAgentRunner {
    async fn run(&self, request: RunRequest) -> EventStream {
        let reply = ReplyPayload::text(request.message);
        let stream = futures_util::stream::once(async move { AgentEvent::Final { payload: reply } });
        Box::pin(stream) as Pin<Box<dyn Stream<Item = AgentEvent> + Send>>
    }

    async fn abort(&self, _session_key: &oc_domain::model::SessionKey) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn echo_runner_returns_final_with_same_text() {
        let runner = EchoAgentRunner;
        let request = RunRequest {
            session_key: oc_domain::model::SessionKey::canonicalize("agent:test:direct:main"),
            message: "hello".into(),
            attachments: Vec::new(),
            idempotency_key: "idem-1".into(),
            thinking: false,
            timeout_ms: 1000,
            auth_profile_id: None,
        };
        let mut events = runner.run(request).await;
        match events.next().await {
            Some(AgentEvent::Final { payload }) => assert_eq!(payload.text.as_deref(), Some("hello")),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn sender_without_webhook_logs_and_succeeds() {
        let sender = WebhookChannelSender::new("telegram", None);
        let ack = sender.send("chat1", &ReplyPayload::text("hi")).await.unwrap();
        assert!(ack.message_id.is_none());
    }
}
