//! The Agent Event Handler (spec.md §4.9): consumes the ordered event
//! stream an [`crate::agent_runner::AgentRunner`] emits for one turn,
//! manages tool-call bookkeeping, accumulates streamed text, tracks
//! messaging-tool sends for downstream dedupe, and resolves the turn's
//! [`oc_domain::model::PendingPrompt`] exactly once.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use sha2::{Digest, Sha256};

use oc_domain::model::{ReplyPayload, SessionKey, TerminalState};

use crate::agent_runner::{AgentEvent, EventStream};
use crate::run_registry::RunRegistry;

/// Tool names that take a `send`-shaped action and whose successful
/// completion should be remembered to suppress a duplicate downstream
/// reply (spec.md §4.9 "Messaging-tool send tracking").
pub const MESSAGING_TOOLS: &[&str] = &["slack_send", "sessions_send"];

/// Where a driven event stream delivers payloads. Implemented once per
/// in-flight run by the inbound orchestrator, wired to a
/// [`oc_dispatcher::Destination`] plus the channel sender for that run's
/// destination.
#[async_trait]
pub trait RunEventSink: Send + Sync {
    async fn on_tool_result(&self, payload: ReplyPayload);
    async fn on_block_reply(&self, payload: ReplyPayload);
    /// Informational only — no payload is sent for this.
    fn on_model_selected(&self, _model: &str) {}
}

/// What [`AgentEventHandler::drive`] returns once the stream reaches a
/// terminal event (or closes without one).
#[derive(Debug, Clone)]
pub struct DriveOutcome {
    pub terminal: TerminalState,
    pub final_payload: Option<ReplyPayload>,
}

struct PendingTool {
    args: Value,
    #[allow(dead_code)]
    mutating_action: bool,
    #[allow(dead_code)]
    action_fingerprint: String,
    pending_send: Option<PendingSend>,
}

struct PendingSend {
    target: Option<String>,
    text: Option<String>,
}

/// LRU-capped membership set, the same hand-rolled shape as
/// [`crate::dedupe::DedupeStore`] and [`oc_abort::AbortMemory`] — a
/// dedicated LRU crate would be overkill for three small sets.
struct BoundedSet {
    order: VecDeque<String>,
    set: HashSet<String>,
    cap: usize,
}

impl BoundedSet {
    fn new(cap: usize) -> Self {
        Self {
            order: VecDeque::new(),
            set: HashSet::new(),
            cap: cap.max(1),
        }
    }

    fn insert(&mut self, value: String) {
        if self.set.insert(value.clone()) {
            self.order.push_back(value);
            if self.order.len() > self.cap {
                if let Some(oldest) = self.order.pop_front() {
                    self.set.remove(&oldest);
                }
            }
        }
    }

    fn contains(&self, value: &str) -> bool {
        self.set.contains(value)
    }
}

/// Trimmed-via-LRU record of recent messaging-tool sends, used to
/// suppress a duplicate downstream reply repeating what a tool already
/// delivered (spec.md §4.9).
pub struct MessagingToolTracker {
    targets: Mutex<BoundedSet>,
    texts: Mutex<BoundedSet>,
    media_urls: Mutex<BoundedSet>,
}

impl MessagingToolTracker {
    pub fn new(cap: usize) -> Self {
        Self {
            targets: Mutex::new(BoundedSet::new(cap)),
            texts: Mutex::new(BoundedSet::new(cap)),
            media_urls: Mutex::new(BoundedSet::new(cap)),
        }
    }

    fn commit(&self, target: Option<String>, text: Option<String>, media_urls: &[String]) {
        if let Some(t) = target {
            self.targets.lock().insert(t);
        }
        if let Some(t) = text {
            self.texts.lock().insert(t);
        }
        for url in media_urls {
            self.media_urls.lock().insert(url.clone());
        }
    }

    pub fn was_recently_sent_text(&self, text: &str) -> bool {
        self.texts.lock().contains(text)
    }

    pub fn was_recently_sent_target(&self, target: &str) -> bool {
        self.targets.lock().contains(target)
    }

    pub fn was_recently_sent_media(&self, url: &str) -> bool {
        self.media_urls.lock().contains(url)
    }
}

/// Heuristic: tool names that write, send, or otherwise change state
/// outside the conversation, as opposed to pure reads.
fn is_mutating_tool(name: &str) -> bool {
    const MUTATING_SUBSTRINGS: &[&str] = &["write", "send", "delete", "exec", "create", "update", "remove"];
    let lower = name.to_lowercase();
    MUTATING_SUBSTRINGS.iter().any(|s| lower.contains(s))
}

fn action_fingerprint(name: &str, args: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(args.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// One-line tool-call summary shown in non-group chats before the tool
/// has finished (e.g. `"🔧 exec: ls"`).
fn tool_summary(name: &str, args: &Value) -> String {
    let descriptor = args
        .get("command")
        .or_else(|| args.get("query"))
        .or_else(|| args.get("text"))
        .and_then(Value::as_str);
    match descriptor {
        Some(d) => format!("\u{1f527} {name}: {d}"),
        None => format!("\u{1f527} {name}"),
    }
}

fn messaging_send_target(name: &str, args: &Value) -> Option<PendingSend> {
    if !MESSAGING_TOOLS.contains(&name) {
        return None;
    }
    let action = args.get("action").and_then(Value::as_str).unwrap_or("");
    if action != "send" {
        return None;
    }
    let target = args
        .get("to")
        .or_else(|| args.get("target"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let text = args
        .get("text")
        .or_else(|| args.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string);
    Some(PendingSend { target, text })
}

/// Extract media URLs from whichever side actually carries them: the
/// tool's committed args (a caller-supplied `media_urls` array) and/or
/// its parsed output (`media_urls` array or a single `url` string).
fn collect_media_urls(pending_args: Option<&Value>, output: &Value) -> Vec<String> {
    let mut urls = Vec::new();
    let from_value = |v: &Value, urls: &mut Vec<String>| {
        if let Some(arr) = v.get("media_urls").and_then(Value::as_array) {
            urls.extend(arr.iter().filter_map(Value::as_str).map(str::to_string));
        }
        if let Some(u) = v.get("url").and_then(Value::as_str) {
            urls.push(u.to_string());
        }
    };
    if let Some(args) = pending_args {
        from_value(args, &mut urls);
    }
    from_value(output, &mut urls);
    urls.sort();
    urls.dedup();
    urls
}

/// Consumes the event stream for one turn (spec.md §4.9).
pub struct AgentEventHandler {
    run_registry: std::sync::Arc<RunRegistry>,
    messaging_tracker: std::sync::Arc<MessagingToolTracker>,
}

impl AgentEventHandler {
    pub fn new(run_registry: std::sync::Arc<RunRegistry>, messaging_tracker: std::sync::Arc<MessagingToolTracker>) -> Self {
        Self {
            run_registry,
            messaging_tracker,
        }
    }

    pub fn messaging_tracker(&self) -> &MessagingToolTracker {
        &self.messaging_tracker
    }

    /// Drive `events` to completion, calling `sink` for every payload
    /// that should leave the gateway. `is_group` suppresses tool-start
    /// summaries (but never the media a `tool_end` turns up).
    pub async fn drive(&self, session_key: &SessionKey, is_group: bool, mut events: EventStream, sink: &dyn RunEventSink) -> DriveOutcome {
        let mut pending_tools: HashMap<String, PendingTool> = HashMap::new();

        loop {
            let Some(event) = events.next().await else {
                // Stream closed without a terminal event — treat like an
                // abort so the run is never left dangling in the registry.
                self.run_registry.resolve(session_key, TerminalState::Cancelled);
                return DriveOutcome {
                    terminal: TerminalState::Cancelled,
                    final_payload: None,
                };
            };

            match event {
                AgentEvent::ToolStart { tool_call_id, name, args } => {
                    self.run_registry.record_tool_call(session_key, &tool_call_id);
                    let fingerprint = action_fingerprint(&name, &args);
                    let pending_send = messaging_send_target(&name, &args);
                    pending_tools.insert(
                        tool_call_id,
                        PendingTool {
                            args: args.clone(),
                            mutating_action: is_mutating_tool(&name),
                            action_fingerprint: fingerprint,
                            pending_send,
                        },
                    );
                    if !is_group {
                        sink.on_tool_result(ReplyPayload::text(tool_summary(&name, &args))).await;
                    }
                }
                AgentEvent::ToolUpdate { .. } => {
                    // Partial tool output carries no actionable payload on
                    // its own — the committed result arrives at tool_end.
                }
                AgentEvent::ToolEnd { tool_call_id, output, success } => {
                    let pending = pending_tools.remove(&tool_call_id);
                    let media_urls = collect_media_urls(pending.as_ref().map(|p| &p.args), &output);

                    if success {
                        if let Some(send) = pending.as_ref().and_then(|p| p.pending_send.as_ref()) {
                            self.messaging_tracker.commit(send.target.clone(), send.text.clone(), &media_urls);
                        }
                    }

                    if !media_urls.is_empty() {
                        let payload = ReplyPayload {
                            media_urls,
                            ..Default::default()
                        };
                        sink.on_tool_result(payload).await;
                    }
                }
                AgentEvent::Delta { text_so_far, is_reasoning } => {
                    if is_reasoning {
                        continue;
                    }
                    let already_sent = self.run_registry.sent_text_length(session_key);
                    if text_so_far.len() > already_sent {
                        let suffix = &text_so_far[already_sent..];
                        sink.on_block_reply(ReplyPayload::text(suffix.to_string())).await;
                        self.run_registry.set_sent_text_length(session_key, text_so_far.len());
                    }
                }
                AgentEvent::Final { payload } => {
                    self.run_registry.resolve(session_key, TerminalState::EndTurn);
                    return DriveOutcome {
                        terminal: TerminalState::EndTurn,
                        final_payload: Some(payload),
                    };
                }
                AgentEvent::Aborted => {
                    self.run_registry.resolve(session_key, TerminalState::Cancelled);
                    return DriveOutcome {
                        terminal: TerminalState::Cancelled,
                        final_payload: None,
                    };
                }
                AgentEvent::Error { message } => {
                    self.run_registry.resolve(session_key, TerminalState::Refusal);
                    return DriveOutcome {
                        terminal: TerminalState::Refusal,
                        final_payload: Some(ReplyPayload::text(message)),
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use parking_lot::Mutex as SyncMutex;

    use super::*;

    struct RecordingSink {
        tool_results: SyncMutex<Vec<ReplyPayload>>,
        block_replies: SyncMutex<Vec<ReplyPayload>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                tool_results: SyncMutex::new(Vec::new()),
                block_replies: SyncMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RunEventSink for RecordingSink {
        async fn on_tool_result(&self, payload: ReplyPayload) {
            self.tool_results.lock().push(payload);
        }
        async fn on_block_reply(&self, payload: ReplyPayload) {
            self.block_replies.lock().push(payload);
        }
    }

    fn stream(events: Vec<AgentEvent>) -> EventStream {
        Box::pin(futures_util::stream::iter(events))
    }

    fn key() -> SessionKey {
        SessionKey::canonicalize("agent:a:direct:main")
    }

    #[tokio::test]
    async fn deltas_emit_only_new_suffix() {
        let registry = Arc::new(RunRegistry::new());
        registry.start(key(), "idem-1", Utc::now());
        let handler = AgentEventHandler::new(registry, Arc::new(MessagingToolTracker::new(100)));
        let sink = RecordingSink::new();

        let events = stream(vec![
            AgentEvent::Delta { text_so_far: "Hel".into(), is_reasoning: false },
            AgentEvent::Delta { text_so_far: "Hello".into(), is_reasoning: false },
            AgentEvent::Final { payload: ReplyPayload::text("Hello") },
        ]);

        let outcome = handler.drive(&key(), false, events, &sink).await;
        assert_eq!(outcome.terminal, TerminalState::EndTurn);

        let blocks = sink.block_replies.lock();
        assert_eq!(blocks[0].text.as_deref(), Some("Hel"));
        assert_eq!(blocks[1].text.as_deref(), Some("lo"));
    }

    #[tokio::test]
    async fn reasoning_deltas_never_emit() {
        let registry = Arc::new(RunRegistry::new());
        registry.start(key(), "idem-1", Utc::now());
        let handler = AgentEventHandler::new(registry, Arc::new(MessagingToolTracker::new(100)));
        let sink = RecordingSink::new();

        let events = stream(vec![
            AgentEvent::Delta { text_so_far: "thinking...".into(), is_reasoning: true },
            AgentEvent::Final { payload: ReplyPayload::text("done") },
        ]);

        handler.drive(&key(), false, events, &sink).await;
        assert!(sink.block_replies.lock().is_empty());
    }

    #[tokio::test]
    async fn tool_start_summary_suppressed_in_group_chats() {
        let registry = Arc::new(RunRegistry::new());
        registry.start(key(), "idem-1", Utc::now());
        let handler = AgentEventHandler::new(registry, Arc::new(MessagingToolTracker::new(100)));
        let sink = RecordingSink::new();

        let events = stream(vec![
            AgentEvent::ToolStart {
                tool_call_id: "t1".into(),
                name: "exec".into(),
                args: serde_json::json!({"command": "ls"}),
            },
            AgentEvent::ToolEnd {
                tool_call_id: "t1".into(),
                output: serde_json::json!({}),
                success: true,
            },
            AgentEvent::Final { payload: ReplyPayload::text("done") },
        ]);

        handler.drive(&key(), true, events, &sink).await;
        assert!(sink.tool_results.lock().is_empty());
    }

    #[tokio::test]
    async fn tool_start_summary_shown_in_dms() {
        let registry = Arc::new(RunRegistry::new());
        registry.start(key(), "idem-1", Utc::now());
        let handler = AgentEventHandler::new(registry, Arc::new(MessagingToolTracker::new(100)));
        let sink = RecordingSink::new();

        let events = stream(vec![
            AgentEvent::ToolStart {
                tool_call_id: "t1".into(),
                name: "exec".into(),
                args: serde_json::json!({"command": "ls"}),
            },
            AgentEvent::ToolEnd {
                tool_call_id: "t1".into(),
                output: serde_json::json!({}),
                success: true,
            },
            AgentEvent::Final { payload: ReplyPayload::text("done") },
        ]);

        handler.drive(&key(), false, events, &sink).await;
        assert_eq!(sink.tool_results.lock()[0].text.as_deref(), Some("\u{1f527} exec: ls"));
    }

    #[tokio::test]
    async fn tool_end_media_forwarded_even_in_group_chats() {
        let registry = Arc::new(RunRegistry::new());
        registry.start(key(), "idem-1", Utc::now());
        let handler = AgentEventHandler::new(registry, Arc::new(MessagingToolTracker::new(100)));
        let sink = RecordingSink::new();

        let events = stream(vec![
            AgentEvent::ToolStart {
                tool_call_id: "t1".into(),
                name: "image_gen".into(),
                args: serde_json::json!({}),
            },
            AgentEvent::ToolEnd {
                tool_call_id: "t1".into(),
                output: serde_json::json!({"url": "https://example.com/a.png"}),
                success: true,
            },
            AgentEvent::Final { payload: ReplyPayload::text("done") },
        ]);

        handler.drive(&key(), true, events, &sink).await;
        assert_eq!(sink.tool_results.lock()[0].media_urls, vec!["https://example.com/a.png".to_string()]);
    }

    #[tokio::test]
    async fn messaging_tool_send_committed_only_on_success() {
        let registry = Arc::new(RunRegistry::new());
        registry.start(key(), "idem-1", Utc::now());
        let tracker = Arc::new(MessagingToolTracker::new(100));
        let handler = AgentEventHandler::new(registry, tracker.clone());
        let sink = RecordingSink::new();

        let events = stream(vec![
            AgentEvent::ToolStart {
                tool_call_id: "t1".into(),
                name: "slack_send".into(),
                args: serde_json::json!({"action": "send", "to": "#general", "text": "hello team"}),
            },
            AgentEvent::ToolEnd {
                tool_call_id: "t1".into(),
                output: serde_json::json!({}),
                success: true,
            },
            AgentEvent::Final { payload: ReplyPayload::text("done") },
        ]);

        handler.drive(&key(), false, events, &sink).await;
        assert!(tracker.was_recently_sent_target("#general"));
        assert!(tracker.was_recently_sent_text("hello team"));
    }

    #[tokio::test]
    async fn messaging_tool_send_discarded_on_failure() {
        let registry = Arc::new(RunRegistry::new());
        registry.start(key(), "idem-1", Utc::now());
        let tracker = Arc::new(MessagingToolTracker::new(100));
        let handler = AgentEventHandler::new(registry, tracker.clone());
        let sink = RecordingSink::new();

        let events = stream(vec![
            AgentEvent::ToolStart {
                tool_call_id: "t1".into(),
                name: "slack_send".into(),
                args: serde_json::json!({"action": "send", "to": "#general", "text": "hello team"}),
            },
            AgentEvent::ToolEnd {
                tool_call_id: "t1".into(),
                output: serde_json::json!({}),
                success: false,
            },
            AgentEvent::Final { payload: ReplyPayload::text("done") },
        ]);

        handler.drive(&key(), false, events, &sink).await;
        assert!(!tracker.was_recently_sent_target("#general"));
    }

    #[tokio::test]
    async fn aborted_event_resolves_cancelled_with_no_final_payload() {
        let registry = Arc::new(RunRegistry::new());
        registry.start(key(), "idem-1", Utc::now());
        let handler = AgentEventHandler::new(registry.clone(), Arc::new(MessagingToolTracker::new(100)));
        let sink = RecordingSink::new();

        let events = stream(vec![AgentEvent::Aborted]);
        let outcome = handler.drive(&key(), false, events, &sink).await;

        assert_eq!(outcome.terminal, TerminalState::Cancelled);
        assert!(outcome.final_payload.is_none());
        assert!(!registry.is_active(&key()));
    }

    #[tokio::test]
    async fn error_event_resolves_refusal() {
        let registry = Arc::new(RunRegistry::new());
        registry.start(key(), "idem-1", Utc::now());
        let handler = AgentEventHandler::new(registry, Arc::new(MessagingToolTracker::new(100)));
        let sink = RecordingSink::new();

        let events = stream(vec![AgentEvent::Error { message: "model refused".into() }]);
        let outcome = handler.drive(&key(), false, events, &sink).await;

        assert_eq!(outcome.terminal, TerminalState::Refusal);
        assert_eq!(outcome.final_payload.unwrap().text.as_deref(), Some("model refused"));
    }
}
