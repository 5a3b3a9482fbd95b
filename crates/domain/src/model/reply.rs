//! Reply payloads handed to the dispatcher.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplyPayload {
    pub text: Option<String>,
    #[serde(default)]
    pub media_urls: Vec<String>,
    pub media_url: Option<String>,
    pub reply_to_id: Option<String>,
    #[serde(default)]
    pub is_reasoning: bool,
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl ReplyPayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// `true` when there is nothing to send — no text and no media.
    pub fn is_empty_payload(&self) -> bool {
        let text_empty = match &self.text {
            None => true,
            Some(t) => t.is_empty() || t == "NO_REPLY",
        };
        text_empty && self.media_urls.is_empty() && self.media_url.is_none() && self.attachments.is_empty()
    }

    /// Media-only payloads are still forwarded even when text is empty or
    /// the `NO_REPLY` sentinel.
    pub fn has_media(&self) -> bool {
        !self.media_urls.is_empty() || self.media_url.is_some() || !self.attachments.is_empty()
    }
}
