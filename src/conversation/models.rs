//! Data models for persisted conversations

use crate::context::TokenEstimator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Reasoning depth requested from models that support it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningEffort::Low => "low",
            ReasoningEffort::Medium => "medium",
            ReasoningEffort::High => "high",
        }
    }
}

/// Rendered attachment content as it is transmitted upstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AttachmentBody {
    Text { text: String },
    /// Base64-encoded image bytes
    Image { data: String },
}

/// A file or image included in a turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub source: String,
    pub media_type: String,
    pub raw_size: u64,
    pub token_estimate: usize,
    #[serde(default)]
    pub truncated: bool,
    pub body: AttachmentBody,
}

impl Attachment {
    /// Build a text attachment, estimating the rendered form
    pub fn text(
        source: impl Into<String>,
        media_type: impl Into<String>,
        raw_size: u64,
        text: String,
        truncated: bool,
        estimator: &dyn TokenEstimator,
    ) -> Self {
        let source = source.into();
        let token_estimate = estimator.estimate(&render_text_attachment(&source, &text, truncated));
        Self {
            source,
            media_type: media_type.into(),
            raw_size,
            token_estimate,
            truncated,
            body: AttachmentBody::Text { text },
        }
    }

    /// Build an image attachment from base64 data, estimating the data URL
    pub fn image(
        source: impl Into<String>,
        media_type: impl Into<String>,
        raw_size: u64,
        data: String,
        estimator: &dyn TokenEstimator,
    ) -> Self {
        let media_type = media_type.into();
        let token_estimate = estimator.estimate(&data_url(&media_type, &data));
        Self {
            source: source.into(),
            media_type,
            raw_size,
            token_estimate,
            truncated: false,
            body: AttachmentBody::Image { data },
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self.body, AttachmentBody::Image { .. })
    }

    /// Text form sent upstream, `None` for images
    pub fn rendered_text(&self) -> Option<String> {
        match &self.body {
            AttachmentBody::Text { text } => {
                Some(render_text_attachment(&self.source, text, self.truncated))
            }
            AttachmentBody::Image { .. } => None,
        }
    }

    /// `data:` URL sent upstream, `None` for text
    pub fn data_url(&self) -> Option<String> {
        match &self.body {
            AttachmentBody::Image { data } => Some(data_url(&self.media_type, data)),
            AttachmentBody::Text { .. } => None,
        }
    }
}

pub fn render_text_attachment(source: &str, text: &str, truncated: bool) -> String {
    if truncated {
        format!("\n--- {} (truncated) ---\n{}", source, text)
    } else {
        format!("\n--- {} ---\n{}", source, text)
    }
}

pub fn data_url(media_type: &str, data: &str) -> String {
    format!("data:{};base64,{}", media_type, data)
}

/// Text plus attachments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnContent {
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl TurnContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn has_images(&self) -> bool {
        self.attachments.iter().any(Attachment::is_image)
    }
}

/// One message in a thread. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub model_id: String,
    pub content: TurnContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,
    pub token_estimate: usize,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    /// Create a turn, caching its token estimate
    pub fn new(
        role: Role,
        model_id: impl Into<String>,
        content: TurnContent,
        reasoning_effort: Option<ReasoningEffort>,
        estimator: &dyn TokenEstimator,
    ) -> Self {
        let token_estimate = estimator.estimate(&content.text)
            + content
                .attachments
                .iter()
                .map(|a| a.token_estimate)
                .sum::<usize>();
        Self {
            role,
            model_id: model_id.into(),
            content,
            reasoning_effort,
            token_estimate,
            timestamp: Utc::now(),
        }
    }

    /// Estimate once images are stripped, for text-only targets
    pub fn text_only_estimate(&self) -> usize {
        let image_tokens: usize = self
            .content
            .attachments
            .iter()
            .filter(|a| a.is_image())
            .map(|a| a.token_estimate)
            .sum();
        self.token_estimate.saturating_sub(image_tokens)
    }
}

/// A persisted conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub continuation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub turns: Vec<Turn>,
}

impl Thread {
    pub fn new(continuation_id: impl Into<String>, title: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            continuation_id: continuation_id.into(),
            title,
            created_at: now,
            updated_at: now,
            turns: Vec::new(),
        }
    }

    /// Append turns in order and bump `updated_at`
    pub fn push_turns(&mut self, turns: &[Turn]) {
        self.turns.extend_from_slice(turns);
        let latest = turns.iter().map(|t| t.timestamp).max();
        let now = Utc::now();
        self.updated_at = latest.map_or(now, |ts| ts.max(now)).max(self.updated_at);
    }

    /// Model of the most recent assistant turn
    pub fn last_model(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.role == Role::Assistant)
            .map(|t| t.model_id.as_str())
    }

    pub fn summary(&self) -> ThreadSummary {
        ThreadSummary {
            continuation_id: self.continuation_id.clone(),
            title: self.title.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            turn_count: self.turns.len(),
            last_model: self.last_model().map(String::from),
        }
    }
}

/// Listing entry for a thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub continuation_id: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub turn_count: usize,
    pub last_model: Option<String>,
}
