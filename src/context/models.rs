//! Data models for assembled request payloads

use super::token_budget::BudgetAllocation;
use crate::conversation::{Role, Turn, TurnContent};
use serde::{Deserialize, Serialize};

/// Role of a message in the upstream request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl From<Role> for MessageRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => MessageRole::User,
            Role::Assistant => MessageRole::Assistant,
        }
    }
}

/// One content part of a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PayloadPart {
    Text { text: String },
    ImageUrl { url: String },
}

/// A message ready for the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadMessage {
    pub role: MessageRole,
    pub parts: Vec<PayloadPart>,
    pub token_estimate: usize,
}

impl PayloadMessage {
    pub fn system(text: impl Into<String>, token_estimate: usize) -> Self {
        Self {
            role: MessageRole::System,
            parts: vec![PayloadPart::Text { text: text.into() }],
            token_estimate,
        }
    }

    /// Render stored content, dropping images when `allow_images` is false
    pub fn from_content(
        role: MessageRole,
        content: &TurnContent,
        allow_images: bool,
        token_estimate: usize,
    ) -> Self {
        let mut parts = vec![PayloadPart::Text {
            text: content.text.clone(),
        }];
        for attachment in &content.attachments {
            if let Some(text) = attachment.rendered_text() {
                parts.push(PayloadPart::Text { text });
            } else if allow_images {
                if let Some(url) = attachment.data_url() {
                    parts.push(PayloadPart::ImageUrl { url });
                }
            }
        }
        Self {
            role,
            parts,
            token_estimate,
        }
    }

    pub fn from_turn(turn: &Turn, allow_images: bool) -> Self {
        let estimate = if allow_images {
            turn.token_estimate
        } else {
            turn.text_only_estimate()
        };
        Self::from_content(turn.role.into(), &turn.content, allow_images, estimate)
    }

    /// Concatenated text parts
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                PayloadPart::Text { text } => Some(text.as_str()),
                PayloadPart::ImageUrl { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// What was cut from a request and why
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncationKind {
    /// Head+tail truncation of an oversized text attachment
    AttachmentTruncated,
    /// Older history turns left out of this request
    HistoryOmitted,
    /// Images dropped from history for a text-only model
    HistoryImagesStripped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruncationNotice {
    pub kind: TruncationKind,
    pub subject: String,
    pub original_tokens: usize,
    pub kept_tokens: usize,
}

/// Ordered, budgeted request content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatPayload {
    pub messages: Vec<PayloadMessage>,
    pub allocation: BudgetAllocation,
    pub included_turns: usize,
    pub omitted_turns: usize,
    pub truncation_notices: Vec<TruncationNotice>,
}

impl ChatPayload {
    /// Sum of per-message estimates
    pub fn total_tokens(&self) -> usize {
        self.messages.iter().map(|m| m.token_estimate).sum()
    }
}

/// Budgeter output: payload plus the current turn as it was transmitted
#[derive(Debug, Clone)]
pub struct BudgetedRequest {
    pub payload: ChatPayload,
    pub current_content: TurnContent,
}
