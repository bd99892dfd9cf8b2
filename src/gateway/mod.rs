//! Upstream model gateway
//!
//! The engine talks to models only through [`ChatGateway`]: one assembled
//! payload in, one reply (text plus optional images) out. Transport
//! failures surface with the upstream status and message untouched.

pub mod config;
pub mod openrouter;

pub use config::GatewayConfig;
pub use openrouter::OpenRouterGateway;

use crate::context::ChatPayload;
use crate::conversation::ReasoningEffort;
use async_trait::async_trait;

/// Upstream failure, status and message passed through verbatim
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct GatewayError {
    pub status: Option<u16>,
    pub message: String,
}

impl GatewayError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// Image returned by a model, base64-encoded
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyImage {
    pub media_type: String,
    pub data: String,
}

/// Token accounting reported by the upstream, when present
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayReply {
    pub content: String,
    pub images: Vec<ReplyImage>,
    pub usage: Option<TokenUsage>,
}

impl GatewayReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            images: Vec::new(),
            usage: None,
        }
    }
}

#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn send_chat_request(
        &self,
        model_id: &str,
        payload: &ChatPayload,
        reasoning_effort: Option<ReasoningEffort>,
    ) -> Result<GatewayReply, GatewayError>;
}
