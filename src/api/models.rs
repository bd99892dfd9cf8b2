//! Request and response bodies for the HTTP API

use crate::catalog::{CostClass, ModelCapability};
use crate::context::TruncationNotice;
use crate::conversation::ReasoningEffort;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Chat request
///
/// Provide at most one of `title` (new conversation) and `continuation_id`.
/// `continue_latest` picks up the most recently updated conversation.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub prompt: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub continuation_id: Option<String>,
    #[serde(default)]
    pub continue_latest: bool,
    /// Text or image files, detected by content
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub reasoning_effort: Option<ReasoningEffort>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Model reply followed by the peer response wrapper
    pub content: String,
    pub continuation_id: String,
    pub model_used: String,
    pub new_thread: bool,
    pub omitted_turns: usize,
    pub truncation_notices: Vec<TruncationNotice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub model_id: String,
    pub description: String,
    pub context_window_tokens: usize,
    pub supports_images: bool,
    pub supports_reasoning_effort: bool,
    pub cost_class: CostClass,
}

impl From<&ModelCapability> for ModelInfo {
    fn from(model: &ModelCapability) -> Self {
        Self {
            name: model.display_name().to_string(),
            model_id: model.model_id.clone(),
            description: model.description.clone(),
            context_window_tokens: model.context_window_tokens,
            supports_images: model.supports_images,
            supports_reasoning_effort: model.supports_reasoning_effort,
            cost_class: model.cost_class,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelListResponse {
    pub models: Vec<ModelInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Most recent conversation and the model that last answered in it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestConversation {
    pub continuation_id: String,
    pub title: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub model_used: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub models: usize,
}
