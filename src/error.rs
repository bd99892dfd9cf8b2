//! Error taxonomy for the chat core
//!
//! Every failure a caller can observe maps to exactly one [`ChatError`]
//! variant. The transport layer relies on [`ChatError::kind`] to build a
//! stable error code, so variants are never collapsed into a generic error.

use crate::context::BudgetError;
use crate::gateway::GatewayError;
use thiserror::Error;

/// Crate-wide error type
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Conversation not found: {0}")]
    NotFound(String),

    #[error("Conversation {id} is unreadable: {reason}")]
    CorruptState { id: String, reason: String },

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Unsupported attachment {source_ref}: {reason}")]
    UnsupportedAttachment { source_ref: String, reason: String },

    #[error("Content too large: need {needed} tokens, budget is {available} tokens")]
    ContentTooLarge { needed: usize, available: usize },

    #[error("Upstream error (status {}): {message}", status.map(|s| s.to_string()).unwrap_or_else(|| "none".to_string()))]
    UpstreamError { status: Option<u16>, message: String },

    #[error("Failed to persist conversation {id}: {reason}")]
    StoreWriteFailed { id: String, reason: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Stable, inspectable error kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    CorruptState,
    UnknownModel,
    UnsupportedAttachment,
    ContentTooLarge,
    UpstreamError,
    StoreWriteFailed,
    InvalidRequest,
    Configuration,
}

impl ErrorKind {
    /// Wire code used in API error bodies
    pub fn as_code(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::CorruptState => "CORRUPT_STATE",
            ErrorKind::UnknownModel => "UNKNOWN_MODEL",
            ErrorKind::UnsupportedAttachment => "UNSUPPORTED_ATTACHMENT",
            ErrorKind::ContentTooLarge => "CONTENT_TOO_LARGE",
            ErrorKind::UpstreamError => "UPSTREAM_ERROR",
            ErrorKind::StoreWriteFailed => "STORE_WRITE_FAILED",
            ErrorKind::InvalidRequest => "INVALID_REQUEST",
            ErrorKind::Configuration => "CONFIGURATION_ERROR",
        }
    }

    /// Whether the caller can reasonably retry with adjusted input
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::ContentTooLarge
                | ErrorKind::UnsupportedAttachment
                | ErrorKind::UpstreamError
                | ErrorKind::StoreWriteFailed
                | ErrorKind::InvalidRequest
        )
    }
}

impl ChatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChatError::NotFound(_) => ErrorKind::NotFound,
            ChatError::CorruptState { .. } => ErrorKind::CorruptState,
            ChatError::UnknownModel(_) => ErrorKind::UnknownModel,
            ChatError::UnsupportedAttachment { .. } => ErrorKind::UnsupportedAttachment,
            ChatError::ContentTooLarge { .. } => ErrorKind::ContentTooLarge,
            ChatError::UpstreamError { .. } => ErrorKind::UpstreamError,
            ChatError::StoreWriteFailed { .. } => ErrorKind::StoreWriteFailed,
            ChatError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            ChatError::Configuration(_) => ErrorKind::Configuration,
        }
    }

    pub fn unsupported_attachment(source_ref: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedAttachment {
            source_ref: source_ref.into(),
            reason: reason.into(),
        }
    }

    pub fn corrupt(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CorruptState {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn write_failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StoreWriteFailed {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

impl From<GatewayError> for ChatError {
    fn from(err: GatewayError) -> Self {
        ChatError::UpstreamError {
            status: err.status,
            message: err.message,
        }
    }
}

impl From<BudgetError> for ChatError {
    fn from(err: BudgetError) -> Self {
        match err {
            BudgetError::ContentTooLarge { needed, available } => {
                ChatError::ContentTooLarge { needed, available }
            }
            BudgetError::ImagesNotSupported { source_ref, model_id } => {
                ChatError::UnsupportedAttachment {
                    source_ref,
                    reason: format!("model {} does not accept images", model_id),
                }
            }
            BudgetError::ConfigurationInvalid(msg) => ChatError::Configuration(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
