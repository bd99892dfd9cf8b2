//! Peer chat gateway
//!
//! Persistent, model-agnostic conversation threads on top of a
//! multi-model chat-completions gateway. Each turn is budgeted against the
//! target model's context window, sent upstream once, and appended to its
//! thread atomically.

pub mod api;
pub mod catalog;
pub mod config;
pub mod context;
pub mod conversation;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod metrics;

pub use error::{ChatError, ErrorKind, Result};

/// Common imports for embedding the engine
pub mod prelude {
    pub use crate::catalog::{ModelCapability, ModelCatalog};
    pub use crate::context::{
        build_estimator, BudgetConfig, ContextBudgeter, TokenEstimator, TruncationKind,
        TruncationNotice,
    };
    pub use crate::conversation::{
        AttachmentResolver, ConversationStore, FileConversationStore, InMemoryConversationStore,
        ReasoningEffort, Role, Thread, ThreadSummary, Turn, TurnContent,
    };
    pub use crate::engine::{Continuation, ConversationEngine, TurnRequest, TurnResult};
    pub use crate::error::{ChatError, ErrorKind, Result};
    pub use crate::gateway::{ChatGateway, GatewayError, GatewayReply, OpenRouterGateway};
}
