//! Turn orchestration

pub mod conversation_engine;
pub mod models;
pub mod prompts;

pub use conversation_engine::ConversationEngine;
pub use models::{Continuation, TurnPhase, TurnRequest, TurnResult};
pub use prompts::{wrap_response, PromptSet};
