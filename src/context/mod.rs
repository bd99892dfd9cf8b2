//! Context assembly with token budget enforcement
//!
//! Turns a thread's history plus the caller's new content into a request
//! that fits the target model's context window.

pub mod budgeter;
pub mod models;
pub mod token_budget;
pub mod token_estimator;

pub use budgeter::{select_recent_turns, truncate_head_tail, ContextBudgeter, HeadTail};
pub use models::{
    BudgetedRequest, ChatPayload, MessageRole, PayloadMessage, PayloadPart, TruncationKind,
    TruncationNotice,
};
pub use token_budget::{BudgetAllocation, BudgetConfig, BudgetError};
pub use token_estimator::{
    build_estimator, CharRatioEstimator, EstimatorKind, TiktokenEstimator, TokenEstimator,
};
