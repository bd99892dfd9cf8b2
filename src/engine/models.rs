//! Turn request and result types

use crate::context::TruncationNotice;
use crate::conversation::{ReasoningEffort, Turn};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which thread a turn belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Continuation {
    /// Start a new thread, optionally titled
    New { title: Option<String> },
    /// Continue the most recently updated thread, or start one if none exist
    Latest,
    Existing(String),
}

impl Continuation {
    /// Build from transport fields; a title with an explicit id is rejected
    pub fn from_parts(
        continuation_id: Option<String>,
        title: Option<String>,
        latest: bool,
    ) -> Result<Self, String> {
        let title = title.filter(|t| !t.trim().is_empty());
        match (continuation_id, title, latest) {
            (Some(_), Some(_), _) => Err(
                "provide either 'title' for a new conversation or 'continuation_id', not both"
                    .to_string(),
            ),
            (Some(_), None, true) => {
                Err("'continuation_id' and 'latest' are mutually exclusive".to_string())
            }
            (Some(id), None, false) => Ok(Continuation::Existing(id)),
            (None, Some(_), true) => {
                Err("'title' only applies to new conversations, not 'latest'".to_string())
            }
            (None, None, true) => Ok(Continuation::Latest),
            (None, title, false) => Ok(Continuation::New { title }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub continuation: Continuation,
    pub model_id: String,
    pub prompt: String,
    /// Attachment references: local paths or `file://` URIs
    pub attachments: Vec<String>,
    pub reasoning_effort: Option<ReasoningEffort>,
}

impl TurnRequest {
    pub fn new(model_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            continuation: Continuation::New { title: None },
            model_id: model_id.into(),
            prompt: prompt.into(),
            attachments: Vec::new(),
            reasoning_effort: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.continuation = Continuation::New {
            title: Some(title.into()),
        };
        self
    }

    pub fn continuing(mut self, continuation_id: impl Into<String>) -> Self {
        self.continuation = Continuation::Existing(continuation_id.into());
        self
    }

    pub fn continuing_latest(mut self) -> Self {
        self.continuation = Continuation::Latest;
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<String>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_reasoning_effort(mut self, effort: ReasoningEffort) -> Self {
        self.reasoning_effort = Some(effort);
        self
    }
}

/// Outcome of a completed turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResult {
    pub continuation_id: String,
    pub assistant_turn: Turn,
    pub truncation_notices: Vec<TruncationNotice>,
    /// Short name of the model that answered
    pub model_used: String,
    pub omitted_turns: usize,
    pub new_thread: bool,
}

/// Pipeline phase, carried into failure logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Resolving,
    Budgeting,
    Dispatching,
    Persisting,
    Done,
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnPhase::Resolving => "resolving",
            TurnPhase::Budgeting => "budgeting",
            TurnPhase::Dispatching => "dispatching",
            TurnPhase::Persisting => "persisting",
            TurnPhase::Done => "done",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_continuation_from_parts() {
        assert_eq!(
            Continuation::from_parts(Some("abc".into()), None, false).unwrap(),
            Continuation::Existing("abc".into())
        );
        assert_eq!(
            Continuation::from_parts(None, Some("Design review".into()), false).unwrap(),
            Continuation::New {
                title: Some("Design review".into())
            }
        );
        assert_eq!(
            Continuation::from_parts(None, None, true).unwrap(),
            Continuation::Latest
        );
        assert!(Continuation::from_parts(Some("abc".into()), Some("t".into()), false).is_err());
        assert!(Continuation::from_parts(Some("abc".into()), None, true).is_err());
    }

    #[test]
    fn test_blank_title_is_ignored() {
        assert_eq!(
            Continuation::from_parts(Some("abc".into()), Some("  ".into()), false).unwrap(),
            Continuation::Existing("abc".into())
        );
    }
}
