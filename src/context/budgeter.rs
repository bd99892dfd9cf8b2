//! Context budgeter
//!
//! Priority order, greedy and deterministic:
//! 1. System prompt and the current turn are reserved first and never dropped.
//! 2. History fills what is left, newest turn first, whole turns only,
//!    stopping at the first turn that does not fit.
//! 3. Oversized text attachments are cut head+tail before reservation.
//! 4. Images are never cut.
//!
//! Omitting history only shapes this request; the persisted thread is
//! untouched.

use super::models::{
    BudgetedRequest, ChatPayload, MessageRole, PayloadMessage, TruncationKind, TruncationNotice,
};
use super::token_budget::{BudgetAllocation, BudgetConfig, BudgetError};
use super::token_estimator::TokenEstimator;
use crate::catalog::ModelCapability;
use crate::conversation::{Attachment, AttachmentBody, Turn, TurnContent};
use std::sync::Arc;
use tracing::{debug, warn};

/// Number of newest turns that fit in `budget`.
///
/// Walks `costs` (oldest first) from the end and stops at the first turn that
/// would overflow, so an older, smaller turn is never pulled in past a larger
/// newer one.
pub fn select_recent_turns(costs: &[usize], budget: usize) -> usize {
    let mut used = 0usize;
    let mut kept = 0usize;
    for cost in costs.iter().rev() {
        match used.checked_add(*cost) {
            Some(total) if total <= budget => {
                used = total;
                kept += 1;
            }
            _ => break,
        }
    }
    kept
}

/// Result of head+tail truncation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadTail {
    pub text: String,
    pub omitted_chars: usize,
}

/// Keep the first `head_chars` and last `tail_chars` characters, replacing
/// the middle with a marker. Text that already fits is returned unchanged.
pub fn truncate_head_tail(text: &str, head_chars: usize, tail_chars: usize) -> HeadTail {
    let total_chars = text.chars().count();
    if head_chars + tail_chars >= total_chars {
        return HeadTail {
            text: text.to_string(),
            omitted_chars: 0,
        };
    }

    let head_end = text
        .char_indices()
        .nth(head_chars)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let tail_start = if tail_chars == 0 {
        text.len()
    } else {
        text.char_indices()
            .nth_back(tail_chars - 1)
            .map(|(i, _)| i)
            .unwrap_or(0)
    };

    let omitted_chars = total_chars - head_chars - tail_chars;
    HeadTail {
        text: format!(
            "{}\n[... {} characters omitted ...]\n{}",
            &text[..head_end],
            omitted_chars,
            &text[tail_start..]
        ),
        omitted_chars,
    }
}

/// Context budgeter
pub struct ContextBudgeter {
    config: BudgetConfig,
    estimator: Arc<dyn TokenEstimator>,
}

impl ContextBudgeter {
    /// Create a new budgeter sharing `estimator` with attachment resolution
    pub fn new(config: BudgetConfig, estimator: Arc<dyn TokenEstimator>) -> Result<Self, BudgetError> {
        config.validate()?;
        Ok(Self { config, estimator })
    }

    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    pub fn estimator(&self) -> &Arc<dyn TokenEstimator> {
        &self.estimator
    }

    /// Assemble a bounded request for `capability`
    pub fn assemble(
        &self,
        system_prompt: &str,
        history: &[Turn],
        current: TurnContent,
        capability: &ModelCapability,
    ) -> Result<BudgetedRequest, BudgetError> {
        let limit = self.config.request_limit(capability.context_window_tokens);

        if !capability.supports_images {
            if let Some(image) = current.attachments.iter().find(|a| a.is_image()) {
                return Err(BudgetError::ImagesNotSupported {
                    source_ref: image.source.clone(),
                    model_id: capability.model_id.clone(),
                });
            }
        }

        let mut notices = Vec::new();

        let TurnContent { text, attachments } = current;
        let attachments: Vec<Attachment> = attachments
            .into_iter()
            .map(|a| self.fit_attachment(a, &mut notices))
            .collect();

        for image in attachments.iter().filter(|a| a.is_image()) {
            if image.token_estimate > limit {
                return Err(BudgetError::ContentTooLarge {
                    needed: image.token_estimate,
                    available: limit,
                });
            }
        }

        let current = TurnContent { text, attachments };
        let system_tokens = self.estimator.estimate(system_prompt);
        let current_tokens = self.estimator.estimate(&current.text)
            + current
                .attachments
                .iter()
                .map(|a| a.token_estimate)
                .sum::<usize>();

        let reserved = system_tokens + current_tokens;
        if reserved > limit {
            warn!(
                "New content exceeds budget for {}: {} > {}",
                capability.model_id, reserved, limit
            );
            return Err(BudgetError::ContentTooLarge {
                needed: reserved,
                available: limit,
            });
        }

        let allow_images = capability.supports_images;
        let costs: Vec<usize> = history
            .iter()
            .map(|t| {
                if allow_images {
                    t.token_estimate
                } else {
                    t.text_only_estimate()
                }
            })
            .collect();

        let kept = select_recent_turns(&costs, limit - reserved);
        let start = history.len() - kept;
        let history_tokens: usize = costs[start..].iter().sum();

        if start > 0 {
            notices.push(TruncationNotice {
                kind: TruncationKind::HistoryOmitted,
                subject: format!("{} older turns", start),
                original_tokens: costs[..start].iter().sum(),
                kept_tokens: 0,
            });
        }

        if !allow_images {
            for (offset, turn) in history[start..].iter().enumerate() {
                if turn.content.has_images() {
                    notices.push(TruncationNotice {
                        kind: TruncationKind::HistoryImagesStripped,
                        subject: format!("history turn {}", start + offset),
                        original_tokens: turn.token_estimate,
                        kept_tokens: turn.text_only_estimate(),
                    });
                }
            }
        }

        let mut messages = Vec::with_capacity(kept + 2);
        messages.push(PayloadMessage::system(system_prompt, system_tokens));
        messages.extend(
            history[start..]
                .iter()
                .map(|t| PayloadMessage::from_turn(t, allow_images)),
        );
        messages.push(PayloadMessage::from_content(
            MessageRole::User,
            &current,
            allow_images,
            current_tokens,
        ));

        let allocation = BudgetAllocation::new(system_tokens, current_tokens, history_tokens, limit);

        debug!(
            "Token allocation for {}: system={}, current={}, history={} ({} of {} turns), total={}, limit={}",
            capability.model_id,
            system_tokens,
            current_tokens,
            history_tokens,
            kept,
            history.len(),
            allocation.total_allocated,
            limit
        );

        Ok(BudgetedRequest {
            payload: ChatPayload {
                messages,
                allocation,
                included_turns: kept,
                omitted_turns: start,
                truncation_notices: notices,
            },
            current_content: current,
        })
    }

    /// Apply the per-file ceiling to a text attachment
    fn fit_attachment(&self, attachment: Attachment, notices: &mut Vec<TruncationNotice>) -> Attachment {
        let ceiling = self.config.per_file_ceiling_tokens;
        if attachment.token_estimate <= ceiling {
            return attachment;
        }
        let text = match &attachment.body {
            AttachmentBody::Text { text } => text,
            AttachmentBody::Image { .. } => return attachment,
        };

        let total_chars = text.chars().count();
        let ratio = ceiling as f64 / attachment.token_estimate as f64;
        let mut keep = (total_chars as f64 * ratio).floor() as usize;

        let fitted = loop {
            let head = (keep as f64 * self.config.truncation_head_share).round() as usize;
            let tail = keep - head.min(keep);
            let cut = truncate_head_tail(text, head, tail);
            let candidate = Attachment::text(
                attachment.source.clone(),
                attachment.media_type.clone(),
                attachment.raw_size,
                cut.text,
                true,
                self.estimator.as_ref(),
            );
            if candidate.token_estimate <= ceiling || keep == 0 {
                break candidate;
            }
            keep = keep * 9 / 10;
        };

        debug!(
            "Truncated attachment {}: {} -> {} tokens",
            attachment.source, attachment.token_estimate, fitted.token_estimate
        );

        notices.push(TruncationNotice {
            kind: TruncationKind::AttachmentTruncated,
            subject: attachment.source.clone(),
            original_tokens: attachment.token_estimate,
            kept_tokens: fitted.token_estimate,
        });

        fitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CostClass;
    use crate::context::CharRatioEstimator;
    use crate::conversation::Role;

    fn capability(window: usize, images: bool) -> ModelCapability {
        ModelCapability {
            model_id: "test/model".to_string(),
            alias: Some("model".to_string()),
            description: String::new(),
            context_window_tokens: window,
            supports_images: images,
            supports_reasoning_effort: false,
            cost_class: CostClass::Low,
        }
    }

    fn budgeter(ceiling: usize) -> ContextBudgeter {
        let config = BudgetConfig {
            per_file_ceiling_tokens: ceiling,
            ..Default::default()
        };
        ContextBudgeter::new(config, Arc::new(CharRatioEstimator::default())).unwrap()
    }

    /// A turn whose cached estimate is exactly `tokens`
    fn turn_of(tokens: usize) -> Turn {
        let est = CharRatioEstimator::default();
        Turn::new(Role::User, "test/model", TurnContent::text("x".repeat(tokens * 4)), None, &est)
    }

    #[test]
    fn test_recency_stops_at_first_overflow() {
        assert_eq!(select_recent_turns(&[100, 50, 200, 30], 90), 1);
    }

    #[test]
    fn test_recency_includes_all_when_budget_allows() {
        assert_eq!(select_recent_turns(&[10, 20, 30], 60), 3);
        assert_eq!(select_recent_turns(&[10, 20, 30], 59), 2);
        assert_eq!(select_recent_turns(&[], 100), 0);
        assert_eq!(select_recent_turns(&[5], 0), 0);
    }

    #[test]
    fn test_equal_sizes_prefer_newer() {
        assert_eq!(select_recent_turns(&[40, 40, 40], 80), 2);
    }

    #[test]
    fn test_head_tail_keeps_ends() {
        let text = format!("HEAD{}TAIL", "m".repeat(100));
        let cut = truncate_head_tail(&text, 4, 4);
        assert!(cut.text.starts_with("HEAD\n"));
        assert!(cut.text.ends_with("\nTAIL"));
        assert_eq!(cut.omitted_chars, 100);
    }

    #[test]
    fn test_head_tail_respects_char_boundaries() {
        let cut = truncate_head_tail("ééééé", 1, 1);
        assert!(cut.text.starts_with('é'));
        assert!(cut.text.ends_with('é'));
        assert_eq!(cut.omitted_chars, 3);
    }

    #[test]
    fn test_head_tail_noop_when_short() {
        let cut = truncate_head_tail("short", 10, 10);
        assert_eq!(cut.text, "short");
        assert_eq!(cut.omitted_chars, 0);
    }

    #[test]
    fn test_history_selection_in_payload() {
        // window 1000 -> limit 900
        let budgeter = budgeter(50_000);
        let history: Vec<Turn> = [100, 50, 200, 30].iter().map(|&t| turn_of(t)).collect();
        // system prompt 10 tokens, new text 800 tokens -> 90 left for history
        let system = "s".repeat(40);
        let current = TurnContent::text("c".repeat(3200));
        let request = budgeter
            .assemble(&system, &history, current, &capability(1000, true))
            .unwrap();

        let payload = request.payload;
        assert_eq!(payload.included_turns, 1);
        assert_eq!(payload.omitted_turns, 3);
        assert_eq!(payload.allocation.history_tokens, 30);
        assert_eq!(payload.messages.len(), 3);
        assert!(payload.total_tokens() <= 900);
        assert!(payload
            .truncation_notices
            .iter()
            .any(|n| n.kind == TruncationKind::HistoryOmitted));
    }

    #[test]
    fn test_payload_never_exceeds_limit() {
        let budgeter = budgeter(50_000);
        for window in [200usize, 500, 1000, 4000] {
            for new_tokens in [0usize, 10, 100, 150] {
                let history: Vec<Turn> = (0..12).map(|i| turn_of(5 + (i * 37) % 90)).collect();
                let current = TurnContent::text("n".repeat(new_tokens * 4));
                let limit = budgeter.config().request_limit(window);
                match budgeter.assemble("system", &history, current, &capability(window, true)) {
                    Ok(request) => {
                        assert!(request.payload.total_tokens() <= limit);
                        assert_eq!(request.payload.allocation.total_allocated, request.payload.total_tokens());
                        // current turn is always the last message
                        let last = request.payload.messages.last().unwrap();
                        assert_eq!(last.role, MessageRole::User);
                        assert_eq!(last.token_estimate, new_tokens);
                    }
                    Err(BudgetError::ContentTooLarge { needed, available }) => {
                        assert!(needed > available);
                    }
                    Err(other) => panic!("unexpected error: {other}"),
                }
            }
        }
    }

    #[test]
    fn test_new_content_too_large() {
        let budgeter = budgeter(50_000);
        let current = TurnContent::text("c".repeat(4000));
        let err = budgeter
            .assemble("sys", &[], current, &capability(1000, true))
            .unwrap_err();
        assert!(matches!(err, BudgetError::ContentTooLarge { needed, available: 900 } if needed > 900));
    }

    #[test]
    fn test_image_rejected_for_text_only_model() {
        let budgeter = budgeter(50_000);
        let est = CharRatioEstimator::default();
        let current = TurnContent::text("look")
            .with_attachments(vec![Attachment::image("p.png", "image/png", 3, "QUJD".into(), &est)]);
        let err = budgeter
            .assemble("sys", &[], current, &capability(100_000, false))
            .unwrap_err();
        assert!(matches!(err, BudgetError::ImagesNotSupported { .. }));
    }

    #[test]
    fn test_oversized_image_is_not_truncated() {
        // ceiling far below the image size: images are exempt from truncation
        let budgeter = budgeter(5);
        let est = CharRatioEstimator::default();
        let image = Attachment::image("p.png", "image/png", 3000, "A".repeat(4000), &est);
        let current = TurnContent::text("look").with_attachments(vec![image.clone()]);
        let err = budgeter
            .assemble("sys", &[], current.clone(), &capability(1000, true))
            .unwrap_err();
        assert!(matches!(err, BudgetError::ContentTooLarge { needed, .. } if needed == image.token_estimate));

        let ok = budgeter
            .assemble("sys", &[], current, &capability(100_000, true))
            .unwrap();
        assert_eq!(ok.current_content.attachments[0], image);
    }

    #[test]
    fn test_oversized_file_truncated_and_marked() {
        let budgeter = budgeter(100);
        let est = CharRatioEstimator::default();
        let body = format!("BEGIN{}END", "z".repeat(4000));
        let file = Attachment::text("big.log", "text/plain", body.len() as u64, body, false, &est);
        let original = file.token_estimate;
        assert!(original > 100);

        let current = TurnContent::text("summarize").with_attachments(vec![file]);
        let request = budgeter
            .assemble("sys", &[], current, &capability(100_000, true))
            .unwrap();

        let fitted = &request.current_content.attachments[0];
        assert!(fitted.truncated);
        assert!(fitted.token_estimate <= 100);
        match &fitted.body {
            AttachmentBody::Text { text } => {
                assert!(text.starts_with("BEGIN"));
                assert!(text.ends_with("END"));
                assert!(text.contains("characters omitted"));
            }
            AttachmentBody::Image { .. } => panic!("expected text"),
        }
        let notice = request
            .payload
            .truncation_notices
            .iter()
            .find(|n| n.kind == TruncationKind::AttachmentTruncated)
            .unwrap();
        assert_eq!(notice.original_tokens, original);
        assert_eq!(notice.kept_tokens, fitted.token_estimate);
        assert_eq!(
            request.payload.allocation.current_turn_tokens,
            est.estimate("summarize") + fitted.token_estimate
        );
    }

    #[test]
    fn test_history_images_stripped_for_text_only_target() {
        let budgeter = budgeter(50_000);
        let est = CharRatioEstimator::default();
        let with_image = Turn::new(
            Role::User,
            "vision/model",
            TurnContent::text("see this")
                .with_attachments(vec![Attachment::image("p.png", "image/png", 3, "QUJD".into(), &est)]),
            None,
            &est,
        );
        let request = budgeter
            .assemble("sys", &[with_image.clone()], TurnContent::text("and now?"), &capability(10_000, false))
            .unwrap();

        assert_eq!(request.payload.included_turns, 1);
        assert_eq!(request.payload.allocation.history_tokens, with_image.text_only_estimate());
        assert_eq!(request.payload.messages[1].parts.len(), 1);
        assert!(request
            .payload
            .truncation_notices
            .iter()
            .any(|n| n.kind == TruncationKind::HistoryImagesStripped));
    }
}
