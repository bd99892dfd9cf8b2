//! Conversation engine
//!
//! Runs one turn end to end: resolve the thread, budget the request,
//! dispatch it to the gateway once, then persist the user and assistant
//! turns as a single unit. New threads are only created once a reply is
//! in hand, already holding both turns, so a failed first turn leaves
//! nothing behind.

use super::models::{Continuation, TurnPhase, TurnRequest, TurnResult};
use super::prompts::{wrap_request, PromptSet};
use crate::catalog::{ModelCapability, ModelCatalog};
use crate::context::{BudgetError, BudgetedRequest, ContextBudgeter, TruncationKind};
use crate::conversation::{
    Attachment, AttachmentResolver, ConversationStore, ReasoningEffort, Role, Thread, Turn,
    TurnContent,
};
use crate::error::{ChatError, Result};
use crate::gateway::{ChatGateway, GatewayReply};
use crate::metrics::METRICS;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Orchestrates a single conversational turn
pub struct ConversationEngine {
    catalog: Arc<ModelCatalog>,
    store: Arc<dyn ConversationStore>,
    gateway: Arc<dyn ChatGateway>,
    budgeter: ContextBudgeter,
    resolver: AttachmentResolver,
    prompts: PromptSet,
}

impl ConversationEngine {
    pub fn new(
        catalog: Arc<ModelCatalog>,
        store: Arc<dyn ConversationStore>,
        gateway: Arc<dyn ChatGateway>,
        budgeter: ContextBudgeter,
        resolver: AttachmentResolver,
    ) -> Self {
        Self {
            catalog,
            store,
            gateway,
            budgeter,
            resolver,
            prompts: PromptSet::default(),
        }
    }

    pub fn with_prompts(mut self, prompts: PromptSet) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn catalog(&self) -> &Arc<ModelCatalog> {
        &self.catalog
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    /// Run one turn to completion
    pub async fn handle_turn(&self, request: TurnRequest) -> Result<TurnResult> {
        let started = Instant::now();
        let mut phase = TurnPhase::Resolving;

        let result = self.run_turn(request, &mut phase).await;
        let elapsed = started.elapsed().as_secs_f64();

        match &result {
            Ok(done) => {
                METRICS.record_turn("success", elapsed);
                info!(
                    continuation_id = %done.continuation_id,
                    model = %done.model_used,
                    omitted_turns = done.omitted_turns,
                    "Turn completed in {:.2}s",
                    elapsed
                );
            }
            Err(e) => {
                let code = e.kind().as_code();
                METRICS.record_turn(code, elapsed);
                warn!(phase = %phase, code, "Turn failed: {}", e);
            }
        }

        result
    }

    async fn run_turn(&self, request: TurnRequest, phase: &mut TurnPhase) -> Result<TurnResult> {
        if request.prompt.trim().is_empty() && request.attachments.is_empty() {
            return Err(ChatError::InvalidRequest(
                "prompt must not be empty".to_string(),
            ));
        }

        *phase = TurnPhase::Resolving;
        let (thread, title) = self.resolve_thread(request.continuation).await?;

        *phase = TurnPhase::Budgeting;
        let capability = self.catalog.lookup(&request.model_id)?.clone();
        let attachments = self.resolver.resolve_all(&request.attachments).await?;
        let content = TurnContent::text(wrap_request(&request.prompt)).with_attachments(attachments);
        let budgeted = self.budget(thread.as_ref(), content, &capability)?;

        *phase = TurnPhase::Dispatching;
        let effort = effective_effort(request.reasoning_effort, &capability);
        let reply = self.dispatch(&capability, &budgeted, effort).await?;

        *phase = TurnPhase::Persisting;
        let estimator = self.budgeter.estimator().as_ref();
        let reply_images: Vec<Attachment> = reply
            .images
            .into_iter()
            .enumerate()
            .map(|(i, image)| {
                let raw_size = (image.data.len() as u64 * 3) / 4;
                Attachment::image(
                    format!("reply-image-{}", i + 1),
                    image.media_type,
                    raw_size,
                    image.data,
                    estimator,
                )
            })
            .collect();

        let user_turn = Turn::new(
            Role::User,
            &capability.model_id,
            budgeted.current_content,
            effort,
            estimator,
        );
        let assistant_turn = Turn::new(
            Role::Assistant,
            &capability.model_id,
            TurnContent::text(reply.content).with_attachments(reply_images),
            effort,
            estimator,
        );

        let turns = vec![user_turn, assistant_turn.clone()];
        let (written, new_thread) = match thread {
            Some(thread) => {
                let id = thread.continuation_id;
                let written = self
                    .store
                    .append_turns(&id, turns)
                    .await
                    .map(|()| id.clone())
                    .map_err(|e| as_write_failure(&id, e));
                (written, false)
            }
            None => {
                let written = self
                    .store
                    .create_thread_with_turns(title, turns)
                    .await
                    .map_err(|e| as_write_failure("<new>", e));
                (written, true)
            }
        };
        METRICS.record_store_write(written.is_ok());
        let continuation_id = written?;
        if new_thread {
            METRICS.threads_created.inc();
        }

        *phase = TurnPhase::Done;
        Ok(TurnResult {
            continuation_id,
            assistant_turn,
            truncation_notices: budgeted.payload.truncation_notices,
            model_used: capability.display_name().to_string(),
            omitted_turns: budgeted.payload.omitted_turns,
            new_thread,
        })
    }

    /// Existing thread (if any) plus the title for a thread yet to be created
    async fn resolve_thread(
        &self,
        continuation: Continuation,
    ) -> Result<(Option<Thread>, Option<String>)> {
        match continuation {
            Continuation::Existing(id) => {
                let thread = self.store.load_thread(&id).await?;
                debug!("Continuing conversation {} ({} turns)", id, thread.turns.len());
                Ok((Some(thread), None))
            }
            Continuation::Latest => {
                match self.store.list_recent_threads(1).await?.into_iter().next() {
                    Some(id) => {
                        let thread = self.store.load_thread(&id).await?;
                        debug!("Continuing latest conversation {}", id);
                        Ok((Some(thread), None))
                    }
                    None => {
                        debug!("No previous conversation, starting a new one");
                        Ok((None, None))
                    }
                }
            }
            Continuation::New { title } => Ok((None, title)),
        }
    }

    fn budget(
        &self,
        thread: Option<&Thread>,
        content: TurnContent,
        capability: &ModelCapability,
    ) -> Result<BudgetedRequest> {
        let history: &[Turn] = thread.map(|t| t.turns.as_slice()).unwrap_or(&[]);

        let budgeted = self
            .budgeter
            .assemble(&self.prompts.system_prompt, history, content, capability)
            .map_err(|e| {
                if let BudgetError::ContentTooLarge { needed, available } = &e {
                    METRICS.record_token_budget(*needed, 0, true);
                    debug!("Request needs {} tokens, {} available", needed, available);
                }
                ChatError::from(e)
            })?;

        let allocation = &budgeted.payload.allocation;
        METRICS.record_token_budget(allocation.total_allocated, allocation.remaining, false);
        METRICS
            .history_turns_omitted
            .inc_by(budgeted.payload.omitted_turns as f64);
        for notice in &budgeted.payload.truncation_notices {
            METRICS.record_truncation(truncation_label(notice.kind));
        }

        Ok(budgeted)
    }

    async fn dispatch(
        &self,
        capability: &ModelCapability,
        budgeted: &BudgetedRequest,
        effort: Option<ReasoningEffort>,
    ) -> Result<GatewayReply> {
        let reply = crate::time_operation!(
            METRICS.gateway_duration,
            capability.model_id.as_str(),
            self.gateway
                .send_chat_request(&capability.model_id, &budgeted.payload, effort)
                .await
        );

        METRICS.record_gateway(reply.is_ok());
        reply.map_err(ChatError::from)
    }
}

/// Reasoning effort is forwarded only to models that accept it
fn effective_effort(
    requested: Option<ReasoningEffort>,
    capability: &ModelCapability,
) -> Option<ReasoningEffort> {
    match requested {
        Some(effort) if capability.supports_reasoning_effort => Some(effort),
        Some(effort) => {
            debug!(
                "Dropping reasoning effort {} for {}",
                effort.as_str(),
                capability.model_id
            );
            None
        }
        None => None,
    }
}

fn as_write_failure(continuation_id: &str, err: ChatError) -> ChatError {
    match err {
        ChatError::StoreWriteFailed { .. } => err,
        other => ChatError::write_failed(continuation_id, other.to_string()),
    }
}

fn truncation_label(kind: TruncationKind) -> &'static str {
    match kind {
        TruncationKind::AttachmentTruncated => "attachment_truncated",
        TruncationKind::HistoryOmitted => "history_omitted",
        TruncationKind::HistoryImagesStripped => "history_images_stripped",
    }
}
