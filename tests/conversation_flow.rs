//! Integration tests for the conversation pipeline
//!
//! These tests drive the engine against the file-backed store with a
//! scripted gateway, covering persistence across turns, budgeting of
//! long histories and oversized attachments, and failure isolation.

use async_trait::async_trait;
use peer_chat_gateway::context::{ChatPayload, MessageRole, PayloadPart};
use peer_chat_gateway::conversation::DEFAULT_MAX_FILE_BYTES;
use peer_chat_gateway::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Records every payload it receives and echoes a numbered reply
#[derive(Default)]
struct ScriptedGateway {
    calls: AtomicUsize,
    payloads: Mutex<Vec<ChatPayload>>,
}

#[async_trait]
impl ChatGateway for ScriptedGateway {
    async fn send_chat_request(
        &self,
        _model_id: &str,
        payload: &ChatPayload,
        _reasoning_effort: Option<ReasoningEffort>,
    ) -> std::result::Result<GatewayReply, GatewayError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.payloads.lock().unwrap().push(payload.clone());
        Ok(GatewayReply::text(format!("answer {}", n)))
    }
}

fn catalog_with_small_model() -> ModelCatalog {
    let mut models = ModelCatalog::builtin().unwrap().list_models().to_vec();
    models.push(ModelCapability {
        model_id: "test/tiny".to_string(),
        alias: Some("tiny".to_string()),
        description: "Tiny test model".to_string(),
        context_window_tokens: 2_000,
        supports_images: false,
        supports_reasoning_effort: false,
        cost_class: peer_chat_gateway::catalog::CostClass::Low,
    });
    ModelCatalog::new(models).unwrap()
}

fn build_engine(
    dir: &std::path::Path,
    gateway: Arc<ScriptedGateway>,
) -> (Arc<FileConversationStore>, ConversationEngine) {
    let estimator = build_estimator(Default::default(), 4.0).unwrap();
    let budget = BudgetConfig {
        per_file_ceiling_tokens: 500,
        ..BudgetConfig::default()
    };
    let budgeter = ContextBudgeter::new(budget, estimator.clone()).unwrap();
    let resolver = AttachmentResolver::new(estimator, DEFAULT_MAX_FILE_BYTES);
    let store = Arc::new(FileConversationStore::new(dir.join("conversations"), 32).unwrap());
    let engine = ConversationEngine::new(
        Arc::new(catalog_with_small_model()),
        store.clone(),
        gateway,
        budgeter,
        resolver,
    );
    (store, engine)
}

#[tokio::test]
async fn test_thread_persists_across_engine_restart() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(ScriptedGateway::default());

    let id = {
        let (_store, engine) = build_engine(dir.path(), gateway.clone());
        let first = engine
            .handle_turn(TurnRequest::new("gpt-5", "Review this design").with_title("Design"))
            .await
            .unwrap();
        first.continuation_id
    };

    let (store, engine) = build_engine(dir.path(), gateway.clone());
    let second = engine
        .handle_turn(TurnRequest::new("gemini-2.5-pro", "And the risks?").continuing(&id))
        .await
        .unwrap();
    assert_eq!(second.continuation_id, id);
    assert_eq!(second.model_used, "gemini-2.5-pro");

    let thread = store.load_thread(&id).await.unwrap();
    assert_eq!(thread.title.as_deref(), Some("Design"));
    let texts: Vec<&str> = thread.turns.iter().map(|t| t.content.text.as_str()).collect();
    assert!(texts[0].starts_with("Review this design"));
    assert_eq!(texts[1], "answer 1");
    assert!(texts[2].starts_with("And the risks?"));
    assert_eq!(texts[3], "answer 2");
}

#[tokio::test]
async fn test_long_history_keeps_most_recent_turns() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(ScriptedGateway::default());
    let (_store, engine) = build_engine(dir.path(), gateway.clone());

    // each prompt is ~100 tokens; the tiny model allows 1800 per request
    let filler = "x".repeat(400);
    let first = engine
        .handle_turn(TurnRequest::new("tiny", format!("turn 0 {}", filler)))
        .await
        .unwrap();
    let mut last = first.clone();
    for i in 1..30 {
        last = engine
            .handle_turn(
                TurnRequest::new("tiny", format!("turn {} {}", i, filler))
                    .continuing(&first.continuation_id),
            )
            .await
            .unwrap();
    }

    assert!(last.omitted_turns > 0);
    assert!(last
        .truncation_notices
        .iter()
        .any(|n| n.kind == TruncationKind::HistoryOmitted));

    let payloads = gateway.payloads.lock().unwrap();
    let final_payload = payloads.last().unwrap();
    assert!(final_payload.total_tokens() <= 1_800);
    assert_eq!(final_payload.allocation.total_allocated, final_payload.total_tokens());

    // the newest history turn is the previous reply
    let history = &final_payload.messages[1..final_payload.messages.len() - 1];
    let newest = history.last().unwrap();
    assert_eq!(newest.role, MessageRole::Assistant);
    assert_eq!(newest.text(), "answer 29");
}

#[tokio::test]
async fn test_oversized_attachment_is_truncated_and_marked() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("build.log");
    let body = format!("FIRST LINE\n{}\nLAST LINE", "noise ".repeat(2_000));
    std::fs::write(&log, &body).unwrap();

    let gateway = Arc::new(ScriptedGateway::default());
    let (store, engine) = build_engine(dir.path(), gateway.clone());

    let result = engine
        .handle_turn(
            TurnRequest::new("gpt-5", "why did the build fail?")
                .with_attachments(vec![log.to_string_lossy().to_string()]),
        )
        .await
        .unwrap();

    let notice = result
        .truncation_notices
        .iter()
        .find(|n| n.kind == TruncationKind::AttachmentTruncated)
        .expect("attachment truncation notice");
    assert!(notice.kept_tokens <= 500);
    assert!(notice.original_tokens > notice.kept_tokens);

    let payloads = gateway.payloads.lock().unwrap();
    let user = payloads[0].messages.last().unwrap();
    let attachment_text = match &user.parts[1] {
        PayloadPart::Text { text } => text.clone(),
        other => panic!("unexpected part {other:?}"),
    };
    assert!(attachment_text.contains("(truncated)"));
    assert!(attachment_text.contains("FIRST LINE"));
    assert!(attachment_text.ends_with("LAST LINE"));

    // the persisted turn carries the truncated form and its estimate
    let thread = store.load_thread(&result.continuation_id).await.unwrap();
    let stored = &thread.turns[0].content.attachments[0];
    assert!(stored.truncated);
    assert_eq!(stored.token_estimate, notice.kept_tokens);
}

#[tokio::test]
async fn test_parallel_threads_do_not_interfere() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(ScriptedGateway::default());
    let (store, engine) = build_engine(dir.path(), gateway.clone());
    let engine = Arc::new(engine);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .handle_turn(TurnRequest::new("gpt-5", format!("thread {}", i)))
                    .await
            })
        })
        .collect();

    let mut ids = Vec::new();
    for result in futures::future::join_all(handles).await {
        ids.push(result.unwrap().unwrap().continuation_id);
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8);

    let summaries = store.list_thread_summaries(100).await.unwrap();
    assert_eq!(summaries.len(), 8);
    assert!(summaries.iter().all(|s| s.turn_count == 2));
}

#[tokio::test]
async fn test_failed_turn_leaves_thread_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(ScriptedGateway::default());
    let (store, engine) = build_engine(dir.path(), gateway.clone());

    let first = engine.handle_turn(TurnRequest::new("gpt-5", "hello")).await.unwrap();
    let err = engine
        .handle_turn(
            TurnRequest::new("gpt-5", "see attached")
                .continuing(&first.continuation_id)
                .with_attachments(vec!["/no/such/file.txt".to_string()]),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UnsupportedAttachment);
    assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
    let thread = store.load_thread(&first.continuation_id).await.unwrap();
    assert_eq!(thread.turns.len(), 2);
}
