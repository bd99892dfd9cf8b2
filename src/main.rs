use anyhow::Context;
use peer_chat_gateway::{
    api::{build_router, AppState},
    catalog::ModelCatalog,
    config::{AppConfig, LoggingConfig, RetentionConfig},
    context::{build_estimator, ContextBudgeter},
    conversation::{
        prune_threads, AttachmentResolver, Combined, ConversationStore, FileConversationStore,
        MaxAge, MaxCount, RetentionPolicy,
    },
    engine::ConversationEngine,
    gateway::OpenRouterGateway,
    metrics::METRICS,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config_path = std::env::var("MUGW_CONFIG").ok().map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref()).context("Failed to load configuration")?;

    init_tracing(&config.logging);

    let catalog = Arc::new(ModelCatalog::load(&config.catalog).context("Failed to load model catalog")?);

    let estimator = build_estimator(config.budget.estimator, config.budget.chars_per_token)
        .map_err(|e| anyhow::anyhow!("Failed to build token estimator: {}", e))?;
    let budgeter = ContextBudgeter::new(config.budget.clone(), estimator.clone())
        .context("Invalid budget configuration")?;
    let resolver = AttachmentResolver::new(estimator, config.attachments.max_file_bytes);

    let store: Arc<dyn ConversationStore> = Arc::new(
        FileConversationStore::new(config.storage.resolved_dir(), config.storage.cache_capacity)
            .context("Failed to open conversation storage")?,
    );

    let gateway = Arc::new(OpenRouterGateway::new(config.gateway).context("Failed to create gateway client")?);

    let engine = Arc::new(ConversationEngine::new(
        catalog.clone(),
        store.clone(),
        gateway,
        budgeter,
        resolver,
    ));

    if let Some(policy) = retention_policy(&config.retention) {
        spawn_retention_sweep(store, policy, config.retention.sweep_interval_secs);
    }

    let router = build_router(AppState { engine }, config.server.body_limit_bytes);

    let addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Serving {} models on {}", catalog.len(), addr);
    axum::serve(listener, router).await?;

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn retention_policy(config: &RetentionConfig) -> Option<Arc<dyn RetentionPolicy>> {
    if !config.is_enabled() {
        return None;
    }

    let mut policies: Vec<Box<dyn RetentionPolicy>> = Vec::new();
    if let Some(days) = config.max_age_days {
        policies.push(Box::new(MaxAge {
            max_age: chrono::Duration::days(i64::from(days)),
        }));
    }
    if let Some(max_threads) = config.max_threads {
        policies.push(Box::new(MaxCount { max_threads }));
    }
    Some(Arc::new(Combined(policies)))
}

fn spawn_retention_sweep(
    store: Arc<dyn ConversationStore>,
    policy: Arc<dyn RetentionPolicy>,
    interval_secs: u64,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            ticker.tick().await;
            match prune_threads(store.as_ref(), policy.as_ref()).await {
                Ok(removed) => METRICS.threads_pruned.inc_by(removed as f64),
                Err(e) => warn!("Retention sweep failed: {}", e),
            }
        }
    });
}
