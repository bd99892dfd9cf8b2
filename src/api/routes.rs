//! Router wiring

use super::handlers::{self, AppState};
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Build the application router
pub fn build_router(state: AppState, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/api/v1/chat", post(handlers::chat))
        .route("/api/v1/models", get(handlers::list_models))
        .route("/api/v1/conversations", get(handlers::list_conversations))
        .route(
            "/api/v1/conversations/latest",
            get(handlers::latest_conversation),
        )
        .route(
            "/api/v1/conversations/:id",
            get(handlers::get_conversation).delete(handlers::delete_conversation),
        )
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .layer(RequestBodyLimitLayer::new(body_limit_bytes))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
