//! HTTP API for peer chat and conversation management

pub mod handlers;
pub mod models;
pub mod routes;

pub use handlers::{ApiError, AppState};
pub use routes::build_router;
