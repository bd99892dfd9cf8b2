//! Curated model catalog
//!
//! Maps model identifiers to capability records (context window, image
//! support, reasoning-effort support, cost class).

pub mod models;
pub mod registry;

pub use models::{CostClass, ModelCapability};
pub use registry::ModelCatalog;
