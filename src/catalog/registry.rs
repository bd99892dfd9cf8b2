//! Read-only model registry
//!
//! Loaded once at startup and shared behind an `Arc`; there is no runtime
//! mutation, so reads need no synchronization. Reload means restart.

use super::models::ModelCapability;
use crate::config::CatalogConfig;
use crate::error::{ChatError, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

const BUILTIN_CATALOG: &str = include_str!("../../config/models.toml");

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    models: Vec<ModelCapability>,
}

/// Model catalog
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: Vec<ModelCapability>,
}

impl ModelCatalog {
    /// Build a catalog, rejecting empty or inconsistent tables
    pub fn new(models: Vec<ModelCapability>) -> Result<Self> {
        if models.is_empty() {
            return Err(ChatError::Configuration("model catalog is empty".to_string()));
        }

        for (i, model) in models.iter().enumerate() {
            if model.model_id.trim().is_empty() {
                return Err(ChatError::Configuration(format!(
                    "catalog entry {} has an empty model_id",
                    i
                )));
            }
            if model.context_window_tokens == 0 {
                return Err(ChatError::Configuration(format!(
                    "model {} has a zero context window",
                    model.model_id
                )));
            }
            let duplicate = models[..i].iter().any(|m| {
                m.model_id.eq_ignore_ascii_case(&model.model_id)
                    || matches!((&m.alias, &model.alias), (Some(a), Some(b)) if a.eq_ignore_ascii_case(b))
            });
            if duplicate {
                return Err(ChatError::Configuration(format!(
                    "duplicate catalog entry for {}",
                    model.model_id
                )));
            }
        }

        Ok(Self { models })
    }

    /// Catalog shipped with the binary
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_CATALOG)
    }

    /// Parse a `[[models]]` TOML table
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let file: CatalogFile = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ChatError::Configuration(format!("malformed model catalog: {}", e)))?;
        Self::new(file.models)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let file: CatalogFile = config::Config::builder()
            .add_source(config::File::from(path))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| {
                ChatError::Configuration(format!(
                    "failed to load model catalog {}: {}",
                    path.display(),
                    e
                ))
            })?;
        Self::new(file.models)
    }

    /// Load per configuration: file or built-in table, then the allow-list
    pub fn load(config: &CatalogConfig) -> Result<Self> {
        let catalog = match &config.path {
            Some(path) => Self::from_file(path)?,
            None => Self::builtin()?,
        };
        let catalog = catalog.with_allowed(&config.allowed)?;
        info!("Model catalog loaded: {} models", catalog.models.len());
        Ok(catalog)
    }

    /// Restrict to the named models (alias or id). Empty list keeps all.
    pub fn with_allowed(self, allowed: &[String]) -> Result<Self> {
        if allowed.is_empty() {
            return Ok(self);
        }
        let models: Vec<ModelCapability> = self
            .models
            .into_iter()
            .filter(|m| allowed.iter().any(|name| m.matches(name.trim())))
            .collect();
        debug!("Allow-list kept {} models", models.len());
        if models.is_empty() {
            return Err(ChatError::Configuration(format!(
                "allow-list {:?} matches no catalog model",
                allowed
            )));
        }
        Self::new(models)
    }

    /// Resolve a full id or alias to its capability record
    pub fn lookup(&self, model_id: &str) -> Result<&ModelCapability> {
        let name = model_id.trim();
        self.models
            .iter()
            .find(|m| m.model_id.eq_ignore_ascii_case(name))
            .or_else(|| self.models.iter().find(|m| m.matches(name)))
            .ok_or_else(|| ChatError::UnknownModel(model_id.to_string()))
    }

    /// All models in catalog order
    pub fn list_models(&self) -> &[ModelCapability] {
        &self.models
    }

    /// Short name for a full id, falling back to the id itself
    pub fn display_name<'a>(&'a self, model_id: &'a str) -> &'a str {
        self.models
            .iter()
            .find(|m| m.model_id == model_id)
            .map(|m| m.display_name())
            .unwrap_or(model_id)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
