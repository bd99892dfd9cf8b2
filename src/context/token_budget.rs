//! Token budget policy for a single request
//!
//! The request limit for a model is `floor(context_window * safety_margin)`.
//! The margin reserves room for the completion and for estimator error.

use super::token_estimator::EstimatorKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Token budget configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Fraction of the context window usable by the request
    #[serde(default = "default_safety_margin")]
    pub safety_margin: f64,

    /// Per-attachment ceiling before head+tail truncation kicks in
    #[serde(default = "default_per_file_ceiling")]
    pub per_file_ceiling_tokens: usize,

    /// Share of the ceiling kept from the start of a truncated file
    #[serde(default = "default_head_share")]
    pub truncation_head_share: f64,

    #[serde(default)]
    pub estimator: EstimatorKind,

    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: f64,
}

fn default_safety_margin() -> f64 { 0.9 }
fn default_per_file_ceiling() -> usize { 50_000 }
fn default_head_share() -> f64 { 0.5 }
fn default_chars_per_token() -> f64 { 4.0 }

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            safety_margin: default_safety_margin(),
            per_file_ceiling_tokens: default_per_file_ceiling(),
            truncation_head_share: default_head_share(),
            estimator: EstimatorKind::default(),
            chars_per_token: default_chars_per_token(),
        }
    }
}

impl BudgetConfig {
    /// Validate that the budget configuration is consistent
    pub fn validate(&self) -> Result<(), BudgetError> {
        if !(self.safety_margin > 0.0 && self.safety_margin <= 1.0) {
            return Err(BudgetError::ConfigurationInvalid(format!(
                "safety_margin must be in (0, 1], got {}",
                self.safety_margin
            )));
        }
        if self.per_file_ceiling_tokens == 0 {
            return Err(BudgetError::ConfigurationInvalid(
                "per_file_ceiling_tokens must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.truncation_head_share) {
            return Err(BudgetError::ConfigurationInvalid(format!(
                "truncation_head_share must be in [0, 1], got {}",
                self.truncation_head_share
            )));
        }
        if self.chars_per_token <= 0.0 {
            return Err(BudgetError::ConfigurationInvalid(
                "chars_per_token must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Token limit for a model with the given context window
    pub fn request_limit(&self, context_window_tokens: usize) -> usize {
        (context_window_tokens as f64 * self.safety_margin).floor() as usize
    }
}

/// How the request budget was spent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetAllocation {
    pub system_tokens: usize,
    pub current_turn_tokens: usize,
    pub history_tokens: usize,
    pub total_allocated: usize,
    pub limit: usize,
    pub remaining: usize,
}

impl BudgetAllocation {
    pub fn new(
        system_tokens: usize,
        current_turn_tokens: usize,
        history_tokens: usize,
        limit: usize,
    ) -> Self {
        let total_allocated = system_tokens + current_turn_tokens + history_tokens;
        Self {
            system_tokens,
            current_turn_tokens,
            history_tokens,
            total_allocated,
            limit,
            remaining: limit.saturating_sub(total_allocated),
        }
    }

    /// Check if this allocation fits within the limit
    pub fn is_within_budget(&self) -> bool {
        self.total_allocated <= self.limit
    }
}

/// Token budget errors
#[derive(Debug, Error)]
pub enum BudgetError {
    #[error("Content too large: need {needed} tokens, have {available} tokens")]
    ContentTooLarge { needed: usize, available: usize },

    #[error("Model {model_id} does not accept images ({source_ref})")]
    ImagesNotSupported { source_ref: String, model_id: String },

    #[error("Configuration invalid: {0}")]
    ConfigurationInvalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BudgetConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.per_file_ceiling_tokens, 50_000);
    }

    #[test]
    fn test_invalid_margin_rejected() {
        let config = BudgetConfig { safety_margin: 1.5, ..Default::default() };
        assert!(config.validate().is_err());
        let config = BudgetConfig { safety_margin: 0.0, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_request_limit_floors() {
        let config = BudgetConfig::default();
        assert_eq!(config.request_limit(1000), 900);
        assert_eq!(config.request_limit(1001), 900);
    }

    #[test]
    fn test_allocation_remaining() {
        let alloc = BudgetAllocation::new(100, 200, 300, 900);
        assert_eq!(alloc.total_allocated, 600);
        assert_eq!(alloc.remaining, 300);
        assert!(alloc.is_within_budget());
    }
}
