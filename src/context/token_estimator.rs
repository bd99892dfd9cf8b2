//! Token estimation
//!
//! The true upstream token count is unknowable without calling the
//! upstream tokenizer, so every estimator here is a heuristic. Attachments
//! and the budgeter must share one estimator instance.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tiktoken_rs::{cl100k_base, CoreBPE};

/// Token estimator trait for different tokenization strategies
pub trait TokenEstimator: Send + Sync {
    /// Estimate the number of tokens in the given text
    fn estimate(&self, text: &str) -> usize;

    /// Estimate tokens for multiple texts
    fn estimate_batch(&self, texts: &[&str]) -> Vec<usize> {
        texts.iter().map(|t| self.estimate(t)).collect()
    }
}

/// Which estimator to build from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimatorKind {
    Chars,
    Tiktoken,
}

impl Default for EstimatorKind {
    fn default() -> Self {
        EstimatorKind::Chars
    }
}

/// Tiktoken-based token estimator using cl100k_base
pub struct TiktokenEstimator {
    bpe: Arc<CoreBPE>,
}

impl TiktokenEstimator {
    /// Create a new tiktoken estimator with cl100k_base encoding
    pub fn new() -> Result<Self, String> {
        let bpe = cl100k_base().map_err(|e| format!("failed to load cl100k_base: {}", e))?;
        Ok(Self { bpe: Arc::new(bpe) })
    }
}

impl TokenEstimator for TiktokenEstimator {
    fn estimate(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

/// Character-ratio estimator (~4 characters per token)
pub struct CharRatioEstimator {
    chars_per_token: f64,
}

impl CharRatioEstimator {
    pub fn new(chars_per_token: f64) -> Self {
        Self {
            chars_per_token: chars_per_token.max(0.1),
        }
    }
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self::new(4.0)
    }
}

impl TokenEstimator for CharRatioEstimator {
    fn estimate(&self, text: &str) -> usize {
        let chars = text.chars().count();
        (chars as f64 / self.chars_per_token).ceil() as usize
    }
}

/// Build the configured estimator
pub fn build_estimator(
    kind: EstimatorKind,
    chars_per_token: f64,
) -> Result<Arc<dyn TokenEstimator>, String> {
    match kind {
        EstimatorKind::Chars => Ok(Arc::new(CharRatioEstimator::new(chars_per_token))),
        EstimatorKind::Tiktoken => Ok(Arc::new(TiktokenEstimator::new()?)),
    }
}
