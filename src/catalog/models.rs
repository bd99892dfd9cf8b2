//! Capability records for catalog models

use serde::{Deserialize, Serialize};

/// Relative price tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostClass {
    Low,
    Medium,
    High,
    Premium,
}

/// Static description of what a model supports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCapability {
    /// Full gateway path, e.g. `openai/gpt-5`
    pub model_id: String,
    /// Short name, e.g. `gpt-5`
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub description: String,
    pub context_window_tokens: usize,
    #[serde(default)]
    pub supports_images: bool,
    #[serde(default)]
    pub supports_reasoning_effort: bool,
    #[serde(default = "default_cost_class")]
    pub cost_class: CostClass,
}

fn default_cost_class() -> CostClass {
    CostClass::Medium
}

impl ModelCapability {
    /// Threads are model-agnostic, so any model can resume any thread
    pub fn supports_continuation(&self) -> bool {
        true
    }

    /// Alias when present, full id otherwise
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.model_id)
    }

    /// Matches the full id, its last path segment, or the alias
    pub fn matches(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        let id = self.model_id.to_lowercase();
        if id == name {
            return true;
        }
        if id.rsplit('/').next() == Some(name.as_str()) {
            return true;
        }
        self.alias
            .as_deref()
            .map(|a| a.to_lowercase() == name)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ModelCapability {
        ModelCapability {
            model_id: "openai/gpt-5".to_string(),
            alias: Some("gpt-5".to_string()),
            description: String::new(),
            context_window_tokens: 400_000,
            supports_images: true,
            supports_reasoning_effort: true,
            cost_class: CostClass::High,
        }
    }

    #[test]
    fn test_matches_id_suffix_and_alias() {
        let cap = sample();
        assert!(cap.matches("openai/gpt-5"));
        assert!(cap.matches("OpenAI/GPT-5"));
        assert!(cap.matches("gpt-5"));
        assert!(!cap.matches("gpt-5-mini"));
    }

    #[test]
    fn test_continuation_always_supported() {
        assert!(sample().supports_continuation());
        assert_eq!(sample().display_name(), "gpt-5");
    }
}
