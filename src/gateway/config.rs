//! Configuration for the upstream chat-completions gateway

use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;

/// Gateway client configuration
#[derive(Debug, Deserialize)]
pub struct GatewayConfig {
    /// Chat-completions endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// API key (read from env OPENROUTER_API_KEY if not set)
    #[serde(default)]
    pub api_key: Option<SecretString>,

    /// Request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Sent as `HTTP-Referer` for upstream attribution
    #[serde(default = "default_referer")]
    pub referer: String,

    /// Sent as `X-Title`
    #[serde(default = "default_title")]
    pub title: String,
}

fn default_endpoint() -> String { "https://openrouter.ai/api/v1/chat/completions".to_string() }
fn default_timeout_ms() -> u64 { 300_000 }
fn default_referer() -> String { "https://github.com/peer-chat-gateway".to_string() }
fn default_title() -> String { "Peer Chat Gateway".to_string() }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: None,
            timeout_ms: default_timeout_ms(),
            referer: default_referer(),
            title: default_title(),
        }
    }
}

impl GatewayConfig {
    /// Override with environment variables if present
    pub fn from_env(mut self) -> Self {
        if let Ok(val) = std::env::var("OPENROUTER_API_KEY") {
            if !val.trim().is_empty() {
                self.api_key = Some(SecretString::new(val));
            }
        }

        if let Ok(val) = std::env::var("OPENROUTER_ENDPOINT") {
            self.endpoint = val;
        }

        if let Ok(val) = std::env::var("OPENROUTER_TIMEOUT_MS") {
            if let Ok(timeout) = val.parse() {
                self.timeout_ms = timeout;
            }
        }

        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
