//! Application configuration
//!
//! Layered: built-in defaults, then an optional TOML file, then `MUGW__`
//! prefixed environment variables (`MUGW__SERVER__PORT=9000`), then the
//! conventional variables read by each section's `from_env`.

use crate::context::BudgetConfig;
use crate::conversation::DEFAULT_MAX_FILE_BYTES;
use crate::gateway::GatewayConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub attachments: AttachmentConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from an optional file plus the environment
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("MUGW")
                .prefix_separator("__")
                .separator("__"),
        );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        Ok(config.from_env())
    }

    /// Apply conventional environment variables on top of loaded values
    pub fn from_env(mut self) -> Self {
        self.gateway = self.gateway.from_env();
        self.catalog = self.catalog.from_env();
        self.logging = self.logging.from_env();
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum request body in bytes
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 8787 }
fn default_body_limit() -> usize { 2 * 1024 * 1024 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogConfig {
    /// TOML file with a `[[models]]` table; built-in table when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Restrict the catalog to these aliases or ids; empty keeps all
    #[serde(default)]
    pub allowed: Vec<String>,
}

impl CatalogConfig {
    pub fn from_env(mut self) -> Self {
        if let Ok(val) = std::env::var("OPENROUTER_ALLOWED_MODELS") {
            let allowed = parse_list(&val);
            if !allowed.is_empty() {
                self.allowed = allowed;
            }
        }
        self
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Conversation directory; `~/.mu-mcp/conversations` when unset
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,
}

fn default_cache_capacity() -> u64 { 256 }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: None,
            cache_capacity: default_cache_capacity(),
        }
    }
}

impl StorageConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".mu-mcp")
                .join("conversations")
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentConfig {
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

fn default_max_file_bytes() -> u64 { DEFAULT_MAX_FILE_BYTES }

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

/// Retention is unbounded unless a limit is set
#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    #[serde(default)]
    pub max_age_days: Option<u32>,
    #[serde(default)]
    pub max_threads: Option<usize>,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_sweep_interval() -> u64 { 3600 }

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_days: None,
            max_threads: None,
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl RetentionConfig {
    pub fn is_enabled(&self) -> bool {
        self.max_age_days.is_some() || self.max_threads.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `peer_chat_gateway=debug`
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String { "info".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl LoggingConfig {
    pub fn from_env(mut self) -> Self {
        if let Ok(val) = std::env::var("LOG_LEVEL") {
            if !val.trim().is_empty() {
                self.level = val.trim().to_lowercase();
            }
        }
        if let Ok(val) = std::env::var("LOG_JSON") {
            self.json = val.to_lowercase() == "true" || val == "1";
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8787);
        assert_eq!(config.budget.safety_margin, 0.9);
        assert_eq!(config.budget.per_file_ceiling_tokens, 50_000);
        assert!(!config.retention.is_enabled());
        assert!(config
            .storage
            .resolved_dir()
            .ends_with(".mu-mcp/conversations"));
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(
            parse_list(" gpt-5, sonnet ,,o3 "),
            vec!["gpt-5".to_string(), "sonnet".to_string(), "o3".to_string()]
        );
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9100

[budget]
safety_margin = 0.8

[storage]
dir = "/tmp/threads"

[retention]
max_threads = 50
"#
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.budget.safety_margin, 0.8);
        assert_eq!(config.storage.resolved_dir(), PathBuf::from("/tmp/threads"));
        assert_eq!(config.retention.max_threads, Some(50));
        assert!(config.retention.is_enabled());
    }
}
