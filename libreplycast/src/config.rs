//! Configuration management for Replycast

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ConfigError, Result};
use crate::types::Credential;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    /// Shared system credential sub-pool, order-stable. Every tenant's pool
    /// starts with these before its private credentials are appended.
    #[serde(default)]
    pub credentials: Vec<Credential>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Base URL of the primary structured-data API.
    pub api_base: String,
    /// Base of the canonical status URL used by the browser fallback.
    pub status_url: String,
    /// Per-request timeout for the primary API client.
    pub request_timeout_secs: u64,
    /// Cooldown between consecutive credential attempts within one resolution.
    pub credential_cooldown_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.x.com".to_string(),
            status_url: "https://x.com/i/web/status".to_string(),
            request_timeout_secs: 20,
            credential_cooldown_secs: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Rate-limit cooldown applied when a resolution comes back exhausted.
    pub cooldown_secs: u64,
    /// Delay between references, throttling outbound call rate.
    pub item_delay_ms: u64,
    /// Bounded attempts in the acquisition retry wrapper.
    pub retry_attempts: u32,
    /// Timeout for a single acquisition attempt.
    pub attempt_timeout_secs: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 900,
            item_delay_ms: 1000,
            retry_attempts: 3,
            attempt_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// OpenAI-compatible chat-completion endpoint.
    pub api_base: String,
    pub model: String,
    /// File holding the generation API key.
    pub key_file: String,
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.groq.com/openai/v1".to_string(),
            model: "llama-3.1-8b-instant".to_string(),
            key_file: "~/.config/replycast/generation.key".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Explicit browser binary; autodetected when unset.
    pub executable: Option<String>,
    /// Directory of per-tenant session profile JSON files.
    pub profiles_dir: String,
    /// How many poll intervals to wait for intercepted text.
    pub poll_intervals: u32,
    pub poll_interval_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable: None,
            profiles_dir: "~/.local/share/replycast/profiles".to_string(),
            poll_intervals: 20,
            poll_interval_ms: 1000,
        }
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/replycast/replycast.db".to_string(),
            },
            network: NetworkConfig::default(),
            batch: BatchConfig::default(),
            generation: GenerationConfig::default(),
            browser: BrowserConfig::default(),
            credentials: Vec::new(),
        }
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("REPLYCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("replycast").join("config.toml"))
}

/// Resolve the data directory path following XDG Base Directory spec
pub fn resolve_data_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| ConfigError::MissingField("data directory".to_string()))?;

    Ok(data_dir.join("replycast"))
}
