//! Runtime configuration for gemini-live-relay.
//!
//! Configuration is loaded from a JSON file or constructed programmatically.
//! Every section has defaults, so a partial file (or no file) is valid.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "gemini-live-relay", about = "Streaming Gemini Live completion relay")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// HTTP listen address (overrides `server.listen`).
    #[arg(long)]
    pub listen: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,

    /// Upstream live session endpoint.
    pub upstream: UpstreamConfig,

    /// Where credentials come from.
    pub credentials: CredentialConfig,

    /// Model catalog.
    pub models: ModelCatalogConfig,

    /// Default generation parameters.
    pub generation: GenerationParams,

    /// Conversation validation rules.
    pub conversation: ConversationConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g. "0.0.0.0:8080").
    pub listen: String,

    /// Capacity of the per-request outbound frame channel in live mode.
    pub event_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            event_buffer: 32,
        }
    }
}

/// Gemini Live endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// WebSocket base URL.
    pub endpoint: String,

    /// API version segment of the service path.
    pub api_version: String,

    /// Deadline for opening a session, including the setup handshake.
    /// `None` means no deadline.
    pub connect_timeout_secs: Option<u64>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            endpoint: "wss://generativelanguage.googleapis.com".to_string(),
            api_version: "v1beta".to_string(),
            connect_timeout_secs: None,
        }
    }
}

impl UpstreamConfig {
    pub fn connect_deadline(&self) -> Option<Duration> {
        self.connect_timeout_secs.map(Duration::from_secs)
    }
}

/// Credential sources, checked in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
    /// API key set directly in the config file.
    pub api_key: Option<String>,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Environment variable holding a bearer access token (service account).
    pub access_token_env: String,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: "GOOGLE_KEY".to_string(),
            access_token_env: "GOOGLE_ACCESS_TOKEN".to_string(),
        }
    }
}

/// Models offered by this relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelCatalogConfig {
    /// Model used when a request names none.
    pub default_model: String,

    /// Models listed by `/v1/models`.
    pub available: Vec<String>,

    /// Reject requested models that are not in `available`.
    pub validate_requested: bool,
}

impl Default for ModelCatalogConfig {
    fn default() -> Self {
        Self {
            default_model: "gemini-2.0-flash-live-001".to_string(),
            available: vec![
                "gemini-2.0-flash-live-001".to_string(),
                "gemini-live-2.5-flash-preview".to_string(),
            ],
            validate_requested: false,
        }
    }
}

/// Sampling parameters sent with the session setup. The config section holds
/// the values applied when a request leaves them out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParams {
    pub temperature: f64,
    pub max_output_tokens: u32,
    pub top_p: f64,
    pub top_k: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_output_tokens: 2048,
            top_p: 0.8,
            top_k: 40,
        }
    }
}

/// Validation rules applied to every conversation before replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Maximum number of turns replayed ahead of the final turn.
    pub max_history_turns: usize,

    /// Reject two consecutive turns with the same role.
    pub require_alternation: bool,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_history_turns: 256,
            require_alternation: true,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }
}
