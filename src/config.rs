//! Application configuration.
//!
//! Loaded from a YAML file; provider API keys may instead come from the
//! process environment (`ANTHROPIC_API_KEY`, `OPENAI_API_KEY`,
//! `GEMINI_API_KEY`).

use std::path::Path;

use orchestrator_mcp::McpConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: HttpConfig,

    #[serde(default)]
    pub ai: AiConfig,

    #[serde(default)]
    pub mcp: McpConfig,

    #[serde(default)]
    pub orchestration: OrchestrationConfig,

    #[serde(default)]
    pub context: ContextConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AiConfig {
    /// Provider used when a request does not name one.
    #[serde(default = "default_provider")]
    pub default_provider: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claude: Option<ProviderConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai: Option<ProviderConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini: Option<ProviderConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Falls back to the provider's environment variable when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrchestrationConfig {
    /// Hard ceiling on reason/act iterations, regardless of request
    /// preferences.
    #[serde(default = "default_max_steps")]
    pub default_max_steps: u32,

    /// Default admission wait (ms) when a request does not set one.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,

    /// Advisory queue bound, surfaced through metrics.
    #[serde(default = "default_queue_size")]
    pub request_queue_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContextConfig {
    /// Idle time (secs) after which a session is evictable.
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,

    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// Oldest messages are trimmed past this cap.
    #[serde(default = "default_max_history_size")]
    pub max_history_size: usize,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_provider() -> String {
    "claude".to_string()
}

fn default_max_steps() -> u32 {
    10
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_concurrent() -> usize {
    10
}

fn default_queue_size() -> usize {
    100
}

fn default_session_timeout_secs() -> u64 {
    1800 // 30 minutes
}

fn default_max_sessions() -> usize {
    1000
}

fn default_cleanup_interval_secs() -> u64 {
    300 // 5 minutes
}

fn default_max_history_size() -> usize {
    100
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            claude: None,
            openai: None,
            gemini: None,
        }
    }
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            default_max_steps: default_max_steps(),
            default_timeout_ms: default_timeout_ms(),
            max_concurrent_requests: default_max_concurrent(),
            request_queue_size: default_queue_size(),
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            session_timeout_secs: default_session_timeout_secs(),
            max_sessions: default_max_sessions(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            max_history_size: default_max_history_size(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file.
    pub async fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Ok(serde_yaml::from_str(&content)?)
    }
}
