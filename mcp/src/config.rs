//! MCP configuration types and utilities.
//!
//! Server records are immutable after load; runtime health lives in the
//! registry's status records, never here.

use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};

use crate::error::{McpError, McpResult};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct McpConfig {
    /// Upstream MCP servers (loaded at startup).
    #[serde(default)]
    pub servers: Vec<McpServerConfig>,

    /// TCP connect timeout for servers that do not set their own (ms).
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// Response read timeout for servers that do not set their own (ms).
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Reserved. Parsed for forward compatibility, not applied on call paths.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Interval between periodic health sweeps (seconds).
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,

    /// When false, periodic health sweeps are skipped entirely.
    #[serde(default = "default_true")]
    pub auto_discovery_enabled: bool,

    /// How long a discovered tool list stays fresh (seconds).
    #[serde(default = "default_tool_cache_ttl_secs")]
    pub tool_cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct McpServerConfig {
    pub name: String,

    /// Base URL of the server; the adapter POSTs JSON-RPC to `{base_url}/mcp`.
    pub base_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Per-call timeout, applied to both connect and response read (ms).
    #[serde(default = "default_server_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub auth: McpAuth,

    /// Additional headers sent with every request to this server.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub priority: i32,
}

impl McpServerConfig {
    /// JSON-RPC endpoint for this server.
    pub fn endpoint(&self) -> String {
        format!("{}/mcp", self.base_url.trim_end_matches('/'))
    }

    /// Liveness probe endpoint for this server.
    pub fn health_endpoint(&self) -> String {
        format!("{}/health", self.base_url.trim_end_matches('/'))
    }
}

/// Authentication scheme for an MCP server.
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(tag = "scheme", rename_all = "lowercase")]
pub enum McpAuth {
    #[default]
    None,
    Basic {
        username: String,
        password: String,
    },
    Bearer {
        token: String,
    },
    Apikey {
        /// Header the key is sent under. Defaults to `X-API-Key`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        header: Option<String>,
        key: String,
    },
}

impl fmt::Debug for McpAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            McpAuth::None => f.write_str("None"),
            McpAuth::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"****")
                .finish(),
            McpAuth::Bearer { .. } => f.debug_struct("Bearer").field("token", &"****").finish(),
            McpAuth::Apikey { header, .. } => f
                .debug_struct("Apikey")
                .field("header", header)
                .field("key", &"****")
                .finish(),
        }
    }
}

// Default value functions
fn default_connection_timeout_ms() -> u64 {
    10_000
}

fn default_read_timeout_ms() -> u64 {
    30_000
}

fn default_server_timeout_ms() -> u64 {
    30_000
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_health_check_interval_secs() -> u64 {
    60
}

fn default_tool_cache_ttl_secs() -> u64 {
    300 // 5 minutes
}

fn default_true() -> bool {
    true
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            connection_timeout_ms: default_connection_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            retry_attempts: default_retry_attempts(),
            health_check_interval_secs: default_health_check_interval_secs(),
            auto_discovery_enabled: true,
            tool_cache_ttl_secs: default_tool_cache_ttl_secs(),
        }
    }
}

impl McpConfig {
    /// Load configuration from a YAML file.
    pub async fn from_file(path: &str) -> McpResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| McpError::Config(format!("read {path}: {e}")))?;
        serde_yaml::from_str(&content).map_err(|e| McpError::Config(format!("parse {path}: {e}")))
    }
}
