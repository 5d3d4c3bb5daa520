//! Core data types shared across the MCP subsystem.

use std::{collections::HashMap, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A remote callable discovered from an MCP server.
///
/// `(server_name, name)` identifies a tool at a point in time; identity is
/// not stable across discoveries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON schema for the tool's arguments, kept opaque.
    pub input_schema: Value,
    /// Name of the server that exposes the tool.
    pub server_name: String,
}

/// Capabilities reported by a server's `initialize` response.
///
/// Replaced wholesale on re-initialize, never mutated piecewise.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerCapabilities {
    pub protocol_version: String,
    pub supported_features: Vec<String>,
    #[serde(default)]
    pub server_info: HashMap<String, String>,
}

impl ServerCapabilities {
    pub fn supports(&self, feature: &str) -> bool {
        self.supported_features.iter().any(|f| f == feature)
    }
}

/// One tool invocation requested by the reasoner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub server_name: String,
    pub tool_name: String,
    pub arguments: Value,
}

/// Rendered result of a `tools/call` round trip.
///
/// A JSON-RPC `error` member is a successful round trip with `success =
/// false`; only transport and protocol failures surface as `McpError`.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub text: String,
    pub success: bool,
}

/// Recorded outcome of one tool dispatch, success or failure.
#[derive(Debug, Clone)]
pub struct ToolExecutionOutput {
    pub server_name: String,
    pub tool_name: String,
    /// Stable string rendering of the call arguments, for audit.
    pub arguments: String,
    pub output: String,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}
