//! JSON-RPC 2.0 protocol adapter for MCP servers.
//!
//! Speaks `initialize`, `tools/list`, and `tools/call` over HTTP POST to the
//! `/mcp` endpoint of each configured server. The per-call HTTP client is
//! derived from the server definition: connect and read timeouts both equal
//! the server's `timeout_ms`, authorization headers are built from its `auth`
//! scheme, and custom headers are merged as defaults.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    config::{McpAuth, McpServerConfig},
    error::{McpError, McpResult},
    types::{ServerCapabilities, Tool, ToolOutput},
};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

const CLIENT_NAME: &str = env!("CARGO_PKG_NAME");
const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Largest response body the adapter will buffer in memory.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Capability tags recognized explicitly; any other non-null capability key
/// is passed through as a feature by name.
const KNOWN_FEATURES: [&str; 4] = ["tools", "resources", "prompts", "logging"];

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: String,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

impl<'a> JsonRpcRequest<'a> {
    fn new(method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id: Uuid::new_v4().to_string(),
            method,
            params,
        }
    }
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: Option<String>,
    #[allow(dead_code)]
    id: Option<Value>,
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
    #[allow(dead_code)]
    data: Option<Value>,
}

/// Wire-level seam between the coordinator and MCP servers.
#[async_trait]
pub trait McpClient: Send + Sync {
    /// Perform the MCP handshake and report the server's capabilities.
    async fn initialize(&self, server: &McpServerConfig) -> McpResult<ServerCapabilities>;

    /// List the tools a server exposes. `server_name` is attached here.
    async fn list_tools(&self, server: &McpServerConfig) -> McpResult<Vec<Tool>>;

    /// Invoke one tool and render its result as text.
    async fn call_tool(
        &self,
        server: &McpServerConfig,
        tool_name: &str,
        arguments: &Value,
    ) -> McpResult<ToolOutput>;

    /// Cheap liveness probe: `GET /health`, falling back to `initialize`.
    async fn test_connection(&self, server: &McpServerConfig) -> bool;
}

/// Production adapter: JSON-RPC 2.0 over HTTP.
#[derive(Debug, Default)]
pub struct HttpMcpClient;

impl HttpMcpClient {
    pub fn new() -> Self {
        Self
    }

    async fn post_rpc(
        &self,
        server: &McpServerConfig,
        request: &JsonRpcRequest<'_>,
    ) -> McpResult<JsonRpcResponse> {
        let client = build_http_client(server)?;
        let url = server.endpoint();

        let response = client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| McpError::Transport(format!("POST {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(McpError::Transport(format!("{url} returned HTTP {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| McpError::Transport(format!("read body from {url}: {e}")))?;
        if body.len() > MAX_BODY_BYTES {
            return Err(McpError::Transport(format!(
                "response from {url} exceeds {MAX_BODY_BYTES} bytes"
            )));
        }

        serde_json::from_slice(&body)
            .map_err(|e| McpError::Protocol(format!("invalid JSON-RPC response from {url}: {e}")))
    }
}

#[async_trait]
impl McpClient for HttpMcpClient {
    async fn initialize(&self, server: &McpServerConfig) -> McpResult<ServerCapabilities> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": CLIENT_NAME,
                "version": CLIENT_VERSION,
            },
        });
        let request = JsonRpcRequest::new("initialize", Some(params));
        let response = self.post_rpc(server, &request).await?;

        if let Some(error) = response.error {
            return Err(McpError::Protocol(format!(
                "initialize failed with code {}: {}",
                error.code, error.message
            )));
        }

        let result = response
            .result
            .ok_or_else(|| McpError::Protocol("initialize response missing result".into()))?;
        let capabilities = parse_capabilities(&result)?;
        debug!(
            "Initialized '{}' (protocol {}, features: {:?})",
            server.name, capabilities.protocol_version, capabilities.supported_features
        );
        Ok(capabilities)
    }

    async fn list_tools(&self, server: &McpServerConfig) -> McpResult<Vec<Tool>> {
        let request = JsonRpcRequest::new("tools/list", None);
        let response = self.post_rpc(server, &request).await?;

        if let Some(error) = response.error {
            return Err(McpError::Protocol(format!(
                "tools/list failed with code {}: {}",
                error.code, error.message
            )));
        }

        let result = response
            .result
            .ok_or_else(|| McpError::Protocol("tools/list response missing result".into()))?;
        Ok(parse_tool_list(&result, &server.name))
    }

    async fn call_tool(
        &self,
        server: &McpServerConfig,
        tool_name: &str,
        arguments: &Value,
    ) -> McpResult<ToolOutput> {
        let params = json!({
            "name": tool_name,
            "arguments": arguments,
        });
        let request = JsonRpcRequest::new("tools/call", Some(params));
        let response = self.post_rpc(server, &request).await?;

        if let Some(error) = response.error {
            return Ok(ToolOutput {
                text: format!("Error: {}", error.message),
                success: false,
            });
        }

        let result = response
            .result
            .ok_or_else(|| McpError::Protocol("tools/call response missing result".into()))?;
        Ok(render_call_result(&result))
    }

    async fn test_connection(&self, server: &McpServerConfig) -> bool {
        if let Ok(client) = build_http_client(server) {
            match client.get(server.health_endpoint()).send().await {
                Ok(response) if response.status().is_success() => return true,
                Ok(response) => debug!(
                    "Health probe for '{}' returned HTTP {}",
                    server.name,
                    response.status()
                ),
                Err(e) => debug!("Health probe for '{}' failed: {}", server.name, e),
            }
        }
        self.initialize(server).await.is_ok()
    }
}

/// Parse an `initialize` result into capabilities.
pub(crate) fn parse_capabilities(result: &Value) -> McpResult<ServerCapabilities> {
    let protocol_version = result
        .get("protocolVersion")
        .and_then(Value::as_str)
        .ok_or_else(|| McpError::Protocol("initialize result missing protocolVersion".into()))?;

    let capabilities = result
        .get("capabilities")
        .and_then(Value::as_object)
        .ok_or_else(|| McpError::Protocol("initialize result missing capabilities".into()))?;

    let mut supported_features = Vec::new();
    for tag in KNOWN_FEATURES {
        if capabilities.get(tag).is_some_and(|v| !v.is_null()) {
            supported_features.push(tag.to_string());
        }
    }
    for (key, value) in capabilities {
        if !value.is_null() && !KNOWN_FEATURES.contains(&key.as_str()) {
            supported_features.push(key.clone());
        }
    }

    let server_info = result
        .get("serverInfo")
        .and_then(Value::as_object)
        .map(|info| {
            info.iter()
                .map(|(key, value)| {
                    let rendered = value
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| value.to_string());
                    (key.clone(), rendered)
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(ServerCapabilities {
        protocol_version: protocol_version.to_string(),
        supported_features,
        server_info,
    })
}

/// Parse a `tools/list` result, dropping entries without a name.
pub(crate) fn parse_tool_list(result: &Value, server_name: &str) -> Vec<Tool> {
    let Some(entries) = result.get("tools").and_then(Value::as_array) else {
        warn!("tools/list result from '{}' has no tools array", server_name);
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let Some(name) = entry.get("name").and_then(Value::as_str) else {
                warn!("Dropping tool without a name from '{}'", server_name);
                return None;
            };
            let description = entry
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let input_schema = entry
                .get("inputSchema")
                .cloned()
                .unwrap_or_else(|| json!({"type": "object", "properties": {}}));
            Some(Tool {
                name: name.to_string(),
                description,
                input_schema,
                server_name: server_name.to_string(),
            })
        })
        .collect()
}

/// Render a `tools/call` result: all `content[].text` fields joined by
/// newlines, or the stringified result when no text content is present.
pub(crate) fn render_call_result(result: &Value) -> ToolOutput {
    if let Some(content) = result.get("content").and_then(Value::as_array) {
        let texts: Vec<&str> = content
            .iter()
            .filter_map(|item| item.get("text").and_then(Value::as_str))
            .collect();
        if !texts.is_empty() {
            return ToolOutput {
                text: texts.join("\n"),
                success: true,
            };
        }
    }
    ToolOutput {
        text: result.to_string(),
        success: true,
    }
}

fn build_http_client(server: &McpServerConfig) -> McpResult<reqwest::Client> {
    let timeout = Duration::from_millis(server.timeout_ms);
    let mut headers = HeaderMap::new();

    match &server.auth {
        McpAuth::None => {}
        McpAuth::Basic { username, password } => {
            let encoded =
                base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
            headers.insert(AUTHORIZATION, header_value(&format!("Basic {encoded}"))?);
        }
        McpAuth::Bearer { token } => {
            headers.insert(AUTHORIZATION, header_value(&format!("Bearer {token}"))?);
        }
        McpAuth::Apikey { header, key } => {
            let name = header.as_deref().unwrap_or("X-API-Key");
            headers.insert(header_name(name)?, header_value(key)?);
        }
    }
    for (name, value) in &server.headers {
        headers.insert(header_name(name)?, header_value(value)?);
    }

    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .default_headers(headers)
        .build()
        .map_err(|e| McpError::Config(format!("build HTTP client for '{}': {e}", server.name)))
}

fn header_name(name: &str) -> McpResult<HeaderName> {
    name.parse()
        .map_err(|_| McpError::Config(format!("invalid header name '{name}'")))
}

fn header_value(value: &str) -> McpResult<HeaderValue> {
    value
        .parse()
        .map_err(|_| McpError::Config("invalid header value".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_envelope() {
        let request = JsonRpcRequest::new("tools/list", None);
        let encoded = serde_json::to_value(&request).unwrap();
        assert_eq!(encoded["jsonrpc"], "2.0");
        assert_eq!(encoded["method"], "tools/list");
        assert!(encoded["id"].is_string());
        assert!(encoded.get("params").is_none());

        let other = JsonRpcRequest::new("tools/list", None);
        assert_ne!(request.id, other.id);
    }

    #[test]
    fn test_parse_capabilities_known_and_unknown() {
        let result = json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {
                "tools": {"listChanged": true},
                "logging": {},
                "sampling": {},
                "resources": null
            },
            "serverInfo": {"name": "mock", "version": "1.0"}
        });

        let caps = parse_capabilities(&result).unwrap();
        assert_eq!(caps.protocol_version, "2024-11-05");
        // Known tags first, unknown non-null keys passed through; null skipped.
        assert!(caps.supports("tools"));
        assert!(caps.supports("logging"));
        assert!(caps.supports("sampling"));
        assert!(!caps.supports("resources"));
        assert_eq!(caps.server_info.get("name").unwrap(), "mock");
    }

    #[test]
    fn test_parse_capabilities_missing_fields() {
        assert!(parse_capabilities(&json!({"capabilities": {}})).is_err());
        assert!(parse_capabilities(&json!({"protocolVersion": "2024-11-05"})).is_err());
    }

    #[test]
    fn test_parse_tool_list_drops_unnamed() {
        let result = json!({
            "tools": [
                {"name": "echo", "description": "Echo back", "inputSchema": {"type": "object"}},
                {"description": "no name here"},
                {"name": "bare"}
            ]
        });

        let tools = parse_tool_list(&result, "srvA");
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "echo");
        assert_eq!(tools[0].server_name, "srvA");
        assert_eq!(tools[1].name, "bare");
        assert_eq!(tools[1].description, "");
        assert_eq!(tools[1].input_schema["type"], "object");
    }

    #[test]
    fn test_parse_tool_list_missing_array() {
        let tools = parse_tool_list(&json!({}), "srvA");
        assert!(tools.is_empty());
    }

    #[test]
    fn test_render_call_result_joins_text() {
        let result = json!({
            "content": [
                {"type": "text", "text": "line one"},
                {"type": "image", "data": "…"},
                {"type": "text", "text": "line two"}
            ]
        });

        let output = render_call_result(&result);
        assert!(output.success);
        assert_eq!(output.text, "line one\nline two");
    }

    #[test]
    fn test_render_call_result_stringifies_without_text() {
        let result = json!({"content": []});
        let output = render_call_result(&result);
        assert!(output.success);
        assert_eq!(output.text, r#"{"content":[]}"#);

        let bare = json!({"ok": true});
        assert_eq!(render_call_result(&bare).text, r#"{"ok":true}"#);
    }

    #[test]
    fn test_build_http_client_rejects_bad_header() {
        let server = McpServerConfig {
            name: "bad".into(),
            base_url: "http://localhost:1".into(),
            description: None,
            timeout_ms: 1000,
            auth: McpAuth::None,
            headers: [("not a header".to_string(), "x".to_string())].into(),
            enabled: true,
            priority: 0,
        };
        assert!(build_http_client(&server).is_err());
    }
}
