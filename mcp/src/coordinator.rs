//! Tool cache and call coordination across MCP servers.
//!
//! Discovery fans out over every enabled, healthy server concurrently and
//! tolerates per-server failures. The cache and capabilities maps are
//! per-key last-writer-wins: two concurrent discoveries of one server may
//! both run, and the later write is a recomputation of the same upstream
//! state.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::Utc;
use dashmap::DashMap;
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    config::McpConfig,
    error::{McpError, McpResult},
    protocol::McpClient,
    registry::{ServerEntry, ServerRegistry},
    types::{ServerCapabilities, Tool, ToolCall, ToolExecutionOutput, ToolOutput},
};

struct CachedTools {
    tools: Vec<Tool>,
    discovered_at: Instant,
}

/// Health snapshot for one server, as reported to callers.
#[derive(Debug, Clone, Serialize)]
pub struct ServerHealth {
    pub healthy: bool,
    pub enabled: bool,
    pub last_checked_secs_ago: Option<u64>,
    pub capabilities: Option<ServerCapabilities>,
}

pub struct McpCoordinator {
    registry: Arc<ServerRegistry>,
    client: Arc<dyn McpClient>,
    tool_cache: DashMap<String, CachedTools>,
    capabilities: DashMap<String, ServerCapabilities>,
    tool_cache_ttl: Duration,
    auto_discovery_enabled: bool,
    health_check_interval: Duration,
}

impl McpCoordinator {
    pub fn new(registry: Arc<ServerRegistry>, client: Arc<dyn McpClient>, config: &McpConfig) -> Self {
        Self {
            registry,
            client,
            tool_cache: DashMap::new(),
            capabilities: DashMap::new(),
            tool_cache_ttl: Duration::from_secs(config.tool_cache_ttl_secs),
            auto_discovery_enabled: config.auto_discovery_enabled,
            health_check_interval: Duration::from_secs(config.health_check_interval_secs),
        }
    }

    pub fn registry(&self) -> Arc<ServerRegistry> {
        Arc::clone(&self.registry)
    }

    /// Discover tools across every enabled, healthy server concurrently.
    ///
    /// Per-server failures are isolated: they are logged and contribute an
    /// empty list. The aggregate is sorted by `(server_name, tool_name)`.
    pub async fn get_available_tools(&self) -> Vec<Tool> {
        let servers = self.registry.enabled_healthy();
        let discoveries = servers.iter().map(|entry| self.tools_for_server(entry));
        let results = join_all(discoveries).await;

        let mut tools = Vec::new();
        for (entry, result) in servers.iter().zip(results) {
            match result {
                Ok(server_tools) => tools.extend(server_tools),
                Err(e) => warn!("Tool discovery failed for '{}': {}", entry.config.name, e),
            }
        }
        tools.sort_by(|a, b| {
            (a.server_name.as_str(), a.name.as_str()).cmp(&(b.server_name.as_str(), b.name.as_str()))
        });
        tools
    }

    async fn tools_for_server(&self, entry: &Arc<ServerEntry>) -> McpResult<Vec<Tool>> {
        let name = &entry.config.name;

        // A cache entry is served only while it is inside the TTL window and
        // the server has passed a health check inside that same window.
        if let Some(cached) = self.tool_cache.get(name) {
            let fresh = cached.discovered_at.elapsed() < self.tool_cache_ttl
                && entry
                    .status
                    .last_health_check()
                    .is_some_and(|at| at.elapsed() < self.tool_cache_ttl);
            if fresh {
                return Ok(cached.tools.clone());
            }
        }

        if !self.capabilities.contains_key(name) {
            match self.client.initialize(&entry.config).await {
                Ok(capabilities) => {
                    self.registry.mark_healthy(name);
                    self.capabilities.insert(name.clone(), capabilities);
                }
                Err(e) => {
                    self.registry.mark_unhealthy(name);
                    return Err(e);
                }
            }
        }

        let tools = self.client.list_tools(&entry.config).await?;
        debug!("Discovered {} tools from '{}'", tools.len(), name);
        self.tool_cache.insert(
            name.clone(),
            CachedTools {
                tools: tools.clone(),
                discovered_at: Instant::now(),
            },
        );
        Ok(tools)
    }

    /// Dispatch one tool call.
    ///
    /// Always returns a recorded outcome: pre-dispatch refusals (unknown,
    /// disabled, unhealthy server) and call failures surface as failed
    /// outputs prefixed with `Error: `, not as errors. Transport failures
    /// additionally clear the server's healthy bit.
    pub async fn execute_tool(&self, call: &ToolCall) -> ToolExecutionOutput {
        let started_at = Utc::now();
        let start = Instant::now();
        let arguments = render_arguments(&call.arguments);

        let (output, success) = match self.dispatch(call).await {
            Ok(output) => (output.text, output.success),
            Err(e) => {
                if e.is_transport() {
                    warn!(
                        "Marking '{}' unhealthy after transport failure: {}",
                        call.server_name, e
                    );
                    self.registry.mark_unhealthy(&call.server_name);
                }
                (format!("Error: {e}"), false)
            }
        };

        ToolExecutionOutput {
            server_name: call.server_name.clone(),
            tool_name: call.tool_name.clone(),
            arguments,
            output,
            success,
            started_at,
            duration: start.elapsed(),
        }
    }

    async fn dispatch(&self, call: &ToolCall) -> McpResult<ToolOutput> {
        let entry = self
            .registry
            .get(&call.server_name)
            .ok_or_else(|| McpError::ServerNotFound(call.server_name.clone()))?;
        if !entry.config.enabled {
            return Err(McpError::ServerDisabled(call.server_name.clone()));
        }
        if !entry.status.is_healthy() {
            return Err(McpError::ServerUnhealthy(call.server_name.clone()));
        }

        self.client
            .call_tool(&entry.config, &call.tool_name, &call.arguments)
            .await
    }

    /// Probe one server and record the outcome.
    ///
    /// A transition to unhealthy purges the server's cache entries.
    pub async fn test_server_connection(&self, name: &str) -> McpResult<bool> {
        let entry = self
            .registry
            .get(name)
            .ok_or_else(|| McpError::ServerNotFound(name.to_string()))?;

        let healthy = self.client.test_connection(&entry.config).await;
        if healthy {
            self.registry.mark_healthy(name);
        } else {
            self.registry.mark_unhealthy(name);
            self.invalidate_tool_cache(Some(name));
        }
        Ok(healthy)
    }

    /// Probe every known server concurrently. No-op when autodiscovery is
    /// disabled.
    pub async fn perform_health_checks(&self) {
        if !self.auto_discovery_enabled {
            return;
        }

        let names = self.registry.names();
        let total = names.len();
        let checks = names.iter().map(|name| self.test_server_connection(name));
        let results = join_all(checks).await;
        let healthy = results
            .into_iter()
            .filter(|result| matches!(result, Ok(true)))
            .count();
        info!("Health check sweep complete: {healthy}/{total} servers healthy");
    }

    /// Purge cached tools for one server, or for all when `server` is `None`.
    pub fn invalidate_tool_cache(&self, server: Option<&str>) {
        match server {
            Some(name) => {
                self.tool_cache.remove(name);
            }
            None => self.tool_cache.clear(),
        }
    }

    /// Per-server health report for introspection surfaces.
    pub fn server_health(&self) -> HashMap<String, ServerHealth> {
        self.registry
            .names()
            .into_iter()
            .filter_map(|name| {
                let entry = self.registry.get(&name)?;
                let report = ServerHealth {
                    healthy: entry.status.is_healthy(),
                    enabled: entry.config.enabled,
                    last_checked_secs_ago: entry
                        .status
                        .last_health_check()
                        .map(|at| at.elapsed().as_secs()),
                    capabilities: self.capabilities.get(&name).map(|caps| caps.value().clone()),
                };
                Some((name, report))
            })
            .collect()
    }

    pub fn cached_tool_count(&self) -> usize {
        self.tool_cache.iter().map(|entry| entry.tools.len()).sum()
    }

    /// Periodic health sweep. Runs until the handle is aborted.
    pub fn spawn_health_check_task(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.health_check_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                self.perform_health_checks().await;
            }
        })
    }
}

fn render_arguments(arguments: &Value) -> String {
    if arguments.is_null() {
        "{}".to_string()
    } else {
        arguments.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::config::McpServerConfig;

    /// Scriptable adapter stub with per-method call counters.
    #[derive(Default)]
    struct StubClient {
        initialize_calls: AtomicU64,
        list_calls: AtomicU64,
        call_calls: AtomicU64,
        /// Servers whose requests fail at the transport level.
        unreachable: Mutex<Vec<String>>,
        /// When set, `call_tool` yields a protocol-level error output.
        call_errors: Mutex<Vec<String>>,
    }

    impl StubClient {
        fn set_unreachable(&self, name: &str) {
            self.unreachable.lock().push(name.to_string());
        }

        fn is_unreachable(&self, name: &str) -> bool {
            self.unreachable.lock().iter().any(|n| n == name)
        }
    }

    #[async_trait]
    impl McpClient for StubClient {
        async fn initialize(&self, server: &McpServerConfig) -> McpResult<ServerCapabilities> {
            self.initialize_calls.fetch_add(1, Ordering::Relaxed);
            if self.is_unreachable(&server.name) {
                return Err(McpError::Transport(format!("connect {}: refused", server.name)));
            }
            Ok(ServerCapabilities {
                protocol_version: "2024-11-05".into(),
                supported_features: vec!["tools".into()],
                server_info: Default::default(),
            })
        }

        async fn list_tools(&self, server: &McpServerConfig) -> McpResult<Vec<Tool>> {
            self.list_calls.fetch_add(1, Ordering::Relaxed);
            if self.is_unreachable(&server.name) {
                return Err(McpError::Transport(format!("connect {}: refused", server.name)));
            }
            Ok(vec![
                Tool {
                    name: "zeta".into(),
                    description: "last alphabetically".into(),
                    input_schema: json!({"type": "object"}),
                    server_name: server.name.clone(),
                },
                Tool {
                    name: "alpha".into(),
                    description: "first alphabetically".into(),
                    input_schema: json!({"type": "object"}),
                    server_name: server.name.clone(),
                },
            ])
        }

        async fn call_tool(
            &self,
            server: &McpServerConfig,
            tool_name: &str,
            _arguments: &Value,
        ) -> McpResult<ToolOutput> {
            self.call_calls.fetch_add(1, Ordering::Relaxed);
            if self.is_unreachable(&server.name) {
                return Err(McpError::Transport(format!("connect {}: refused", server.name)));
            }
            if self.call_errors.lock().iter().any(|t| t == tool_name) {
                return Ok(ToolOutput {
                    text: "Error: tool exploded".into(),
                    success: false,
                });
            }
            Ok(ToolOutput {
                text: format!("{tool_name} ok"),
                success: true,
            })
        }

        async fn test_connection(&self, server: &McpServerConfig) -> bool {
            !self.is_unreachable(&server.name)
        }
    }

    fn server(name: &str, enabled: bool) -> McpServerConfig {
        McpServerConfig {
            name: name.to_string(),
            base_url: format!("http://localhost:3000/{name}"),
            description: None,
            timeout_ms: 1000,
            auth: Default::default(),
            headers: Default::default(),
            enabled,
            priority: 0,
        }
    }

    fn coordinator_with(
        servers: Vec<McpServerConfig>,
        ttl_secs: u64,
    ) -> (Arc<McpCoordinator>, Arc<StubClient>) {
        let config = McpConfig {
            tool_cache_ttl_secs: ttl_secs,
            ..Default::default()
        };
        let registry = Arc::new(ServerRegistry::new(servers));
        let client = Arc::new(StubClient::default());
        let coordinator = Arc::new(McpCoordinator::new(
            registry,
            Arc::clone(&client) as Arc<dyn McpClient>,
            &config,
        ));
        (coordinator, client)
    }

    #[tokio::test]
    async fn test_discovery_sorted_by_server_then_tool() {
        let (coordinator, _client) = coordinator_with(vec![server("b", true), server("a", true)], 300);

        let tools = coordinator.get_available_tools().await;
        let keys: Vec<(String, String)> = tools
            .into_iter()
            .map(|t| (t.server_name, t.name))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("a".to_string(), "alpha".to_string()),
                ("a".to_string(), "zeta".to_string()),
                ("b".to_string(), "alpha".to_string()),
                ("b".to_string(), "zeta".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_discovery_serves_cache_within_ttl() {
        let (coordinator, client) = coordinator_with(vec![server("a", true)], 300);

        let first = coordinator.get_available_tools().await;
        let second = coordinator.get_available_tools().await;

        assert_eq!(first, second);
        assert_eq!(client.initialize_calls.load(Ordering::Relaxed), 1);
        assert_eq!(client.list_calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_discovery_rediscovers_after_ttl() {
        // TTL of zero means nothing is ever fresh.
        let (coordinator, client) = coordinator_with(vec![server("a", true)], 0);

        coordinator.get_available_tools().await;
        coordinator.test_server_connection("a").await.unwrap();
        coordinator.get_available_tools().await;

        assert_eq!(client.list_calls.load(Ordering::Relaxed), 2);
        // Capabilities survive; only one handshake.
        assert_eq!(client.initialize_calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_discovery_isolates_failing_server() {
        let (coordinator, client) = coordinator_with(vec![server("a", true), server("b", true)], 300);
        client.set_unreachable("b");

        let tools = coordinator.get_available_tools().await;
        assert_eq!(tools.len(), 2);
        assert!(tools.iter().all(|t| t.server_name == "a"));

        // The failed handshake downgraded the server.
        let entry = coordinator.registry().get("b").unwrap();
        assert!(!entry.status.is_healthy());
    }

    #[tokio::test]
    async fn test_invalidate_is_transparent() {
        let (coordinator, _client) = coordinator_with(vec![server("a", true)], 300);

        let before = coordinator.get_available_tools().await;
        coordinator.invalidate_tool_cache(Some("a"));
        let after = coordinator.get_available_tools().await;
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_execute_refusal_order() {
        let (coordinator, _client) =
            coordinator_with(vec![server("off", false), server("down", true)], 300);
        coordinator.registry().mark_unhealthy("down");

        let missing = coordinator
            .execute_tool(&ToolCall {
                server_name: "ghost".into(),
                tool_name: "echo".into(),
                arguments: json!({}),
            })
            .await;
        assert!(!missing.success);
        assert!(missing.output.starts_with("Error: Server not found"));

        let disabled = coordinator
            .execute_tool(&ToolCall {
                server_name: "off".into(),
                tool_name: "echo".into(),
                arguments: json!({}),
            })
            .await;
        assert!(disabled.output.starts_with("Error: Server disabled"));

        let unhealthy = coordinator
            .execute_tool(&ToolCall {
                server_name: "down".into(),
                tool_name: "echo".into(),
                arguments: json!({}),
            })
            .await;
        assert!(unhealthy.output.starts_with("Error: Server unhealthy"));
    }

    #[tokio::test]
    async fn test_execute_records_arguments_and_duration() {
        let (coordinator, _client) = coordinator_with(vec![server("a", true)], 300);

        let output = coordinator
            .execute_tool(&ToolCall {
                server_name: "a".into(),
                tool_name: "echo".into(),
                arguments: json!({"x": 1}),
            })
            .await;

        assert!(output.success);
        assert_eq!(output.output, "echo ok");
        assert_eq!(output.arguments, r#"{"x":1}"#);
        assert_eq!(output.server_name, "a");
        assert_eq!(output.tool_name, "echo");
    }

    #[tokio::test]
    async fn test_execute_transport_failure_downgrades_server() {
        let (coordinator, client) = coordinator_with(vec![server("a", true)], 300);
        client.set_unreachable("a");

        let output = coordinator
            .execute_tool(&ToolCall {
                server_name: "a".into(),
                tool_name: "echo".into(),
                arguments: json!({}),
            })
            .await;

        assert!(!output.success);
        assert!(output.output.starts_with("Error: Transport error"));
        assert!(!coordinator.registry().get("a").unwrap().status.is_healthy());
    }

    #[tokio::test]
    async fn test_execute_protocol_error_keeps_server_healthy() {
        let (coordinator, client) = coordinator_with(vec![server("a", true)], 300);
        client.call_errors.lock().push("boom".to_string());

        let output = coordinator
            .execute_tool(&ToolCall {
                server_name: "a".into(),
                tool_name: "boom".into(),
                arguments: json!({}),
            })
            .await;

        assert!(!output.success);
        assert!(output.output.starts_with("Error: "));
        assert!(coordinator.registry().get("a").unwrap().status.is_healthy());
    }

    #[tokio::test]
    async fn test_connection_failure_purges_cache() {
        let (coordinator, client) = coordinator_with(vec![server("a", true)], 300);

        coordinator.get_available_tools().await;
        assert_eq!(coordinator.cached_tool_count(), 2);

        client.set_unreachable("a");
        let healthy = coordinator.test_server_connection("a").await.unwrap();
        assert!(!healthy);
        assert_eq!(coordinator.cached_tool_count(), 0);
    }

    #[tokio::test]
    async fn test_health_checks_respect_autodiscovery_flag() {
        let config = McpConfig {
            auto_discovery_enabled: false,
            ..Default::default()
        };
        let registry = Arc::new(ServerRegistry::new(vec![server("a", true)]));
        let client = Arc::new(StubClient::default());
        let coordinator =
            McpCoordinator::new(registry, Arc::clone(&client) as Arc<dyn McpClient>, &config);

        client.set_unreachable("a");
        coordinator.perform_health_checks().await;

        // Disabled sweep: the server keeps its healthy bit.
        assert!(coordinator.registry().get("a").unwrap().status.is_healthy());
    }

    #[tokio::test]
    async fn test_all_servers_unhealthy_yields_empty_catalog() {
        let (coordinator, _client) = coordinator_with(vec![server("a", true)], 300);
        coordinator.registry().mark_unhealthy("a");

        assert!(coordinator.get_available_tools().await.is_empty());
    }

    #[tokio::test]
    async fn test_server_health_report() {
        let (coordinator, _client) = coordinator_with(vec![server("a", true)], 300);
        coordinator.get_available_tools().await;

        let health = coordinator.server_health();
        let report = health.get("a").unwrap();
        assert!(report.healthy);
        assert!(report.enabled);
        assert!(report.last_checked_secs_ago.is_some());
        assert!(report.capabilities.as_ref().unwrap().supports("tools"));
    }
}
