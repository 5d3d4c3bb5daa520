//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use orchestrator::{
    config::{ContextConfig, OrchestrationConfig},
    context::{ContextManager, ConversationContext},
    orchestration::{OrchestrationPreferences, OrchestrationRequest, Orchestrator},
    reasoner::{Analysis, Reasoner, ReasonerRegistry, ReasonerResult},
};
use orchestrator_mcp::{
    McpClient, McpConfig, McpCoordinator, McpResult, McpServerConfig, ServerCapabilities,
    ServerRegistry, Tool, ToolOutput,
};
use serde_json::{json, Value};

/// Reasoner that replays scripted replies; the last entry repeats forever.
pub struct ScriptedReasoner {
    analyses: Vec<String>,
    syntheses: Vec<String>,
    analysis_index: AtomicUsize,
    synthesis_index: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedReasoner {
    pub fn new(analyses: &[&str], syntheses: &[&str]) -> Self {
        assert!(!analyses.is_empty(), "need at least one scripted analysis");
        Self {
            analyses: analyses.iter().map(|s| s.to_string()).collect(),
            syntheses: syntheses.iter().map(|s| s.to_string()).collect(),
            analysis_index: AtomicUsize::new(0),
            synthesis_index: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Delay every analyze call, for admission-control tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    fn id(&self) -> &str {
        "scripted"
    }

    async fn analyze(
        &self,
        _system_prompt: &str,
        _user_message: &str,
        _history: &str,
        _tools: &[Tool],
        _preferences: &OrchestrationPreferences,
    ) -> ReasonerResult<Analysis> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let index = self
            .analysis_index
            .fetch_add(1, Ordering::Relaxed)
            .min(self.analyses.len() - 1);
        Ok(Analysis {
            response: self.analyses[index].clone(),
            tokens_used: 7,
            provider_id: "scripted".to_string(),
        })
    }

    async fn synthesize(
        &self,
        _prompt: &str,
        _ctx: &ConversationContext,
        _preferences: &OrchestrationPreferences,
    ) -> ReasonerResult<String> {
        let index = self.synthesis_index.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .syntheses
            .get(index.min(self.syntheses.len().saturating_sub(1)))
            .cloned()
            .unwrap_or_else(|| "synthesized".to_string()))
    }
}

/// Adapter stub: every server exposes one `echo` tool that replies `pong`.
#[derive(Default)]
pub struct StubToolClient;

#[async_trait]
impl McpClient for StubToolClient {
    async fn initialize(&self, _server: &McpServerConfig) -> McpResult<ServerCapabilities> {
        Ok(ServerCapabilities {
            protocol_version: "2024-11-05".into(),
            supported_features: vec!["tools".into()],
            server_info: Default::default(),
        })
    }

    async fn list_tools(&self, server: &McpServerConfig) -> McpResult<Vec<Tool>> {
        Ok(vec![Tool {
            name: "echo".into(),
            description: "Echo back".into(),
            input_schema: json!({"type": "object"}),
            server_name: server.name.clone(),
        }])
    }

    async fn call_tool(
        &self,
        _server: &McpServerConfig,
        _tool_name: &str,
        _arguments: &Value,
    ) -> McpResult<ToolOutput> {
        Ok(ToolOutput {
            text: "pong".into(),
            success: true,
        })
    }

    async fn test_connection(&self, _server: &McpServerConfig) -> bool {
        true
    }
}

pub fn server_config(name: &str, base_url: &str) -> McpServerConfig {
    McpServerConfig {
        name: name.to_string(),
        base_url: base_url.to_string(),
        description: None,
        timeout_ms: 2000,
        auth: Default::default(),
        headers: Default::default(),
        enabled: true,
        priority: 0,
    }
}

pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub coordinator: Arc<McpCoordinator>,
    pub contexts: Arc<ContextManager>,
}

pub fn harness(
    reasoner: Arc<dyn Reasoner>,
    client: Arc<dyn McpClient>,
    servers: Vec<McpServerConfig>,
    orchestration: OrchestrationConfig,
) -> Harness {
    let registry = Arc::new(ServerRegistry::new(servers));
    let coordinator = Arc::new(McpCoordinator::new(registry, client, &McpConfig::default()));
    let contexts = Arc::new(ContextManager::new(ContextConfig::default()));

    let mut reasoners = ReasonerRegistry::new("scripted");
    reasoners.register(reasoner);

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&coordinator),
        Arc::clone(&contexts),
        Arc::new(reasoners),
        orchestration,
    ));

    Harness {
        orchestrator,
        coordinator,
        contexts,
    }
}

/// The documented tool-call envelope, as a reasoner would emit it.
pub fn envelope(server: &str, tool: &str, arguments: Value) -> String {
    json!({
        "action": "tool_call",
        "reasoning": "the request needs remote data",
        "tool_calls": [{
            "server_name": server,
            "tool_name": tool,
            "arguments": arguments,
        }],
    })
    .to_string()
}

pub fn request(message: &str) -> OrchestrationRequest {
    OrchestrationRequest {
        message: message.to_string(),
        session_id: None,
        context: None,
        preferences: None,
        timestamp: None,
    }
}

pub fn request_with(message: &str, preferences: OrchestrationPreferences) -> OrchestrationRequest {
    OrchestrationRequest {
        message: message.to_string(),
        session_id: None,
        context: None,
        preferences: Some(preferences),
        timestamp: None,
    }
}
