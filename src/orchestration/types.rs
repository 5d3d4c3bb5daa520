//! Request and response types for the orchestration surface.

use std::time::Duration;

use chrono::{DateTime, Utc};
use orchestrator_mcp::ToolExecutionOutput;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// One user request into the orchestrator.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationRequest {
    pub message: String,

    /// Omitted or empty means a fresh session is minted for this request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Opaque caller-supplied context, carried but not interpreted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<OrchestrationPreferences>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Per-request knobs. Every field has a serde default so partial JSON works.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrchestrationPreferences {
    /// Upper bound on reason/act iterations.
    pub max_steps: u32,

    /// Admission wait timeout (ms). Falls back to the orchestration config's
    /// `default_timeout_ms` when omitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Advisory; does not alter routing in this core.
    pub preferred_servers: Vec<String>,

    /// `detailed`, `summary`, or `raw`; anything else selects the neutral
    /// synthesis template.
    pub response_format: String,

    /// Advisory for the presenting layer.
    pub include_metadata: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_provider: Option<String>,

    /// 0 means the provider default.
    pub max_tokens: u32,

    /// Negative means the provider default.
    pub temperature: f64,
}

impl Default for OrchestrationPreferences {
    fn default() -> Self {
        Self {
            max_steps: 10,
            timeout: None,
            preferred_servers: Vec::new(),
            response_format: "detailed".to_string(),
            include_metadata: true,
            ai_provider: None,
            max_tokens: 0,
            temperature: -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    AiAnalysis,
    McpCall,
    Synthesis,
}

/// Immutable record of one operation in a request's execution flow.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStep {
    pub step_id: String,
    pub step_type: StepType,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    pub input: String,
    pub output: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl ExecutionStep {
    pub fn new(
        step_type: StepType,
        input: impl Into<String>,
        output: impl Into<String>,
        success: bool,
        duration: Duration,
    ) -> Self {
        Self {
            step_id: Uuid::new_v4().to_string(),
            step_type,
            timestamp: Utc::now(),
            duration_ms: duration.as_millis() as u64,
            server_name: None,
            tool_name: None,
            input: input.into(),
            output: output.into(),
            success,
            metadata: Map::new(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Record a tool dispatch outcome as an `mcp_call` step.
    pub fn from_tool_output(output: ToolExecutionOutput) -> Self {
        Self {
            step_id: Uuid::new_v4().to_string(),
            step_type: StepType::McpCall,
            timestamp: output.started_at,
            duration_ms: output.duration.as_millis() as u64,
            server_name: Some(output.server_name),
            tool_name: Some(output.tool_name),
            input: output.arguments,
            output: output.output,
            success: output.success,
            metadata: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Partial,
    Error,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub total_duration_ms: u64,
    pub steps_executed: usize,
    pub servers_used: Vec<String>,
    pub tools_used: Vec<String>,
    pub performance: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationResponse {
    pub request_id: String,
    pub session_id: String,
    pub status: ResponseStatus,
    pub response: String,
    pub execution_flow: Vec<ExecutionStep>,
    pub metadata: ResponseMetadata,
}

impl OrchestrationResponse {
    /// Terminal error response; the only way failures cross the HTTP layer.
    pub fn error(
        request_id: impl Into<String>,
        session_id: impl Into<String>,
        message: impl Into<String>,
        execution_flow: Vec<ExecutionStep>,
        total_duration: Duration,
    ) -> Self {
        let steps_executed = execution_flow.len();
        Self {
            request_id: request_id.into(),
            session_id: session_id.into(),
            status: ResponseStatus::Error,
            response: message.into(),
            execution_flow,
            metadata: ResponseMetadata {
                total_duration_ms: total_duration.as_millis() as u64,
                steps_executed,
                ..Default::default()
            },
        }
    }
}
