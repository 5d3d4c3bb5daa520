//! The per-request orchestration driver.
//!
//! Alternates reasoner calls and tool invocations under a bounded step
//! budget. Failures inside a tool call are recovered locally; failures of
//! reasoning or admission terminate the request. Either way the outcome
//! leaves as a structured response, never a panic or an error across the
//! HTTP boundary.

use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use orchestrator_mcp::McpCoordinator;
use serde::Serialize;
use serde_json::{json, Map};
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    config::OrchestrationConfig,
    context::{ContextManager, Role},
    extract::extract_tool_calls,
    orchestration::types::{
        ExecutionStep, OrchestrationPreferences, OrchestrationRequest, OrchestrationResponse,
        ResponseMetadata, ResponseStatus, StepType,
    },
    prompt,
    reasoner::ReasonerRegistry,
};

const QUEUE_FULL_MESSAGE: &str = "Request queue is full.";
const EMPTY_OUTPUT_PLACEHOLDER: &str = "No output";

#[derive(Default)]
struct OrchestratorMetrics {
    total_requests: AtomicU64,
    completed_requests: AtomicU64,
    failed_requests: AtomicU64,
    queue_length: AtomicU64,
}

/// Snapshot of the orchestrator's in-process counters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorMetricsSnapshot {
    pub total_requests: u64,
    pub completed_requests: u64,
    pub failed_requests: u64,
    pub queue_length: u64,
    pub max_concurrent_requests: usize,
    pub request_queue_size: usize,
}

pub struct Orchestrator {
    coordinator: Arc<McpCoordinator>,
    contexts: Arc<ContextManager>,
    reasoners: Arc<ReasonerRegistry>,
    config: OrchestrationConfig,
    admission: Arc<Semaphore>,
    metrics: OrchestratorMetrics,
}

impl Orchestrator {
    pub fn new(
        coordinator: Arc<McpCoordinator>,
        contexts: Arc<ContextManager>,
        reasoners: Arc<ReasonerRegistry>,
        config: OrchestrationConfig,
    ) -> Self {
        let admission = Arc::new(Semaphore::new(config.max_concurrent_requests));
        Self {
            coordinator,
            contexts,
            reasoners,
            config,
            admission,
            metrics: OrchestratorMetrics::default(),
        }
    }

    pub fn metrics(&self) -> OrchestratorMetricsSnapshot {
        OrchestratorMetricsSnapshot {
            total_requests: self.metrics.total_requests.load(Ordering::Relaxed),
            completed_requests: self.metrics.completed_requests.load(Ordering::Relaxed),
            failed_requests: self.metrics.failed_requests.load(Ordering::Relaxed),
            queue_length: self.metrics.queue_length.load(Ordering::Relaxed),
            max_concurrent_requests: self.config.max_concurrent_requests,
            request_queue_size: self.config.request_queue_size,
        }
    }

    /// Drive one request to completion.
    pub async fn process(&self, request: OrchestrationRequest) -> OrchestrationResponse {
        let request_id = Uuid::new_v4().to_string();
        let session_id = request
            .session_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("session-{}", Uuid::new_v4()));
        let preferences = request.preferences.clone().unwrap_or_default();
        let admission_timeout = preferences
            .timeout
            .unwrap_or(self.config.default_timeout_ms);
        let start = Instant::now();
        self.metrics.total_requests.fetch_add(1, Ordering::Relaxed);

        // Admission control: bounded wait for a concurrency slot. The permit
        // is held for the rest of the request and released on every exit
        // path when it drops.
        self.metrics.queue_length.fetch_add(1, Ordering::Relaxed);
        let admission = tokio::time::timeout(
            Duration::from_millis(admission_timeout),
            Arc::clone(&self.admission).acquire_owned(),
        )
        .await;
        self.metrics.queue_length.fetch_sub(1, Ordering::Relaxed);

        let _permit = match admission {
            Ok(Ok(permit)) => permit,
            _ => {
                warn!(request_id = %request_id, "Admission wait timed out");
                self.metrics.failed_requests.fetch_add(1, Ordering::Relaxed);
                return OrchestrationResponse::error(
                    request_id,
                    session_id,
                    QUEUE_FULL_MESSAGE,
                    Vec::new(),
                    start.elapsed(),
                );
            }
        };

        let response = self
            .run(&request_id, &session_id, &request, &preferences, start)
            .await;
        match response.status {
            ResponseStatus::Error => {
                self.metrics.failed_requests.fetch_add(1, Ordering::Relaxed)
            }
            _ => self
                .metrics
                .completed_requests
                .fetch_add(1, Ordering::Relaxed),
        };
        response
    }

    async fn run(
        &self,
        request_id: &str,
        session_id: &str,
        request: &OrchestrationRequest,
        preferences: &OrchestrationPreferences,
        start: Instant,
    ) -> OrchestrationResponse {
        let mut flow: Vec<ExecutionStep> = Vec::new();

        let reasoner = match self.reasoners.select(preferences.ai_provider.as_deref()) {
            Ok(reasoner) => reasoner,
            Err(e) => {
                return OrchestrationResponse::error(
                    request_id,
                    session_id,
                    e.to_string(),
                    flow,
                    start.elapsed(),
                )
            }
        };

        let mut ctx = self.contexts.get_or_create(session_id);
        ctx.push_message(Role::User, &request.message);

        let tools = self.coordinator.get_available_tools().await;
        ctx.available_tools = tools.clone();

        let system_prompt = prompt::system_prompt(&tools);
        let max_steps = preferences.max_steps.min(self.config.default_max_steps);
        let mut remaining_steps = max_steps;
        let mut current_response = request.message.clone();
        let mut terminal = false;

        while remaining_steps > 0 {
            let analysis_start = Instant::now();
            let analysis = match reasoner
                .analyze(
                    &system_prompt,
                    &current_response,
                    &prompt::history_text(&ctx),
                    &tools,
                    preferences,
                )
                .await
            {
                Ok(analysis) => analysis,
                Err(e) => {
                    warn!(request_id, "Analysis failed: {e}");
                    self.contexts.update(ctx);
                    return OrchestrationResponse::error(
                        request_id,
                        session_id,
                        e.to_string(),
                        flow,
                        start.elapsed(),
                    );
                }
            };

            let mut analysis_metadata = Map::new();
            analysis_metadata.insert("tokensUsed".into(), json!(analysis.tokens_used));
            analysis_metadata.insert("provider".into(), json!(analysis.provider_id));
            flow.push(
                ExecutionStep::new(
                    StepType::AiAnalysis,
                    current_response.clone(),
                    analysis.response.clone(),
                    true,
                    analysis_start.elapsed(),
                )
                .with_metadata(analysis_metadata),
            );

            let calls = extract_tool_calls(&analysis.response);
            if calls.is_empty() {
                // Terminal: the reasoner answered in prose.
                ctx.push_message(Role::Assistant, &analysis.response);
                current_response = analysis.response;
                terminal = true;
                break;
            }

            debug!(request_id, count = calls.len(), "Executing tool calls");
            // Sequential, in the order given, so synthesis sees a
            // deterministic result list.
            let mut results = Vec::with_capacity(calls.len());
            for call in &calls {
                let output = self.coordinator.execute_tool(call).await;
                let step = ExecutionStep::from_tool_output(output);
                results.push(if step.output.is_empty() {
                    EMPTY_OUTPUT_PLACEHOLDER.to_string()
                } else {
                    step.output.clone()
                });
                ctx.execution_history.push(step.clone());
                flow.push(step);
            }

            let synthesis_prompt = prompt::synthesis_prompt(&request.message, &results, preferences);
            let synthesis_start = Instant::now();
            current_response = match reasoner.synthesize(&synthesis_prompt, &ctx, preferences).await
            {
                Ok(text) => text,
                Err(e) => {
                    warn!(request_id, "Synthesis failed: {e}");
                    self.contexts.update(ctx);
                    return OrchestrationResponse::error(
                        request_id,
                        session_id,
                        e.to_string(),
                        flow,
                        start.elapsed(),
                    );
                }
            };
            flow.push(ExecutionStep::new(
                StepType::Synthesis,
                synthesis_prompt,
                current_response.clone(),
                true,
                synthesis_start.elapsed(),
            ));

            remaining_steps -= 1;
        }

        self.contexts.update(ctx);

        let status = if terminal {
            ResponseStatus::Success
        } else {
            ResponseStatus::Partial
        };

        let mut servers_used = BTreeSet::new();
        let mut tools_used = BTreeSet::new();
        for step in &flow {
            if let Some(server) = &step.server_name {
                servers_used.insert(server.clone());
            }
            if let Some(tool) = &step.tool_name {
                tools_used.insert(tool.clone());
            }
        }

        let mut performance = Map::new();
        performance.insert("aiProviderUsed".into(), json!(reasoner.id()));
        performance.insert("toolsAvailable".into(), json!(tools.len()));
        performance.insert("maxStepsReached".into(), json!(!terminal));

        let steps_executed = flow.len();
        OrchestrationResponse {
            request_id: request_id.to_string(),
            session_id: session_id.to_string(),
            status,
            response: current_response,
            execution_flow: flow,
            metadata: ResponseMetadata {
                total_duration_ms: start.elapsed().as_millis() as u64,
                steps_executed,
                servers_used: servers_used.into_iter().collect(),
                tools_used: tools_used.into_iter().collect(),
                performance,
            },
        }
    }
}
