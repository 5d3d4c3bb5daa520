//! REST surface for the orchestrator.
//!
//! Thin adapters over the core: every handler returns JSON, and no error
//! escapes except as a structured body or a plain status code.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use orchestrator_mcp::{McpCoordinator, McpError};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tower_http::trace::TraceLayer;

use crate::{
    context::ContextManager,
    orchestration::{Orchestrator, OrchestrationPreferences, OrchestrationRequest, OrchestrationResponse},
};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub coordinator: Arc<McpCoordinator>,
    pub contexts: Arc<ContextManager>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/orchestration/process", post(process))
        .route("/api/v1/orchestration/tools", get(list_tools))
        .route("/api/v1/orchestration/tools/{server}", get(server_tools))
        .route("/api/v1/orchestration/configure", post(configure))
        .route("/api/v1/orchestration/health", get(health))
        .route("/api/v1/orchestration/status", get(status))
        .route("/api/v1/orchestration/sessions", get(list_sessions))
        .route(
            "/api/v1/orchestration/session/{id}",
            get(session_info).delete(clear_session),
        )
        .route("/api/v1/orchestration/servers/{name}/test", post(test_server))
        .route("/api/v1/orchestration/cache/invalidate", post(invalidate_cache))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn process(
    State(state): State<AppState>,
    Json(request): Json<OrchestrationRequest>,
) -> Json<OrchestrationResponse> {
    Json(state.orchestrator.process(request).await)
}

async fn list_tools(State(state): State<AppState>) -> Json<Value> {
    let tools = state.coordinator.get_available_tools().await;
    let servers: Vec<&str> = {
        let mut names: Vec<&str> = tools.iter().map(|t| t.server_name.as_str()).collect();
        names.dedup();
        names
    };

    Json(json!({
        "status": "success",
        "count": tools.len(),
        "servers": servers,
        "tools": tools,
    }))
}

async fn server_tools(
    State(state): State<AppState>,
    Path(server): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    let health = state.coordinator.server_health();
    let Some(report) = health.get(&server) else {
        return Err(StatusCode::NOT_FOUND);
    };

    let tools: Vec<_> = state
        .coordinator
        .get_available_tools()
        .await
        .into_iter()
        .filter(|tool| tool.server_name == server)
        .collect();

    Ok(Json(json!({
        "status": "success",
        "serverName": server,
        "count": tools.len(),
        "tools": tools,
        "capabilities": report.capabilities,
        "health": {
            "healthy": report.healthy,
            "lastCheckedSecsAgo": report.last_checked_secs_ago,
        },
    })))
}

#[derive(Deserialize)]
struct ConfigureParams {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

async fn configure(
    State(state): State<AppState>,
    Query(params): Query<ConfigureParams>,
    Json(preferences): Json<OrchestrationPreferences>,
) -> Json<Value> {
    let session_id = params
        .session_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| format!("session-{}", uuid::Uuid::new_v4()));

    let stored: Map<String, Value> = match serde_json::to_value(&preferences) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    state.contexts.set_preferences(&session_id, stored);

    Json(json!({
        "status": "success",
        "sessionId": session_id,
        "preferences": preferences,
    }))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "tool-orchestrator",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn status(State(state): State<AppState>) -> Json<Value> {
    let servers = state.coordinator.server_health();
    let healthy = servers.values().filter(|report| report.healthy).count();
    let server_count = servers.len();

    Json(json!({
        "servers": servers,
        "totals": {
            "servers": server_count,
            "healthyServers": healthy,
            "cachedTools": state.coordinator.cached_tool_count(),
            "sessions": state.contexts.session_count(),
        },
        "context": state.contexts.metrics(),
        "orchestration": state.orchestrator.metrics(),
    }))
}

async fn list_sessions(State(state): State<AppState>) -> Json<Value> {
    let sessions = state.contexts.session_infos();
    let active = sessions.iter().filter(|info| info.is_active).count();

    Json(json!({
        "count": sessions.len(),
        "activeSessions": active,
        "sessions": sessions,
    }))
}

async fn session_info(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    state
        .contexts
        .session_info(&id)
        .map(|info| Json(json!(info)))
        .ok_or(StatusCode::NOT_FOUND)
}

async fn clear_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    if state.contexts.clear(&id) {
        Ok(Json(json!({"status": "success", "sessionId": id})))
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

async fn test_server(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    match state.coordinator.test_server_connection(&name).await {
        Ok(is_healthy) => Ok(Json(json!({
            "serverName": name,
            "isHealthy": is_healthy,
        }))),
        Err(McpError::ServerNotFound(_)) => Err(StatusCode::NOT_FOUND),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

#[derive(Deserialize)]
struct InvalidateParams {
    #[serde(rename = "serverName")]
    server_name: Option<String>,
}

async fn invalidate_cache(
    State(state): State<AppState>,
    Query(params): Query<InvalidateParams>,
) -> Json<Value> {
    state
        .coordinator
        .invalidate_tool_cache(params.server_name.as_deref());

    Json(json!({
        "status": "success",
        "scope": params.server_name.unwrap_or_else(|| "all".to_string()),
    }))
}
