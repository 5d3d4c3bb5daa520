//! Session context management.
//!
//! Sessions are advisory in-memory state, not a source of truth: concurrent
//! requests for one session may interleave, and the contract is best-effort
//! causal ordering with last-writer-wins storage.

use std::{collections::BTreeSet, sync::Arc};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use orchestrator_mcp::Tool;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::{config::ContextConfig, orchestration::types::ExecutionStep};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    /// Capitalized label used when rendering history for prompts.
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::System => "System",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Per-session conversation state threading requests together.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationContext {
    pub session_id: String,
    pub messages: Vec<Message>,
    /// Snapshot of the tool catalog as of the session's last request.
    pub available_tools: Vec<Tool>,
    pub execution_history: Vec<ExecutionStep>,
    pub preferences: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl ConversationContext {
    fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            messages: Vec::new(),
            available_tools: Vec::new(),
            execution_history: Vec::new(),
            preferences: Map::new(),
            created_at: now,
            last_activity_at: now,
        }
    }

    pub fn push_message(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(Message::new(role, content));
    }
}

/// Summary view of one session for introspection surfaces.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: String,
    pub message_count: usize,
    pub tool_names: Vec<String>,
    pub server_names: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextMetrics {
    pub total_sessions: usize,
    pub active_sessions: usize,
    pub average_age_secs: f64,
}

/// Owns every session. All mutations are concurrency-safe; entries are
/// stored whole with last-writer-wins semantics.
pub struct ContextManager {
    contexts: DashMap<String, ConversationContext>,
    config: ContextConfig,
}

impl ContextManager {
    pub fn new(config: ContextConfig) -> Self {
        Self {
            contexts: DashMap::new(),
            config,
        }
    }

    /// Look up or create a session, stamping activity and enforcing the
    /// history cap. Creation may first evict least-recently-active sessions
    /// to keep the total under `max_sessions`.
    pub fn get_or_create(&self, session_id: &str) -> ConversationContext {
        if !self.contexts.contains_key(session_id) {
            self.evict_for_capacity();
        }

        let mut entry = self
            .contexts
            .entry(session_id.to_string())
            .or_insert_with(|| {
                debug!("Created session '{}'", session_id);
                ConversationContext::new(session_id)
            });
        entry.last_activity_at = Utc::now();

        let max = self.config.max_history_size;
        if entry.messages.len() > max {
            let excess = entry.messages.len() - max;
            entry.messages.drain(..excess);
        }

        entry.clone()
    }

    /// Store a context back, stamping activity.
    pub fn update(&self, mut ctx: ConversationContext) {
        ctx.last_activity_at = Utc::now();

        let max = self.config.max_history_size;
        if ctx.messages.len() > max {
            let excess = ctx.messages.len() - max;
            ctx.messages.drain(..excess);
        }

        self.contexts.insert(ctx.session_id.clone(), ctx);
    }

    /// Replace a session's stored preferences.
    pub fn set_preferences(&self, session_id: &str, preferences: Map<String, Value>) {
        let mut ctx = self.get_or_create(session_id);
        ctx.preferences = preferences;
        self.update(ctx);
    }

    pub fn clear(&self, session_id: &str) -> bool {
        self.contexts.remove(session_id).is_some()
    }

    pub fn session_count(&self) -> usize {
        self.contexts.len()
    }

    /// Evict every session idle beyond the session timeout.
    pub fn cleanup_expired(&self) {
        let cutoff = Utc::now() - chrono::Duration::seconds(self.config.session_timeout_secs as i64);
        let expired: Vec<String> = self
            .contexts
            .iter()
            .filter(|entry| entry.value().last_activity_at < cutoff)
            .map(|entry| entry.key().clone())
            .collect();

        let count = expired.len();
        for session_id in expired {
            self.contexts.remove(&session_id);
        }
        if count > 0 {
            info!("Evicted {count} expired session(s)");
        }
    }

    pub fn metrics(&self) -> ContextMetrics {
        let now = Utc::now();
        let timeout = chrono::Duration::seconds(self.config.session_timeout_secs as i64);

        let total_sessions = self.contexts.len();
        let mut active_sessions = 0;
        let mut age_sum_secs = 0.0;
        for entry in self.contexts.iter() {
            if now - entry.value().last_activity_at < timeout {
                active_sessions += 1;
            }
            age_sum_secs += (now - entry.value().created_at).num_milliseconds() as f64 / 1000.0;
        }

        ContextMetrics {
            total_sessions,
            active_sessions,
            average_age_secs: if total_sessions == 0 {
                0.0
            } else {
                age_sum_secs / total_sessions as f64
            },
        }
    }

    pub fn session_info(&self, session_id: &str) -> Option<SessionInfo> {
        self.contexts
            .get(session_id)
            .map(|entry| self.summarize(entry.value()))
    }

    pub fn session_infos(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self
            .contexts
            .iter()
            .map(|entry| self.summarize(entry.value()))
            .collect();
        infos.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        infos
    }

    fn summarize(&self, ctx: &ConversationContext) -> SessionInfo {
        let tool_names: BTreeSet<String> =
            ctx.available_tools.iter().map(|t| t.name.clone()).collect();
        let server_names: BTreeSet<String> = ctx
            .available_tools
            .iter()
            .map(|t| t.server_name.clone())
            .collect();
        let timeout = chrono::Duration::seconds(self.config.session_timeout_secs as i64);

        SessionInfo {
            session_id: ctx.session_id.clone(),
            message_count: ctx.messages.len(),
            tool_names: tool_names.into_iter().collect(),
            server_names: server_names.into_iter().collect(),
            is_active: Utc::now() - ctx.last_activity_at < timeout,
            created_at: ctx.created_at,
            last_activity_at: ctx.last_activity_at,
        }
    }

    /// Evict the `k` least-recently-active sessions needed to admit one more.
    fn evict_for_capacity(&self) {
        let count = self.contexts.len();
        if count < self.config.max_sessions {
            return;
        }
        let k = count - self.config.max_sessions + 1;

        let mut by_activity: Vec<(String, DateTime<Utc>)> = self
            .contexts
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().last_activity_at))
            .collect();
        by_activity.sort_by_key(|(_, at)| *at);

        for (session_id, _) in by_activity.into_iter().take(k) {
            self.contexts.remove(&session_id);
            info!("Evicted session '{session_id}' to stay under the session cap");
        }
    }

    /// Periodic expiry sweep. Runs until the handle is aborted.
    pub fn spawn_cleanup_task(self: Arc<Self>) -> JoinHandle<()> {
        let interval = std::time::Duration::from_secs(self.config.cleanup_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                self.cleanup_expired();
            }
        })
    }
}
