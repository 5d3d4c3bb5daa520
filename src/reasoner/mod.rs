//! Reasoner abstraction over LLM providers.
//!
//! The core sees two capabilities, `analyze` and `synthesize`, and nothing
//! provider-specific. Concrete providers are injected through the registry.

pub mod providers;

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use orchestrator_mcp::Tool;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    config::AiConfig, context::ConversationContext,
    orchestration::types::OrchestrationPreferences,
};

pub type ReasonerResult<T> = Result<T, ReasonerError>;

#[derive(Debug, Error)]
pub enum ReasonerError {
    #[error("Provider API error: {0}")]
    Api(String),

    #[error("Provider misconfigured: {0}")]
    Misconfigured(String),

    #[error("Unknown AI provider: {0}")]
    UnknownProvider(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Result of one `analyze` turn.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub response: String,
    pub tokens_used: u64,
    pub provider_id: String,
}

/// Abstraction over an LLM. Both operations are purely functional from the
/// orchestrator's viewpoint.
#[async_trait]
pub trait Reasoner: Send + Sync {
    /// Stable identifier used for registry lookup and metadata.
    fn id(&self) -> &str;

    /// Decide what to do with the user message given the tool catalog.
    async fn analyze(
        &self,
        system_prompt: &str,
        user_message: &str,
        history: &str,
        tools: &[Tool],
        preferences: &OrchestrationPreferences,
    ) -> ReasonerResult<Analysis>;

    /// Render tool results into a natural-language reply.
    async fn synthesize(
        &self,
        prompt: &str,
        ctx: &ConversationContext,
        preferences: &OrchestrationPreferences,
    ) -> ReasonerResult<String>;
}

/// Provider lookup keyed by id, with a configured default.
pub struct ReasonerRegistry {
    providers: HashMap<String, Arc<dyn Reasoner>>,
    default_id: String,
}

impl ReasonerRegistry {
    pub fn new(default_id: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_id: default_id.into(),
        }
    }

    pub fn register(&mut self, reasoner: Arc<dyn Reasoner>) {
        self.providers.insert(reasoner.id().to_string(), reasoner);
    }

    /// Pick a provider by id, falling back to the configured default.
    pub fn select(&self, provider: Option<&str>) -> ReasonerResult<Arc<dyn Reasoner>> {
        let id = provider
            .filter(|p| !p.is_empty())
            .unwrap_or(self.default_id.as_str());
        self.providers
            .get(id)
            .cloned()
            .ok_or_else(|| ReasonerError::UnknownProvider(id.to_string()))
    }

    pub fn provider_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Build the registry from configuration. Providers that fail to
    /// construct (typically a missing API key) are skipped with a warning.
    pub fn from_config(config: &AiConfig) -> Self {
        let mut registry = Self::new(&config.default_provider);

        if let Some(provider_config) = &config.claude {
            match providers::ClaudeReasoner::from_config(provider_config) {
                Ok(reasoner) => registry.register(Arc::new(reasoner)),
                Err(e) => warn!("Skipping claude provider: {e}"),
            }
        }
        if let Some(provider_config) = &config.openai {
            match providers::OpenAiReasoner::from_config(provider_config) {
                Ok(reasoner) => registry.register(Arc::new(reasoner)),
                Err(e) => warn!("Skipping openai provider: {e}"),
            }
        }
        if let Some(provider_config) = &config.gemini {
            match providers::GeminiReasoner::from_config(provider_config) {
                Ok(reasoner) => registry.register(Arc::new(reasoner)),
                Err(e) => warn!("Skipping gemini provider: {e}"),
            }
        }

        info!(
            "Reasoner registry ready: {:?} (default: {})",
            registry.provider_ids(),
            registry.default_id
        );
        registry
    }
}
