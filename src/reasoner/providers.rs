//! Concrete reasoner providers: Anthropic, OpenAI, Gemini.
//!
//! Non-streaming only: the orchestration loop consumes whole responses.

use std::time::Duration;

use async_trait::async_trait;
use orchestrator_mcp::Tool;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{Analysis, Reasoner, ReasonerError, ReasonerResult};
use crate::{
    config::ProviderConfig, context::ConversationContext,
    orchestration::types::OrchestrationPreferences,
};

const REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_TOKENS: u32 = 4096;

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const OPENAI_BASE_URL: &str = "https://api.openai.com";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const CLAUDE_DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const OPENAI_DEFAULT_MODEL: &str = "gpt-4o";
const GEMINI_DEFAULT_MODEL: &str = "gemini-2.0-flash";

fn api_key(config: &ProviderConfig, env_var: &str) -> ReasonerResult<String> {
    if let Some(key) = config.api_key.as_deref().filter(|k| !k.is_empty()) {
        return Ok(key.to_string());
    }
    std::env::var(env_var)
        .ok()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ReasonerError::Misconfigured(format!("{env_var} not set")))
}

fn effective_max_tokens(preferences: &OrchestrationPreferences) -> u32 {
    if preferences.max_tokens == 0 {
        DEFAULT_MAX_TOKENS
    } else {
        preferences.max_tokens
    }
}

fn effective_temperature(preferences: &OrchestrationPreferences) -> Option<f64> {
    (preferences.temperature >= 0.0).then_some(preferences.temperature)
}

fn compose_user_message(user_message: &str, history: &str) -> String {
    if history.is_empty() {
        user_message.to_string()
    } else {
        format!("Conversation so far:\n{history}\n\nCurrent message: {user_message}")
    }
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

// ============================================================================
// Anthropic
// ============================================================================

pub struct ClaudeReasoner {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Option<Vec<AnthropicContent>>,
    usage: Option<AnthropicUsage>,
    error: Option<ApiErrorBody>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    kind: Option<String>,
    text: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: String,
}

impl ClaudeReasoner {
    pub fn from_config(config: &ProviderConfig) -> ReasonerResult<Self> {
        Ok(Self {
            client: Client::new(),
            api_key: api_key(config, "ANTHROPIC_API_KEY")?,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| CLAUDE_DEFAULT_MODEL.to_string()),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| ANTHROPIC_BASE_URL.to_string()),
        })
    }

    async fn complete(
        &self,
        system: Option<String>,
        user: String,
        preferences: &OrchestrationPreferences,
    ) -> ReasonerResult<(String, u64)> {
        let request = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: effective_max_tokens(preferences),
            messages: vec![ChatMessage {
                role: "user",
                content: user,
            }],
            system,
            temperature: effective_temperature(preferences),
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ReasonerError::Api(format!(
                "Anthropic API returned {status}: {body}"
            )));
        }

        let parsed: AnthropicResponse = response.json().await?;
        if let Some(error) = parsed.error {
            return Err(ReasonerError::Api(error.message));
        }

        let text = parsed
            .content
            .unwrap_or_default()
            .into_iter()
            .filter(|block| block.kind.as_deref() == Some("text"))
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");
        let tokens = parsed
            .usage
            .map(|u| u.input_tokens + u.output_tokens)
            .unwrap_or(0);
        Ok((text, tokens))
    }
}

#[async_trait]
impl Reasoner for ClaudeReasoner {
    fn id(&self) -> &str {
        "claude"
    }

    async fn analyze(
        &self,
        system_prompt: &str,
        user_message: &str,
        history: &str,
        _tools: &[Tool],
        preferences: &OrchestrationPreferences,
    ) -> ReasonerResult<Analysis> {
        let (response, tokens_used) = self
            .complete(
                Some(system_prompt.to_string()),
                compose_user_message(user_message, history),
                preferences,
            )
            .await?;
        Ok(Analysis {
            response,
            tokens_used,
            provider_id: self.id().to_string(),
        })
    }

    async fn synthesize(
        &self,
        prompt: &str,
        _ctx: &ConversationContext,
        preferences: &OrchestrationPreferences,
    ) -> ReasonerResult<String> {
        let (text, _) = self.complete(None, prompt.to_string(), preferences).await?;
        Ok(text)
    }
}

// ============================================================================
// OpenAI
// ============================================================================

pub struct OpenAiReasoner {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_completion_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Option<Vec<OpenAiChoice>>,
    usage: Option<OpenAiUsage>,
    error: Option<ApiErrorBody>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

impl OpenAiReasoner {
    pub fn from_config(config: &ProviderConfig) -> ReasonerResult<Self> {
        Ok(Self {
            client: Client::new(),
            api_key: api_key(config, "OPENAI_API_KEY")?,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| OPENAI_DEFAULT_MODEL.to_string()),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
        })
    }

    async fn complete(
        &self,
        system: Option<String>,
        user: String,
        preferences: &OrchestrationPreferences,
    ) -> ReasonerResult<(String, u64)> {
        let mut messages = Vec::new();
        if let Some(system) = system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: user,
        });

        let request = OpenAiRequest {
            model: self.model.clone(),
            messages,
            max_completion_tokens: effective_max_tokens(preferences),
            temperature: effective_temperature(preferences),
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ReasonerError::Api(format!(
                "OpenAI API returned {status}: {body}"
            )));
        }

        let parsed: OpenAiResponse = response.json().await?;
        if let Some(error) = parsed.error {
            return Err(ReasonerError::Api(error.message));
        }

        let text = parsed
            .choices
            .and_then(|choices| choices.into_iter().next())
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        let tokens = parsed
            .usage
            .map(|u| u.prompt_tokens + u.completion_tokens)
            .unwrap_or(0);
        Ok((text, tokens))
    }
}

#[async_trait]
impl Reasoner for OpenAiReasoner {
    fn id(&self) -> &str {
        "openai"
    }

    async fn analyze(
        &self,
        system_prompt: &str,
        user_message: &str,
        history: &str,
        _tools: &[Tool],
        preferences: &OrchestrationPreferences,
    ) -> ReasonerResult<Analysis> {
        let (response, tokens_used) = self
            .complete(
                Some(system_prompt.to_string()),
                compose_user_message(user_message, history),
                preferences,
            )
            .await?;
        Ok(Analysis {
            response,
            tokens_used,
            provider_id: self.id().to_string(),
        })
    }

    async fn synthesize(
        &self,
        prompt: &str,
        _ctx: &ConversationContext,
        preferences: &OrchestrationPreferences,
    ) -> ReasonerResult<String> {
        let (text, _) = self.complete(None, prompt.to_string(), preferences).await?;
        Ok(text)
    }
}

// ============================================================================
// Gemini
// ============================================================================

pub struct GeminiReasoner {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystemInstruction>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiContent {
    role: &'static str,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    usage_metadata: Option<GeminiUsage>,
    error: Option<ApiErrorBody>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    parts: Option<Vec<GeminiCandidatePart>>,
}

#[derive(Deserialize)]
struct GeminiCandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    prompt_token_count: Option<u64>,
    candidates_token_count: Option<u64>,
}

impl GeminiReasoner {
    pub fn from_config(config: &ProviderConfig) -> ReasonerResult<Self> {
        Ok(Self {
            client: Client::new(),
            api_key: api_key(config, "GEMINI_API_KEY")?,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| GEMINI_DEFAULT_MODEL.to_string()),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
        })
    }

    async fn complete(
        &self,
        system: Option<String>,
        user: String,
        preferences: &OrchestrationPreferences,
    ) -> ReasonerResult<(String, u64)> {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user",
                parts: vec![GeminiPart { text: user }],
            }],
            system_instruction: system.map(|text| GeminiSystemInstruction {
                parts: vec![GeminiPart { text }],
            }),
            generation_config: GeminiGenerationConfig {
                max_output_tokens: effective_max_tokens(preferences),
                temperature: effective_temperature(preferences),
            },
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ReasonerError::Api(format!(
                "Gemini API returned {status}: {body}"
            )));
        }

        let parsed: GeminiResponse = response.json().await?;
        if let Some(error) = parsed.error {
            return Err(ReasonerError::Api(error.message));
        }

        let text = parsed
            .candidates
            .and_then(|candidates| candidates.into_iter().next())
            .and_then(|candidate| candidate.content)
            .and_then(|content| content.parts)
            .map(|parts| {
                parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        let tokens = parsed
            .usage_metadata
            .map(|u| u.prompt_token_count.unwrap_or(0) + u.candidates_token_count.unwrap_or(0))
            .unwrap_or(0);
        Ok((text, tokens))
    }
}

#[async_trait]
impl Reasoner for GeminiReasoner {
    fn id(&self) -> &str {
        "gemini"
    }

    async fn analyze(
        &self,
        system_prompt: &str,
        user_message: &str,
        history: &str,
        _tools: &[Tool],
        preferences: &OrchestrationPreferences,
    ) -> ReasonerResult<Analysis> {
        let (response, tokens_used) = self
            .complete(
                Some(system_prompt.to_string()),
                compose_user_message(user_message, history),
                preferences,
            )
            .await?;
        Ok(Analysis {
            response,
            tokens_used,
            provider_id: self.id().to_string(),
        })
    }

    async fn synthesize(
        &self,
        prompt: &str,
        _ctx: &ConversationContext,
        preferences: &OrchestrationPreferences,
    ) -> ReasonerResult<String> {
        let (text, _) = self.complete(None, prompt.to_string(), preferences).await?;
        Ok(text)
    }
}
