//! Chat model abstraction
//!
//! A [`Generator`] turns a rendered two-message prompt into a single
//! assistant reply. `OpenAIChatGenerator` talks to the chat completions API;
//! `StaticGenerator` replies with fixed text and records what it was asked.

use crate::config::OpenAiConfig;
use crate::embeddings::{status_error, transport_error};
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Speaker of a prompt message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A fully rendered prompt: one system message followed by one user message
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPrompt {
    pub messages: Vec<PromptMessage>,
    /// Number of retrieved chunks the prompt is grounded on, when known
    pub context_chunks: Option<usize>,
}

impl RenderedPrompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            messages: vec![PromptMessage::system(system), PromptMessage::user(user)],
            context_chunks: None,
        }
    }

    pub fn with_context_chunks(mut self, count: usize) -> Self {
        self.context_chunks = Some(count);
        self
    }

    pub fn system(&self) -> Option<&str> {
        self.find(Role::System)
    }

    pub fn user(&self) -> Option<&str> {
        self.find(Role::User)
    }

    fn find(&self, role: Role) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == role)
            .map(|m| m.content.as_str())
    }
}

/// Structured model reply
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub role: Role,
    pub content: String,
    pub model: String,
    pub finish_reason: Option<String>,
}

/// Trait for answer generation
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &RenderedPrompt, temperature: f32) -> Result<Generation>;

    fn model_name(&self) -> &str;
}

const PROVIDER: &str = "openai-chat";

/// OpenAI chat completions client
pub struct OpenAIChatGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    timeout: Duration,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [PromptMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    model: Option<String>,
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

impl OpenAIChatGenerator {
    /// Create a new generator. Fails with a configuration error when the
    /// API key is missing.
    pub fn new(config: &OpenAiConfig, retry: RetryPolicy) -> Result<Self> {
        let api_key = config.require_api_key()?.to_string();

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            model: config.chat_model.clone(),
            endpoint: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            timeout: config.timeout(),
            retry,
        })
    }

    async fn call(&self, prompt: &RenderedPrompt, temperature: f32) -> Result<Generation> {
        let request = ChatRequest {
            model: &self.model,
            messages: &prompt.messages,
            temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e, self.timeout))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(PROVIDER, status, &body));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::provider(PROVIDER, format!("Failed to parse response: {}", e)))?;

        let model = chat_response.model.unwrap_or_else(|| self.model.clone());
        let choice = chat_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::provider(PROVIDER, "Empty response from chat model"))?;

        Ok(Generation {
            role: Role::Assistant,
            content: choice.message.content.unwrap_or_default(),
            model,
            finish_reason: choice.finish_reason,
        })
    }
}

#[async_trait]
impl Generator for OpenAIChatGenerator {
    async fn generate(&self, prompt: &RenderedPrompt, temperature: f32) -> Result<Generation> {
        let start = Instant::now();
        let outcome = self
            .retry
            .run("chat_completion", || self.call(prompt, temperature))
            .await;
        metrics::record_generation(start.elapsed().as_secs_f64(), &self.model, outcome.is_ok());
        outcome
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Generator returning a fixed reply
#[derive(Default)]
pub struct StaticGenerator {
    reply: String,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<RenderedPrompt>>,
}

impl StaticGenerator {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            ..Self::default()
        }
    }

    /// Number of `generate` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The prompt passed to the most recent call
    pub fn last_prompt(&self) -> Option<RenderedPrompt> {
        self.last_prompt
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl Generator for StaticGenerator {
    async fn generate(&self, prompt: &RenderedPrompt, _temperature: f32) -> Result<Generation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut guard) = self.last_prompt.lock() {
            *guard = Some(prompt.clone());
        }
        Ok(Generation {
            role: Role::Assistant,
            content: self.reply.clone(),
            model: "static".to_string(),
            finish_reason: Some("stop".to_string()),
        })
    }

    fn model_name(&self) -> &str {
        "static"
    }
}
