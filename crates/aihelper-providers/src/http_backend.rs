//! HTTP reasoning backend.
//!
//! Two wire flavours share one client:
//! - **Ollama**: `POST {base}/api/chat` with `stream: false`, reply in `message.content`
//! - **OpenAI-compatible**: `POST {base}/chat/completions`, reply in `choices[0].message.content`

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use aihelper_core::config::{BackendKind, BackendSettings};

use crate::traits::{BackendError, ChatMessage, PromptContext, ReasoningBackend};

// ─────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f64,
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: Option<WireMessage>,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
}

// ─────────────────────────────────────────────
// HttpBackend
// ─────────────────────────────────────────────

/// A reasoning backend reached over HTTP.
pub struct HttpBackend {
    client: reqwest::Client,
    kind: BackendKind,
    /// Base URL without trailing slash.
    api_base: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("kind", &self.kind)
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

impl HttpBackend {
    pub fn new(settings: &BackendSettings) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| BackendError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            kind: settings.kind,
            api_base: settings.resolved_api_base(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn completion_url(&self) -> String {
        match self.kind {
            BackendKind::Ollama => format!("{}/api/chat", self.api_base),
            BackendKind::OpenAi => format!("{}/chat/completions", self.api_base),
        }
    }

    fn health_url(&self) -> String {
        match self.kind {
            BackendKind::Ollama => format!("{}/api/tags", self.api_base),
            BackendKind::OpenAi => format!("{}/models", self.api_base),
        }
    }

    fn request_body(&self, prompt: &PromptContext) -> Result<serde_json::Value, BackendError> {
        let temperature = prompt.temperature.unwrap_or(self.temperature);
        let max_tokens = prompt.max_tokens.unwrap_or(self.max_tokens);
        let messages = prompt.to_messages();

        let body = match self.kind {
            BackendKind::Ollama => serde_json::to_value(OllamaRequest {
                model: &self.model,
                messages,
                stream: false,
                options: OllamaOptions {
                    temperature,
                    num_predict: max_tokens,
                },
            }),
            BackendKind::OpenAi => serde_json::to_value(CompletionRequest {
                model: &self.model,
                messages,
                temperature,
                max_tokens,
            }),
        };
        body.map_err(|e| BackendError::InvalidResponse(format!("encoding request: {e}")))
    }

    fn extract_content(&self, body: &str) -> Result<String, BackendError> {
        let content = match self.kind {
            BackendKind::Ollama => serde_json::from_str::<OllamaResponse>(body)
                .map_err(|e| BackendError::InvalidResponse(e.to_string()))?
                .message
                .and_then(|m| m.content),
            BackendKind::OpenAi => serde_json::from_str::<CompletionResponse>(body)
                .map_err(|e| BackendError::InvalidResponse(e.to_string()))?
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content),
        };
        content.ok_or_else(|| BackendError::InvalidResponse("response has no content".into()))
    }
}

#[async_trait]
impl ReasoningBackend for HttpBackend {
    async fn complete(&self, prompt: &PromptContext) -> Result<String, BackendError> {
        let url = self.completion_url();
        let body = self.request_body(prompt)?;

        debug!(
            backend = self.display_name(),
            model = %self.model,
            messages = prompt.messages.len() + 1,
            "Calling reasoning backend"
        );

        let mut request = self.client.post(&url).json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request.send().await.map_err(|e| {
            error!(backend = self.display_name(), error = %e, "HTTP request failed");
            BackendError::Connection(e.to_string())
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BackendError::Connection(e.to_string()))?;

        if !status.is_success() {
            error!(
                backend = self.display_name(),
                status = %status,
                body = %text,
                "Backend API error"
            );
            return Err(BackendError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        let content = self.extract_content(&text)?;
        debug!(backend = self.display_name(), chars = content.len(), "Backend reply received");
        Ok(content)
    }

    async fn is_available(&self) -> bool {
        let mut request = self
            .client
            .get(self.health_url())
            .timeout(Duration::from_secs(3));
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }
        match request.send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!(backend = self.display_name(), error = %e, "Backend health check failed");
                false
            }
        }
    }

    fn display_name(&self) -> &str {
        match self.kind {
            BackendKind::Ollama => "Ollama",
            BackendKind::OpenAi => "OpenAI-compatible",
        }
    }
}

// ─────────────────────────────────────────────
// Builder (convenience)
// ─────────────────────────────────────────────

/// Build a backend from the `backend` config section.
///
/// OpenAI-compatible endpoints other than a local one need an API key.
pub fn create_backend(settings: &BackendSettings) -> Result<HttpBackend, BackendError> {
    let base = settings.resolved_api_base();
    if settings.kind == BackendKind::OpenAi
        && settings.api_key.trim().is_empty()
        && base.starts_with("https://api.openai.com")
    {
        return Err(BackendError::NotConfigured(
            "an API key is required for api.openai.com (set backend.apiKey or AIHELPER_BACKEND__API_KEY)"
                .into(),
        ));
    }

    debug!(kind = ?settings.kind, model = %settings.model, api_base = %base, "Creating reasoning backend");
    HttpBackend::new(settings)
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
