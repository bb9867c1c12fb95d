//! Reasoning backend trait: the opaque text-completion service behind the planner.
//!
//! The agent never depends on a particular model or wire protocol; it builds a
//! [`PromptContext`] and gets text back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat turn in the prompt.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
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

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Everything a backend needs for one completion.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PromptContext {
    /// System prompt, sent as the first message.
    pub system: String,
    /// Conversation turns after the system prompt.
    pub messages: Vec<ChatMessage>,
    /// Per-call override of the backend's sampling temperature.
    pub temperature: Option<f64>,
    /// Per-call override of the backend's token limit.
    pub max_tokens: Option<u32>,
}

impl PromptContext {
    pub fn new(system: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            ..Default::default()
        }
    }

    pub fn with_message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    /// System prompt followed by the turns, as sent on the wire.
    pub fn to_messages(&self) -> Vec<ChatMessage> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);
        if !self.system.is_empty() {
            out.push(ChatMessage::system(self.system.clone()));
        }
        out.extend(self.messages.iter().cloned());
        out
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    /// Could not reach the backend (connection refused, DNS, timeout).
    #[error("backend unreachable: {0}")]
    Connection(String),
    /// The backend answered with a non-success status.
    #[error("backend returned {status}: {body}")]
    Http { status: u16, body: String },
    /// The body could not be decoded into a completion.
    #[error("invalid backend response: {0}")]
    InvalidResponse(String),
    /// Missing credentials or an unusable client configuration.
    #[error("backend not configured: {0}")]
    NotConfigured(String),
}

impl BackendError {
    /// Whether asking again might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Connection(_) | BackendError::InvalidResponse(_) => true,
            BackendError::Http { status, .. } => *status == 429 || *status >= 500,
            BackendError::NotConfigured(_) => false,
        }
    }
}

/// Trait implemented by every reasoning backend.
#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    /// Produce the model's reply text for `prompt`.
    async fn complete(&self, prompt: &PromptContext) -> Result<String, BackendError>;

    /// Cheap reachability check. Defaults to `true`.
    async fn is_available(&self) -> bool {
        true
    }

    /// Display name for logging.
    fn display_name(&self) -> &str;
}
