//! Reasoning backend layer for the AI Helper agent.
//!
//! # Architecture
//!
//! - [`traits::ReasoningBackend`]: the opaque completion interface the planner uses
//! - [`http_backend::HttpBackend`]: HTTP client for Ollama and OpenAI-compatible APIs
//! - [`http_backend::create_backend`]: builder from the `backend` config section

pub mod http_backend;
pub mod traits;

pub use http_backend::{create_backend, HttpBackend};
pub use traits::{BackendError, ChatMessage, PromptContext, ReasoningBackend, Role};
