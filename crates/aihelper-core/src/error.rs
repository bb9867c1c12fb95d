//! Typed errors shared across crate boundaries.

use thiserror::Error;

use crate::types::ErrorKind;

/// Failure reported by a tool invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    /// A failure that may succeed on retry (network blip, busy resource).
    #[error("transient failure: {0}")]
    Transient(String),
    /// A definite failure; retrying will not help.
    #[error("{0}")]
    Failed(String),
    /// The tool rejected its arguments after schema validation passed.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
}

impl ToolError {
    pub fn transient(message: impl Into<String>) -> Self {
        ToolError::Transient(message.into())
    }

    pub fn failed(message: impl Into<String>) -> Self {
        ToolError::Failed(message.into())
    }

    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        ToolError::InvalidArguments(message.into())
    }

    /// Where this failure lands in the observation taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ToolError::Transient(_) | ToolError::Failed(_) => ErrorKind::RuntimeError,
            ToolError::InvalidArguments(_) => ErrorKind::SchemaViolation,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ToolError::Transient(_))
    }
}

impl From<std::io::Error> for ToolError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind as Io;
        match e.kind() {
            Io::Interrupted | Io::WouldBlock | Io::TimedOut | Io::ConnectionReset => {
                ToolError::Transient(e.to_string())
            }
            _ => ToolError::Failed(e.to_string()),
        }
    }
}

/// Appending to a trajectory that already holds `max_steps` steps.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrajectoryError {
    #[error("trajectory is full ({max_steps} steps)")]
    Full { max_steps: usize },
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("memory I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("memory serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("memory store error: {0}")]
    Storage(String),
}
