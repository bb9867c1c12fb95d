//! AI Helper core: the data model shared by every agent component.
//!
//! This crate contains:
//! - **types**: Goal, ToolSpec, Action, Observation, AgentConfig, AgentResult
//! - **trajectory**: the append-only, bounded Step history of one goal
//! - **error**: typed errors crossing crate boundaries
//! - **config**: on-disk configuration schema and loader
//! - **memory**: the Memory interface plus in-memory and JSONL stores

pub mod config;
pub mod error;
pub mod memory;
pub mod trajectory;
pub mod types;
pub mod utils;

pub use error::{MemoryError, ToolError, TrajectoryError};
pub use memory::{InMemoryMemory, JsonlMemory, Memory, MemoryRecord};
pub use trajectory::{Step, Trajectory};
pub use types::{
    Action, AgentConfig, AgentResult, Capability, ErrorKind, Goal, Observation, Outcome, Status,
    TerminationReason, ToolCall, ToolSpec,
};
