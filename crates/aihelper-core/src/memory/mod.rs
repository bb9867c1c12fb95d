//! Memory: persistence of finished goals and user preferences.
//!
//! The agent loop hands every sealed trajectory to a [`Memory`] once the goal
//! terminates. Storage failures are the store's problem; they never change the
//! outcome the caller sees.

mod store;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::MemoryError;
use crate::trajectory::Trajectory;
use crate::types::{AgentResult, Goal};

pub use store::JsonlMemory;

/// One finished goal as persisted.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MemoryRecord {
    pub goal: Goal,
    /// The result, carrying its own copy of the trajectory.
    pub result: AgentResult,
    pub recorded_at: DateTime<Utc>,
}

impl MemoryRecord {
    pub fn new(goal: &Goal, trajectory: &Trajectory, result: &AgentResult) -> Self {
        let mut result = result.clone();
        result.trajectory = trajectory.clone();
        Self {
            goal: goal.clone(),
            result,
            recorded_at: Utc::now(),
        }
    }

    /// Case-insensitive keyword match against the goal text and the answer.
    pub fn matches(&self, keyword: &str) -> bool {
        let needle = keyword.to_lowercase();
        self.goal.text.to_lowercase().contains(&needle)
            || self
                .result
                .answer
                .as_deref()
                .is_some_and(|a| a.to_lowercase().contains(&needle))
    }
}

/// Durable store for goal history and preferences.
#[async_trait]
pub trait Memory: Send + Sync {
    /// Persist a finished goal.
    async fn append_trajectory(
        &self,
        goal: &Goal,
        trajectory: &Trajectory,
        result: &AgentResult,
    ) -> Result<(), MemoryError>;

    /// The last `n` records, oldest first.
    async fn read_recent(&self, n: usize) -> Result<Vec<MemoryRecord>, MemoryError>;

    /// Records whose goal or answer mention `keyword`, newest first, at most `limit`.
    async fn search(&self, keyword: &str, limit: usize) -> Result<Vec<MemoryRecord>, MemoryError>;

    async fn set_preference(&self, key: &str, value: &str) -> Result<(), MemoryError>;

    async fn get_preference(&self, key: &str) -> Result<Option<String>, MemoryError>;
}

fn newest_matching(records: &[MemoryRecord], keyword: &str, limit: usize) -> Vec<MemoryRecord> {
    records
        .iter()
        .rev()
        .filter(|r| r.matches(keyword))
        .take(limit)
        .cloned()
        .collect()
}

fn last_n(records: &[MemoryRecord], n: usize) -> Vec<MemoryRecord> {
    records[records.len().saturating_sub(n)..].to_vec()
}

// ─────────────────────────────────────────────
// InMemoryMemory
// ─────────────────────────────────────────────

/// Process-local store; used by tests and when persistence is disabled.
#[derive(Default)]
pub struct InMemoryMemory {
    records: RwLock<Vec<MemoryRecord>>,
    preferences: RwLock<HashMap<String, String>>,
}

impl InMemoryMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl Memory for InMemoryMemory {
    async fn append_trajectory(
        &self,
        goal: &Goal,
        trajectory: &Trajectory,
        result: &AgentResult,
    ) -> Result<(), MemoryError> {
        self.records
            .write()
            .await
            .push(MemoryRecord::new(goal, trajectory, result));
        Ok(())
    }

    async fn read_recent(&self, n: usize) -> Result<Vec<MemoryRecord>, MemoryError> {
        Ok(last_n(&self.records.read().await, n))
    }

    async fn search(&self, keyword: &str, limit: usize) -> Result<Vec<MemoryRecord>, MemoryError> {
        Ok(newest_matching(&self.records.read().await, keyword, limit))
    }

    async fn set_preference(&self, key: &str, value: &str) -> Result<(), MemoryError> {
        self.preferences
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_preference(&self, key: &str) -> Result<Option<String>, MemoryError> {
        Ok(self.preferences.read().await.get(key).cloned())
    }
}
