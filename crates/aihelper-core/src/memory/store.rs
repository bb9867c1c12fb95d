//! File-backed memory store.
//!
//! Layout under the store directory:
//! - `history.jsonl`: one [`MemoryRecord`] per line, append-only
//! - `preferences.json`: a flat string map, rewritten on every change

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{last_n, newest_matching, Memory, MemoryRecord};
use crate::error::MemoryError;
use crate::trajectory::Trajectory;
use crate::types::{AgentResult, Goal};

const HISTORY_FILE: &str = "history.jsonl";
const PREFERENCES_FILE: &str = "preferences.json";

/// JSONL-backed [`Memory`]. Writers are serialized through a single lock.
pub struct JsonlMemory {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlMemory {
    /// Open (creating if needed) a store rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, MemoryError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        debug!(path = %dir.display(), "opened memory store");
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn history_path(&self) -> PathBuf {
        self.dir.join(HISTORY_FILE)
    }

    fn preferences_path(&self) -> PathBuf {
        self.dir.join(PREFERENCES_FILE)
    }

    /// All readable records, oldest first. Corrupt lines are skipped.
    async fn load_all(&self) -> Result<Vec<MemoryRecord>, MemoryError> {
        let content = match tokio::fs::read_to_string(self.history_path()).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<MemoryRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(line = idx + 1, "skipping corrupt history record: {}", e),
            }
        }
        Ok(records)
    }

    async fn load_preferences(&self) -> Result<HashMap<String, String>, MemoryError> {
        match tokio::fs::read_to_string(self.preferences_path()).await {
            Ok(c) => Ok(serde_json::from_str(&c)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Memory for JsonlMemory {
    async fn append_trajectory(
        &self,
        goal: &Goal,
        trajectory: &Trajectory,
        result: &AgentResult,
    ) -> Result<(), MemoryError> {
        let record = MemoryRecord::new(goal, trajectory, result);
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.history_path())
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!(goal_id = %goal.id, steps = trajectory.len(), "appended trajectory");
        Ok(())
    }

    async fn read_recent(&self, n: usize) -> Result<Vec<MemoryRecord>, MemoryError> {
        Ok(last_n(&self.load_all().await?, n))
    }

    async fn search(&self, keyword: &str, limit: usize) -> Result<Vec<MemoryRecord>, MemoryError> {
        Ok(newest_matching(&self.load_all().await?, keyword, limit))
    }

    async fn set_preference(&self, key: &str, value: &str) -> Result<(), MemoryError> {
        let _guard = self.write_lock.lock().await;
        let mut prefs = self.load_preferences().await?;
        prefs.insert(key.to_string(), value.to_string());
        let json = serde_json::to_string_pretty(&prefs)?;
        tokio::fs::write(self.preferences_path(), json).await?;
        Ok(())
    }

    async fn get_preference(&self, key: &str) -> Result<Option<String>, MemoryError> {
        Ok(self.load_preferences().await?.get(key).cloned())
    }
}
