//! Durable status store for the sequential executor.
//!
//! One JSON document records which jobs completed, which failed (with their
//! last code and how often), and which job is in flight. Writes go through a
//! temp-file-then-rename so a crash mid-write cannot corrupt the previous
//! valid record. The store has a single writer: the scheduler loop.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::CODE_INTERRUPTED;

/// How many genuine failures permanently retire a job from selection.
pub const MAX_FAILURES: u32 = 3;

/// Persisted record of batch progress.
///
/// A job id appears in at most one of `completed`/`failed`. `current` is the
/// first mutation when a job starts and the last to be cleared when it ends,
/// so a crash leaves it pointing at the interrupted job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusRecord {
    #[serde(default)]
    pub completed: Vec<String>,
    /// Last observed failure code per job id.
    #[serde(default)]
    pub failed: BTreeMap<String, i32>,
    /// Genuine failure count per job id; interrupts are not counted here.
    #[serde(default)]
    pub attempts: BTreeMap<String, u32>,
    #[serde(default)]
    pub current: Option<String>,
    #[serde(default)]
    pub last_execution: Option<String>,
}

impl StatusRecord {
    pub fn is_completed(&self, id: &str) -> bool {
        self.completed.iter().any(|c| c == id)
    }

    /// True once a job has burned through its failure budget.
    pub fn is_retired(&self, id: &str) -> bool {
        self.attempts.get(id).copied().unwrap_or(0) >= MAX_FAILURES
    }
}

/// File-backed store for a [`StatusRecord`].
pub struct StatusStore {
    path: PathBuf,
    pub record: StatusRecord,
}

impl StatusStore {
    /// Load the record at `path`. A missing file yields a zero-value record.
    pub fn load(path: &Path) -> Result<Self> {
        let record = if path.exists() {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("corrupt status store at {}", path.display()))?
        } else {
            StatusRecord::default()
        };
        Ok(Self {
            path: path.to_path_buf(),
            record,
        })
    }

    /// Persist atomically: write a sibling temp file, then rename over the
    /// target so readers never observe a partial document.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let text = serde_json::to_string_pretty(&self.record)?;
        std::fs::write(&tmp, text)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }

    pub fn mark_current(&mut self, id: &str) {
        self.record.current = Some(id.to_string());
    }

    pub fn clear_current(&mut self) {
        self.record.current = None;
        self.record.last_execution = Some(Utc::now().to_rfc3339());
    }

    pub fn mark_completed(&mut self, id: &str) {
        if !self.record.is_completed(id) {
            self.record.completed.push(id.to_string());
        }
        self.record.failed.remove(id);
        self.record.attempts.remove(id);
    }

    pub fn mark_failed(&mut self, id: &str, code: i32) {
        self.record.completed.retain(|c| c != id);
        self.record.failed.insert(id.to_string(), code);
        *self.record.attempts.entry(id.to_string()).or_insert(0) += 1;
    }

    /// Record a user interrupt. The sentinel code is stored for forensics but
    /// the failure count stays untouched, so a resume does not move the job
    /// toward permanent retirement.
    pub fn mark_interrupted(&mut self, id: &str) {
        self.record.completed.retain(|c| c != id);
        self.record.failed.insert(id.to_string(), CODE_INTERRUPTED);
    }

    /// Rewrite the record for a checkpoint replay: exactly `completed_prefix`
    /// is done, nothing is failed, nothing is in flight.
    pub fn rewrite_for_replay(&mut self, completed_prefix: Vec<String>) {
        self.record.completed = completed_prefix;
        self.record.failed.clear();
        self.record.attempts.clear();
        self.record.current = None;
    }
}
