//! Per-job run artifacts: the output/error transcripts and the status token.
//!
//! The three files together are one run's observable state. `output.txt` is
//! append-only so transcript history survives re-runs; `error.txt` is
//! truncated each run; `status.txt` holds a [`RunStatus`] token that external
//! observers can poll instead of tailing logs.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};

use crate::error::{CODE_INTERRUPTED, CODE_TIMEOUT};

/// Closed status token for one job execution.
///
/// Serialized as `queued`, `running`, or the integer exit code. Parsing is
/// tolerant of legacy `OK`/`SUCCESS` markers, which map to `Succeeded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Queued,
    Running,
    Succeeded,
    Failed(i32),
    TimedOut,
    Interrupted,
}

impl RunStatus {
    /// Map a raw exit/sentinel code to its status.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => RunStatus::Succeeded,
            CODE_TIMEOUT => RunStatus::TimedOut,
            CODE_INTERRUPTED => RunStatus::Interrupted,
            c => RunStatus::Failed(c),
        }
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            RunStatus::Queued | RunStatus::Running => None,
            RunStatus::Succeeded => Some(0),
            RunStatus::Failed(c) => Some(*c),
            RunStatus::TimedOut => Some(CODE_TIMEOUT),
            RunStatus::Interrupted => Some(CODE_INTERRUPTED),
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Queued => write!(f, "queued"),
            RunStatus::Running => write!(f, "running"),
            other => write!(f, "{}", other.code().unwrap_or(1)),
        }
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err("empty status token".into());
        }
        let lower = trimmed.to_lowercase();
        if lower.starts_with("queued") {
            return Ok(RunStatus::Queued);
        }
        if lower.starts_with("running") {
            return Ok(RunStatus::Running);
        }
        if let Ok(code) = trimmed.parse::<i32>() {
            return Ok(RunStatus::from_code(code));
        }
        // Tolerate non-numeric success markers left by older tooling.
        match trimmed.to_uppercase().as_str() {
            "OK" | "SUCCESS" => Ok(RunStatus::Succeeded),
            other => Err(format!("unrecognized status token: {other}")),
        }
    }
}

/// Paths of the three per-run files for one job.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub output: PathBuf,
    pub error: PathBuf,
    pub status: PathBuf,
}

impl RunRecord {
    /// Conventional file names inside a job directory.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            output: dir.join("output.txt"),
            error: dir.join("error.txt"),
            status: dir.join("status.txt"),
        }
    }

    /// Create the record in its initial observable state: empty transcripts
    /// (output preserved if it already exists) and a `queued` token. Observers
    /// can see a pending job before its process starts.
    pub fn prepare(&self) -> Result<()> {
        for path in [&self.output, &self.error, &self.status] {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        if !self.output.exists() {
            std::fs::write(&self.output, "")?;
        }
        std::fs::write(&self.error, "")?;
        self.set_status(RunStatus::Queued)?;
        Ok(())
    }

    pub fn set_status(&self, status: RunStatus) -> Result<()> {
        std::fs::write(&self.status, status.to_string())
            .with_context(|| format!("failed to write {}", self.status.display()))?;
        Ok(())
    }

    /// Read the current token. `None` when the file is missing or holds an
    /// unrecognized value.
    pub fn read_status(&self) -> Option<RunStatus> {
        let text = std::fs::read_to_string(&self.status).ok()?;
        text.parse().ok()
    }

    /// Append a diagnostic line to the error transcript. Diagnostics are never
    /// silently dropped, so failures here propagate.
    pub fn append_error(&self, line: &str) -> Result<()> {
        use std::io::Write;
        let mut fh = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.error)
            .with_context(|| format!("failed to open {}", self.error.display()))?;
        writeln!(fh, "{line}")?;
        Ok(())
    }
}
