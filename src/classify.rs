//! Result classification: turns a raw process result into a verified verdict.
//!
//! The agent can exit 0 while having failed upstream — provider errors show
//! up only in its conversational output, and partial completions leave
//! promised artifacts missing. Classification therefore never trusts a zero
//! exit code alone.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::run_record::{RunRecord, RunStatus};

/// Only this many trailing stdout lines are scanned for failure markers.
/// Earlier transcript content is deliberately ignored to avoid false
/// positives from benign log noise.
pub const TAIL_SCAN_LINES: usize = 10;

/// Phrases that indicate an upstream failure despite a zero exit code.
/// Matched case-insensitively against the stdout tail.
const FAILURE_MARKERS: &[&str] = &[
    "error:",
    "stream error",
    "error sending request",
    "timed out",
    "timeout",
    "deadline exceeded",
    "connection reset",
    "broken pipe",
    "temporary failure in name resolution",
    "service unavailable",
    "bad gateway",
    "too many requests",
    "rate limit",
    "invalid api key",
    "unauthenticated",
    "certificate verify failed",
];

/// Outcome of classification: the final code and any diagnostic notes that
/// were (or should be) appended to the error transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub code: i32,
    pub notes: Vec<String>,
}

impl Classification {
    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}

/// Return the failure markers present in the last [`TAIL_SCAN_LINES`] lines
/// of `stdout`.
pub fn scan_tail(stdout: &str) -> Vec<&'static str> {
    let lines: Vec<&str> = stdout.lines().collect();
    let start = lines.len().saturating_sub(TAIL_SCAN_LINES);
    let tail = lines[start..].join("\n").to_lowercase();
    FAILURE_MARKERS
        .iter()
        .copied()
        .filter(|m| tail.contains(m))
        .collect()
}

/// Classify a finished run.
///
/// A non-zero exit code is final as-is. A zero exit code can be overridden to
/// failure 1 by a marker in the stdout tail or by a missing promised
/// artifact.
pub fn classify(exit_code: i32, stdout: &str, expected_artifacts: &[PathBuf]) -> Classification {
    if exit_code != 0 {
        return Classification {
            code: exit_code,
            notes: Vec::new(),
        };
    }

    let mut notes = Vec::new();

    let hits = scan_tail(stdout);
    if !hits.is_empty() {
        notes.push(format!(
            "[post-check] detected error markers: {}",
            hits.join(", ")
        ));
    }

    let missing: Vec<String> = expected_artifacts
        .iter()
        .filter(|p| !p.exists())
        .map(|p| display_name(p))
        .collect();
    if !missing.is_empty() {
        notes.push(format!("missing outputs: {}", missing.join(", ")));
    }

    Classification {
        code: if notes.is_empty() { 0 } else { 1 },
        notes,
    }
}

/// Classify and record: append diagnostics to the error transcript and, when
/// the verdict changed, rewrite the status token to the final code.
pub fn classify_and_record(
    record: &RunRecord,
    exit_code: i32,
    stdout: &str,
    expected_artifacts: &[PathBuf],
) -> Result<Classification> {
    let verdict = classify(exit_code, stdout, expected_artifacts);
    for note in &verdict.notes {
        record.append_error(note)?;
    }
    if verdict.code != exit_code {
        record.set_status(RunStatus::from_code(verdict.code))?;
    }
    Ok(verdict)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string())
}
