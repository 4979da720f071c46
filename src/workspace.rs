//! Mode B workspace: one reused ephemeral subtree plus per-job log dirs.
//!
//! The subtree (`<root>/current`) holds exactly one job's inputs at a time
//! and is destroyed after every job, success or failure. Because it is a
//! single reused location, the sequential executor must never run two jobs at
//! once; parallelizing it would require one subtree per job first.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::catalog::Job;

/// Explicit workspace value passed into each job's prepare/run/cleanup calls.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub root: PathBuf,
    pub current: PathBuf,
    pub logs: PathBuf,
}

/// Inputs staged into the subtree, with paths relative to `current/`.
#[derive(Debug, Clone)]
pub struct StagedJob {
    pub report: String,
    pub assets: Option<String>,
}

/// Small per-run metadata record written into the subtree for forensics.
#[derive(Debug, Serialize)]
struct JobMeta<'a> {
    job_id: &'a str,
    run_id: String,
    started_at: String,
    source_report: String,
    source_assets: Option<String>,
}

impl Workspace {
    pub fn at(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            current: root.join("current"),
            logs: root.join("logs"),
        }
    }

    pub fn status_path(&self) -> PathBuf {
        self.root.join("status.json")
    }

    pub fn log_dir(&self, job_id: &str) -> PathBuf {
        self.logs.join(job_id)
    }

    /// Stage one job's inputs into a fresh subtree.
    ///
    /// Any leftover subtree from a crashed run is removed first, so staging
    /// always starts from a clean slate.
    pub fn prepare(&self, job: &Job) -> Result<StagedJob> {
        if self.current.exists() {
            std::fs::remove_dir_all(&self.current)
                .with_context(|| format!("failed to clear {}", self.current.display()))?;
        }
        std::fs::create_dir_all(&self.current)?;
        std::fs::create_dir_all(&self.logs)?;

        let report_name = job
            .report
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .with_context(|| format!("bad report filename for job {}", job.id))?;
        std::fs::copy(&job.report, self.current.join(&report_name))
            .with_context(|| format!("failed to copy report for job {}", job.id))?;

        let assets_name = match &job.assets {
            Some(src) => {
                copy_dir(src, &self.current.join("assets"))?;
                Some("assets".to_string())
            }
            None => None,
        };

        let meta = JobMeta {
            job_id: &job.id,
            run_id: Uuid::new_v4().to_string(),
            started_at: Utc::now().to_rfc3339(),
            source_report: job.report.display().to_string(),
            source_assets: job.assets.as_ref().map(|p| p.display().to_string()),
        };
        std::fs::write(
            self.current.join("job_meta.json"),
            serde_json::to_string_pretty(&meta)?,
        )?;

        Ok(StagedJob {
            report: report_name,
            assets: assets_name,
        })
    }

    /// Destroy the subtree. Runs after every job regardless of outcome.
    pub fn cleanup(&self) -> Result<()> {
        if self.current.exists() {
            std::fs::remove_dir_all(&self.current)
                .with_context(|| format!("failed to remove {}", self.current.display()))?;
        }
        Ok(())
    }
}

fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn job_with_assets(tmp: &TempDir) -> Job {
        let reports = tmp.path().join("catalog/reports");
        let assets = tmp.path().join("catalog/assets/001-aaa0000");
        fs::create_dir_all(&reports).unwrap();
        fs::create_dir_all(assets.join("nested")).unwrap();
        fs::write(reports.join("001-aaa0000.tex"), "doc").unwrap();
        fs::write(assets.join("flow.puml"), "@startuml").unwrap();
        fs::write(assets.join("nested/deep.txt"), "x").unwrap();
        Job {
            id: "001-aaa0000".into(),
            report: reports.join("001-aaa0000.tex"),
            assets: Some(assets),
        }
    }

    #[test]
    fn prepare_stages_inputs_and_metadata() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::at(&tmp.path().join("ws"));
        let job = job_with_assets(&tmp);

        let staged = ws.prepare(&job).unwrap();
        assert_eq!(staged.report, "001-aaa0000.tex");
        assert_eq!(staged.assets.as_deref(), Some("assets"));
        assert!(ws.current.join("001-aaa0000.tex").exists());
        assert!(ws.current.join("assets/flow.puml").exists());
        assert!(ws.current.join("assets/nested/deep.txt").exists());

        let meta = fs::read_to_string(ws.current.join("job_meta.json")).unwrap();
        assert!(meta.contains("\"job_id\": \"001-aaa0000\""));
        assert!(meta.contains("run_id"));
    }

    #[test]
    fn prepare_clears_stale_subtree() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::at(&tmp.path().join("ws"));
        fs::create_dir_all(&ws.current).unwrap();
        fs::write(ws.current.join("stale.txt"), "leftover").unwrap();

        let job = job_with_assets(&tmp);
        ws.prepare(&job).unwrap();
        assert!(!ws.current.join("stale.txt").exists());
    }

    #[test]
    fn cleanup_removes_subtree_and_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::at(&tmp.path().join("ws"));
        let job = job_with_assets(&tmp);
        ws.prepare(&job).unwrap();

        ws.cleanup().unwrap();
        assert!(!ws.current.exists());
        ws.cleanup().unwrap();
    }

    #[test]
    fn job_without_assets_stages_report_only() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::at(&tmp.path().join("ws"));
        let mut job = job_with_assets(&tmp);
        job.assets = None;

        let staged = ws.prepare(&job).unwrap();
        assert!(staged.assets.is_none());
        assert!(!ws.current.join("assets").exists());
    }
}
