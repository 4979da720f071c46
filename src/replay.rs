//! Checkpoint replay: rewind the output project to a past job's commit and
//! rewrite the status store so the sequential executor resumes right after it.
//!
//! The operation is linear with no retries. Every precondition is checked
//! before the first mutation, so an abort leaves both the repository and the
//! status store exactly as they were.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::catalog::{list_jobs, resolve_job_id};
use crate::error::PilotError;
use crate::git::GitManager;
use crate::status::StatusStore;

/// What a successful replay did, for operator-facing output.
#[derive(Debug, Clone)]
pub struct ReplayReport {
    /// Fully resolved target job id.
    pub job_id: String,
    pub checkpoint: String,
    pub mainline: String,
    /// Branch now holding the discarded-from-mainline commits.
    pub history_branch: String,
    /// Ids the status store now lists as completed.
    pub completed: Vec<String>,
}

pub struct ReplayController {
    pub catalog_root: PathBuf,
    pub project_root: PathBuf,
    pub status_path: PathBuf,
    pub doc_ext: String,
}

impl ReplayController {
    /// Rewind to `target` (full id, bare ordinal, or zero-padded ordinal).
    pub fn replay(&self, target: &str) -> Result<ReplayReport> {
        // Phase 1: resolve and validate everything. No mutation yet.
        let jobs = list_jobs(&self.catalog_root, &self.doc_ext)?;
        let job_id = resolve_job_id(&jobs, target)
            .ok_or_else(|| PilotError::JobNotFound(target.to_string()))?;

        let git = GitManager::open(&self.project_root)?;
        if !git.is_clean()? {
            return Err(PilotError::ReplayPrecondition(format!(
                "output project at {} has uncommitted changes; commit or discard them first",
                self.project_root.display()
            ))
            .into());
        }
        let checkpoint = git.find_checkpoint(&job_id)?;
        let mut store = StatusStore::load(&self.status_path)?;

        // Phase 2: branch surgery, then the status rewrite.
        let outcome = git.rewind_mainline(checkpoint)?;

        let completed: Vec<String> = jobs
            .iter()
            .map(|j| j.id.clone())
            .take_while(|id| id != &job_id)
            .chain(std::iter::once(job_id.clone()))
            .collect();
        store.rewrite_for_replay(completed.clone());
        store.save()?;

        Ok(ReplayReport {
            job_id,
            checkpoint: outcome.checkpoint.to_string(),
            mainline: outcome.mainline,
            history_branch: outcome.history_branch,
            completed,
        })
    }
}

/// Convenience constructor mirroring the sequential executor's layout: the
/// status store lives at `<workspace_root>/status.json`.
pub fn controller(
    catalog_root: &Path,
    project_root: &Path,
    workspace_root: &Path,
    doc_ext: &str,
) -> ReplayController {
    ReplayController {
        catalog_root: catalog_root.to_path_buf(),
        project_root: project_root.to_path_buf(),
        status_path: workspace_root.join("status.json"),
        doc_ext: doc_ext.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const IDS: [&str; 4] = ["001-aaa0000", "002-bbb1111", "003-ccc2222", "004-ddd3333"];

    fn seed(tmp: &TempDir) -> ReplayController {
        let catalog_root = tmp.path().join("catalog");
        let reports = catalog_root.join("reports");
        fs::create_dir_all(&reports).unwrap();
        for id in IDS {
            fs::write(reports.join(format!("{id}.tex")), id).unwrap();
        }

        let project_root = tmp.path().join("project");
        let git = GitManager::ensure(&project_root).unwrap();
        for id in IDS {
            fs::write(project_root.join(format!("{id}.txt")), id).unwrap();
            git.commit_job(id).unwrap();
        }

        let status_path = tmp.path().join("ws/status.json");
        let mut store = StatusStore::load(&status_path).unwrap();
        for id in IDS {
            store.mark_completed(id);
        }
        store.save().unwrap();

        ReplayController {
            catalog_root,
            project_root,
            status_path,
            doc_ext: "tex".into(),
        }
    }

    #[test]
    fn replay_rewinds_branch_and_status_prefix() {
        let tmp = TempDir::new().unwrap();
        let ctl = seed(&tmp);

        let report = ctl.replay("002-bbb1111").unwrap();
        assert_eq!(report.job_id, "002-bbb1111");
        assert_eq!(report.completed, vec!["001-aaa0000", "002-bbb1111"]);

        let git = GitManager::open(&ctl.project_root).unwrap();
        assert_eq!(git.head_oid().unwrap().to_string(), report.checkpoint);
        assert!(git.has_branch(&report.history_branch));
        // Worktree matches the checkpoint: later outputs are gone.
        assert!(ctl.project_root.join("002-bbb1111.txt").exists());
        assert!(!ctl.project_root.join("003-ccc2222.txt").exists());

        let store = StatusStore::load(&ctl.status_path).unwrap();
        assert_eq!(store.record.completed, vec!["001-aaa0000", "002-bbb1111"]);
        assert!(store.record.failed.is_empty());
        assert!(store.record.current.is_none());
    }

    #[test]
    fn ordinal_shorthand_resolves_the_target() {
        let tmp = TempDir::new().unwrap();
        let ctl = seed(&tmp);

        let report = ctl.replay("3").unwrap();
        assert_eq!(report.job_id, "003-ccc2222");
        assert_eq!(report.completed.len(), 3);

        let report2 = seed(&TempDir::new().unwrap()).replay("003").unwrap();
        assert_eq!(report2.job_id, "003-ccc2222");
    }

    #[test]
    fn dirty_worktree_aborts_without_mutation() {
        let tmp = TempDir::new().unwrap();
        let ctl = seed(&tmp);
        fs::write(ctl.project_root.join("dirty.txt"), "uncommitted").unwrap();

        let git = GitManager::open(&ctl.project_root).unwrap();
        let head_before = git.head_oid().unwrap();
        let branch_before = git.current_branch().unwrap();

        let err = ctl.replay("002-bbb1111").unwrap_err();
        assert!(err.to_string().contains("uncommitted"));

        assert_eq!(git.head_oid().unwrap(), head_before);
        assert_eq!(git.current_branch().unwrap(), branch_before);
        let store = StatusStore::load(&ctl.status_path).unwrap();
        assert_eq!(store.record.completed.len(), IDS.len());
    }

    #[test]
    fn unknown_job_id_aborts_without_mutation() {
        let tmp = TempDir::new().unwrap();
        let ctl = seed(&tmp);

        let git = GitManager::open(&ctl.project_root).unwrap();
        let head_before = git.head_oid().unwrap();

        assert!(ctl.replay("999-nothere").is_err());
        assert_eq!(git.head_oid().unwrap(), head_before);
        let store = StatusStore::load(&ctl.status_path).unwrap();
        assert_eq!(store.record.completed.len(), IDS.len());
    }

    #[test]
    fn checkpointless_job_aborts_before_status_rewrite() {
        let tmp = TempDir::new().unwrap();
        let ctl = seed(&tmp);
        // Catalog knows a fifth job the project never committed.
        fs::write(
            ctl.catalog_root.join("reports/005-eee4444.tex"),
            "doc",
        )
        .unwrap();

        assert!(ctl.replay("005-eee4444").is_err());
        let store = StatusStore::load(&ctl.status_path).unwrap();
        assert_eq!(store.record.completed.len(), IDS.len());
    }
}
