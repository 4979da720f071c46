//! Output-project git integration via libgit2.
//!
//! [`GitManager`] covers the two writers of the output project: the
//! sequential executor's per-job commit, and the checkpoint replay
//! controller's branch surgery. Commit messages are tagged `<job_id>: …`
//! (ASCII or full-width colon), which is what checkpoint lookup keys on.

use anyhow::{Context, Result};
use chrono::Utc;
use git2::{BranchType, IndexAddOption, Oid, Repository, Signature, StatusOptions};
use std::path::Path;

use crate::error::PilotError;

/// Bounded fallback scan depth for checkpoint lookup.
const CHECKPOINT_SCAN_LIMIT: usize = 200;

pub struct GitManager {
    repo: Repository,
}

/// Branch names resulting from a mainline rewind.
#[derive(Debug, Clone)]
pub struct RewindOutcome {
    pub mainline: String,
    pub history_branch: String,
    pub checkpoint: Oid,
}

impl GitManager {
    /// Open an existing repository at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let repo = Repository::open(path).context("failed to open git repository")?;
        Ok(Self { repo })
    }

    /// Open `path` as a repository, initializing it (with an empty root
    /// commit, so HEAD is always valid) on first use. Idempotent.
    pub fn ensure(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        if let Ok(repo) = Repository::open(path) {
            return Ok(Self { repo });
        }
        let repo = Repository::init(path).context("failed to init git repository")?;
        {
            let sig = signature(&repo)?;
            let tree_oid = repo.index()?.write_tree()?;
            let tree = repo.find_tree(tree_oid)?;
            repo.commit(Some("HEAD"), &sig, &sig, "init output project", &tree, &[])?;
        }
        Ok(Self { repo })
    }

    /// True when the working tree has no uncommitted or untracked changes.
    pub fn is_clean(&self) -> Result<bool> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true).include_ignored(false);
        let statuses = self.repo.statuses(Some(&mut opts))?;
        Ok(statuses.is_empty())
    }

    /// Stage everything and commit, returning the short hash.
    pub fn commit_all(&self, message: &str) -> Result<String> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.write()?;

        let tree_oid = index.write_tree()?;
        let tree = self.repo.find_tree(tree_oid)?;
        let sig = signature(&self.repo)?;

        let parent = self.repo.head().and_then(|h| h.peel_to_commit()).ok();
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        let commit_oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;

        let short = &commit_oid.to_string()[..7];
        Ok(short.to_string())
    }

    /// Commit one job's accumulated changes with the tagged message format
    /// checkpoint lookup depends on.
    pub fn commit_job(&self, job_id: &str) -> Result<String> {
        self.commit_all(&format!("{job_id}: job output"))
    }

    pub fn current_branch(&self) -> Result<String> {
        let head = self.repo.head()?;
        let name = head
            .shorthand()
            .context("branch name is not valid UTF-8")?
            .to_string();
        Ok(name)
    }

    /// Find the checkpoint commit for `job_id`.
    ///
    /// Lookup order: exact `<id>:`/`<id>：` message tag, then a commit tagged
    /// with the same ordinal prefix, then a bounded scan of the most recent
    /// commits for any message starting with the id.
    pub fn find_checkpoint(&self, job_id: &str) -> Result<Oid> {
        let mut walk = self.repo.revwalk()?;
        walk.push_head()?;

        let exact = [format!("{job_id}:"), format!("{job_id}：")];
        let ordinal_prefix = job_id.split('-').next().map(|n| format!("{n}-"));

        let mut ordinal_hit: Option<Oid> = None;
        let mut scan_hit: Option<Oid> = None;

        for (idx, oid) in walk.flatten().enumerate() {
            let commit = self.repo.find_commit(oid)?;
            let summary = commit.summary().unwrap_or("");
            if exact.iter().any(|tag| summary.starts_with(tag)) {
                return Ok(oid);
            }
            if ordinal_hit.is_none()
                && let Some(prefix) = &ordinal_prefix
                && summary.starts_with(prefix)
            {
                ordinal_hit = Some(oid);
            }
            if scan_hit.is_none() && idx < CHECKPOINT_SCAN_LIMIT && summary.starts_with(job_id) {
                scan_hit = Some(oid);
            }
        }

        ordinal_hit
            .or(scan_hit)
            .ok_or_else(|| PilotError::CheckpointNotFound(job_id.to_string()).into())
    }

    /// Make `checkpoint` the new tip of the mainline branch.
    ///
    /// The current mainline is renamed to a timestamped history branch, so
    /// every commit after the checkpoint stays reachable; the mainline name
    /// then points at the checkpoint and the worktree is reset to it.
    pub fn rewind_mainline(&self, checkpoint: Oid) -> Result<RewindOutcome> {
        let stamp = Utc::now().format("%Y%m%d-%H%M%S").to_string();
        self.rewind_mainline_stamped(checkpoint, &stamp)
    }

    fn rewind_mainline_stamped(&self, checkpoint: Oid, stamp: &str) -> Result<RewindOutcome> {
        let mainline = self.current_branch()?;
        let staging = format!("replay-{stamp}");
        let history_branch = format!("history-{stamp}");

        // Both generated names must be free before the first mutation;
        // a half-renamed branch set would be worse than a retry.
        for name in [&staging, &history_branch] {
            if self.has_branch(name) {
                return Err(PilotError::ReplayPrecondition(format!(
                    "branch {name} already exists; retry in a moment"
                ))
                .into());
            }
        }

        let commit = self.repo.find_commit(checkpoint)?;
        self.repo.branch(&staging, &commit, false)?;

        self.repo
            .find_branch(&mainline, BranchType::Local)?
            .rename(&history_branch, false)
            .context("failed to move mainline to history branch")?;
        self.repo
            .find_branch(&staging, BranchType::Local)?
            .rename(&mainline, false)
            .context("failed to promote checkpoint branch to mainline")?;

        self.repo.set_head(&format!("refs/heads/{mainline}"))?;
        self.repo
            .checkout_head(Some(git2::build::CheckoutBuilder::default().force()))?;

        Ok(RewindOutcome {
            mainline,
            history_branch,
            checkpoint,
        })
    }

    /// Tip commit id of the current branch.
    pub fn head_oid(&self) -> Result<Oid> {
        Ok(self.repo.head()?.peel_to_commit()?.id())
    }

    /// Whether a local branch with this name exists.
    pub fn has_branch(&self, name: &str) -> bool {
        self.repo.find_branch(name, BranchType::Local).is_ok()
    }
}

fn signature(repo: &Repository) -> Result<Signature<'static>> {
    let sig = repo
        .signature()
        .or_else(|_| Signature::now("taskpilot", "taskpilot@localhost"))?;
    Ok(sig)
}
