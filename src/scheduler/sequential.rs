//! Mode B: sequential isolated executor.
//!
//! Strictly one job at a time, in catalog order. Each job gets a fresh
//! ephemeral subtree, the agent runs inside it, and on success the output
//! project receives one tagged commit. Progress is persisted to the status
//! store around every job so a crash or restart resumes exactly where the
//! batch left off. The loop never parallelizes: the subtree is one reused
//! location.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;

use crate::catalog::{Job, list_jobs};
use crate::classify::classify_and_record;
use crate::error::CODE_INTERRUPTED;
use crate::git::GitManager;
use crate::progress::JobSpinner;
use crate::run_record::RunRecord;
use crate::runner::{AgentCommand, RunRequest, run};
use crate::status::{StatusRecord, StatusStore};
use crate::template::{PromptTemplate, PromptVars};
use crate::workspace::Workspace;

/// The sequential executor and everything it needs per batch.
pub struct Executor {
    pub catalog_root: PathBuf,
    pub workspace: Workspace,
    pub project_root: PathBuf,
    pub command: AgentCommand,
    pub doc_ext: String,
    pub timeout: Option<Duration>,
    /// Pause between jobs.
    pub delay: Duration,
    pub api_key: Option<String>,
    /// Fallback template when a job has no template of its own.
    pub prompt_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub interrupted: bool,
}

impl Executor {
    /// Select the next runnable job: first in catalog order that is neither
    /// completed nor retired by the failure limit.
    fn next_job<'a>(
        &self,
        jobs: &'a [Job],
        record: &StatusRecord,
        logged_retired: &mut HashSet<String>,
    ) -> Option<&'a Job> {
        for job in jobs {
            if record.is_completed(&job.id) {
                continue;
            }
            if record.is_retired(&job.id) {
                // Visible as skipped, never silently dropped.
                if logged_retired.insert(job.id.clone()) {
                    eprintln!("[run] skipping {}: reached the failure limit", job.id);
                }
                continue;
            }
            return Some(job);
        }
        None
    }

    /// Drive the whole batch to completion (or until interrupted).
    pub async fn run_all(&self, cancel: &mut watch::Receiver<bool>) -> Result<BatchSummary> {
        let jobs = list_jobs(&self.catalog_root, &self.doc_ext)?;
        let mut store = StatusStore::load(&self.workspace.status_path())?;
        let mut logged_retired = HashSet::new();
        let mut summary = BatchSummary {
            processed: 0,
            interrupted: false,
        };

        loop {
            if *cancel.borrow() {
                summary.interrupted = true;
                break;
            }
            let Some(job) = self.next_job(&jobs, &store.record, &mut logged_retired) else {
                break;
            };
            let job = job.clone();

            // First mutation: a crash from here on leaves `current` pointing
            // at this job.
            store.mark_current(&job.id);
            store.save()?;

            let code = self.run_single(&job, cancel).await;
            match code {
                Ok(0) => store.mark_completed(&job.id),
                Ok(CODE_INTERRUPTED) => {
                    store.mark_interrupted(&job.id);
                    summary.interrupted = true;
                }
                Ok(code) => store.mark_failed(&job.id, code),
                Err(err) => {
                    eprintln!("[run] {} error: {err:#}", job.id);
                    store.mark_failed(&job.id, 1);
                }
            }
            summary.processed += 1;

            // Last mutations, mirroring mark_current above.
            store.clear_current();
            store.save()?;

            if summary.interrupted {
                break;
            }
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }

        Ok(summary)
    }

    /// Prepare, execute, classify, and commit one job. Returns the final
    /// classified code; infrastructure errors bubble up as `Err` and count as
    /// a failure for this job only.
    async fn run_single(&self, job: &Job, cancel: &mut watch::Receiver<bool>) -> Result<i32> {
        let staged = self.workspace.prepare(job)?;
        let git = GitManager::ensure(&self.project_root)
            .context("failed to prepare output project")?;

        let prompt = self.render_prompt(job, &staged.report, staged.assets.as_deref());
        let record = RunRecord::in_dir(&self.workspace.log_dir(&job.id));
        let request = RunRequest {
            command: self.command.clone(),
            prompt,
            cwd: self.workspace.current.clone(),
            timeout: self.timeout,
            api_key: self.api_key.clone(),
        };

        let spinner = JobSpinner::start(&job.id);
        let result = async {
            let outcome = run(&request, &record, cancel).await?;
            let verdict = classify_and_record(&record, outcome.code, &outcome.stdout, &[])?;
            if verdict.is_success() {
                git.commit_job(&job.id)
                    .with_context(|| format!("failed to commit job {}", job.id))?;
            }
            Ok::<i32, anyhow::Error>(verdict.code)
        }
        .await;

        // Teardown runs on every path.
        self.workspace.cleanup()?;
        match &result {
            Ok(code) => spinner.finish(&job.id, *code),
            Err(_) => spinner.finish(&job.id, 1),
        }
        result
    }

    /// Job-specific template, then the configured fallback, then the default.
    fn render_prompt(&self, job: &Job, report: &str, assets: Option<&str>) -> String {
        let per_job = self
            .catalog_root
            .join("prompts")
            .join(format!("{}.txt", job.id));
        let template = if per_job.is_file() {
            PromptTemplate::load_or_default(Some(&per_job))
        } else {
            PromptTemplate::load_or_default(self.prompt_file.as_deref())
        };

        let project_name = self
            .project_root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("project")
            .to_string();
        template.render(&PromptVars {
            workspace: self.workspace.root.display().to_string(),
            current: self.workspace.current.display().to_string(),
            project: self.project_root.display().to_string(),
            project_name,
            job_id: job.id.clone(),
            report: report.to_string(),
            assets: assets.unwrap_or_default().to_string(),
        })
    }
}
