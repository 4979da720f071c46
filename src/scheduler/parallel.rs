//! Mode A: embarrassingly-parallel batch over independent job directories.
//!
//! Each candidate directory already holds its inputs; there is no per-job
//! setup or teardown and no shared status store. Success is derived purely
//! from each directory's own run record, so concurrent workers share nothing
//! except the commutative worst-result fold.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use tokio::sync::watch;

use crate::classify::{classify_and_record, scan_tail};
use crate::progress::Reporter;
use crate::run_record::{RunRecord, RunStatus};
use crate::runner::{AgentCommand, RunRequest, run};
use crate::template::{PromptTemplate, PromptVars};

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Truncate the candidate list; 0 means no limit.
    pub limit: usize,
    /// Delete stale error/status files so old state cannot short-circuit
    /// classification. The output transcript is never deleted.
    pub force: bool,
    pub timeout: Option<Duration>,
    pub max_parallel: usize,
    pub api_key: Option<String>,
    pub prompt_file: Option<PathBuf>,
    /// Artifacts each job promises, relative to its directory.
    pub expected_artifacts: Vec<String>,
}

/// Run the batch; returns the worst result code (0 when every job
/// succeeded, 1 otherwise).
pub async fn run_batch(
    root: &Path,
    command: &AgentCommand,
    opts: &BatchOptions,
    cancel: &watch::Receiver<bool>,
) -> Result<i32> {
    let reporter = Reporter::new();

    let mut dirs: Vec<PathBuf> = std::fs::read_dir(root)
        .with_context(|| format!("failed to read {}", root.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    if opts.limit > 0 {
        dirs.truncate(opts.limit);
    }

    if opts.force {
        for dir in &dirs {
            let record = RunRecord::in_dir(dir);
            for stale in [&record.error, &record.status] {
                if stale.exists() {
                    std::fs::remove_file(stale)
                        .with_context(|| format!("failed to remove {}", stale.display()))?;
                }
            }
        }
    }

    let (skipped, to_run): (Vec<PathBuf>, Vec<PathBuf>) =
        dirs.into_iter().partition(|d| is_success(d));
    reporter.skipped(&dir_names(&skipped));
    if to_run.is_empty() {
        reporter.all_done();
        return Ok(0);
    }

    let total = to_run.len();
    reporter.total(total);

    // Make pending jobs observable before any process starts.
    for dir in &to_run {
        RunRecord::in_dir(dir).prepare()?;
    }

    let template = PromptTemplate::load_or_default(opts.prompt_file.as_deref());

    // Parallelism is not worth the overhead for a couple of jobs.
    if total <= 2 {
        let mut worst = 0;
        for dir in &to_run {
            let code = run_one(dir, root, command, &template, opts, cancel.clone()).await?;
            reporter.done(&name_of(dir), code);
            reporter.tick();
            worst = worst.max(if code == 0 { 0 } else { 1 });
        }
        return Ok(worst);
    }

    let workers = opts.max_parallel.max(1).min(total);
    reporter.parallel(workers);

    let worst = futures::stream::iter(to_run.iter())
        .map(|dir| {
            let reporter = &reporter;
            let template = &template;
            let cancel = cancel.clone();
            async move {
                reporter.start(&name_of(dir));
                let code = run_one(dir, root, command, template, opts, cancel).await;
                let code = match code {
                    Ok(c) => c,
                    Err(err) => {
                        eprintln!("[agent] {} error: {err:#}", name_of(dir));
                        1
                    }
                };
                reporter.done(&name_of(dir), code);
                reporter.tick();
                code
            }
        })
        .buffer_unordered(workers)
        .fold(0i32, |worst, code| async move {
            worst.max(if code == 0 { 0 } else { 1 })
        })
        .await;

    Ok(worst)
}

/// Execute and classify one directory's job.
async fn run_one(
    dir: &Path,
    root: &Path,
    command: &AgentCommand,
    template: &PromptTemplate,
    opts: &BatchOptions,
    mut cancel: watch::Receiver<bool>,
) -> Result<i32> {
    let record = RunRecord::in_dir(dir);
    let vars = PromptVars {
        workspace: root.display().to_string(),
        current: dir.display().to_string(),
        project: String::new(),
        project_name: String::new(),
        job_id: name_of(dir),
        report: "README.md".to_string(),
        assets: "assets".to_string(),
    };
    let request = RunRequest {
        command: command.clone(),
        prompt: template.render(&vars),
        cwd: dir.to_path_buf(),
        timeout: opts.timeout,
        api_key: opts.api_key.clone(),
    };

    let outcome = run(&request, &record, &mut cancel).await?;
    let expected: Vec<PathBuf> = opts
        .expected_artifacts
        .iter()
        .map(|rel| dir.join(rel))
        .collect();
    let verdict = classify_and_record(&record, outcome.code, &outcome.stdout, &expected)?;
    Ok(verdict.code)
}

/// A directory counts as already successful only when its status token says
/// so *and* re-scanning the output transcript's tail finds no failure marker.
fn is_success(dir: &Path) -> bool {
    let record = RunRecord::in_dir(dir);
    match record.read_status() {
        Some(RunStatus::Succeeded) => {}
        // Stale queued/running markers, failures, or no token: run it.
        _ => return false,
    }
    let output = std::fs::read_to_string(&record.output).unwrap_or_default();
    scan_tail(&output).is_empty()
}

fn name_of(dir: &Path) -> String {
    dir.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("?")
        .to_string()
}

fn dir_names(dirs: &[PathBuf]) -> Vec<String> {
    dirs.iter().map(|d| name_of(d)).collect()
}
