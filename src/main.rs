mod catalog;
mod classify;
mod cli;
mod config;
mod error;
mod git;
mod progress;
mod replay;
mod run_record;
mod runner;
mod scheduler;
mod status;
mod template;
mod workspace;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;

use cli::{Cli, Command};
use config::PilotConfig;
use error::CODE_INTERRUPTED;
use runner::AgentCommand;
use scheduler::{BatchOptions, Executor, run_batch};
use status::StatusStore;
use workspace::Workspace;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match dispatch(cli).await {
        Ok(code) => ExitCode::from(code.clamp(0, 255) as u8),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Watch channel flipped to `true` on the first Ctrl-C. The sender lives in
/// the spawned task for the rest of the process, so receivers never observe
/// a closed channel.
fn cancel_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\ninterrupt received, stopping after the current job...");
            let _ = tx.send(true);
        }
        std::future::pending::<()>().await;
    });
    rx
}

fn nonzero_timeout(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

async fn dispatch(cli: Cli) -> Result<i32> {
    let config = match &cli.config {
        Some(path) => PilotConfig::load_from(path)?,
        None => PilotConfig::load()?,
    };
    let api_key = config.resolve_api_key(cli.api_key.as_deref());
    if cli.verbose {
        eprintln!(
            "[taskpilot] agent={} {:?}, credential {}",
            config.agent_bin,
            config.agent_args,
            if api_key.is_some() { "set" } else { "absent" }
        );
    }

    match cli.command {
        Command::Batch {
            root,
            limit,
            force,
            timeout_secs,
            max_parallel,
            prompt_file,
            expected_artifacts,
        } => {
            let opts = BatchOptions {
                limit,
                force,
                timeout: nonzero_timeout(timeout_secs.unwrap_or(config.timeout_secs)),
                max_parallel: max_parallel.unwrap_or(config.max_parallel),
                api_key,
                prompt_file: prompt_file.or_else(|| config.prompt_file.clone()),
                expected_artifacts,
            };
            let command = AgentCommand::from_config(&config);
            let cancel = cancel_signal();
            run_batch(&root, &command, &opts, &cancel).await
        }

        Command::Run {
            catalog,
            workspace,
            project,
            timeout_secs,
            delay_secs,
            prompt_file,
        } => {
            let executor = build_executor(
                &config,
                api_key,
                catalog,
                &workspace,
                project,
                timeout_secs,
                delay_secs,
                prompt_file,
            );
            let mut cancel = cancel_signal();
            run_sequential(&executor, &mut cancel).await
        }

        Command::Replay {
            target,
            catalog,
            workspace,
            project,
            no_resume,
        } => {
            let controller =
                replay::controller(&catalog, &project, &workspace, &config.doc_ext);
            let report = controller.replay(&target)?;
            println!(
                "rewound {} to checkpoint {} for {}",
                report.mainline,
                &report.checkpoint[..7],
                report.job_id
            );
            println!("previous history kept on branch {}", report.history_branch);
            println!("{} job(s) now marked completed", report.completed.len());

            if no_resume {
                return Ok(0);
            }
            let executor = build_executor(
                &config,
                api_key,
                catalog,
                &workspace,
                project,
                None,
                None,
                None,
            );
            let mut cancel = cancel_signal();
            run_sequential(&executor, &mut cancel).await
        }

        Command::Status { workspace } => {
            let store = StatusStore::load(&workspace.join("status.json"))?;
            progress::print_summary(&store.record);
            Ok(0)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn build_executor(
    config: &PilotConfig,
    api_key: Option<String>,
    catalog: PathBuf,
    workspace: &Path,
    project: PathBuf,
    timeout_secs: Option<u64>,
    delay_secs: Option<u64>,
    prompt_file: Option<PathBuf>,
) -> Executor {
    Executor {
        catalog_root: catalog,
        workspace: Workspace::at(workspace),
        project_root: project,
        command: AgentCommand::from_config(config),
        doc_ext: config.doc_ext.clone(),
        timeout: nonzero_timeout(timeout_secs.unwrap_or(config.timeout_secs)),
        delay: Duration::from_secs(delay_secs.unwrap_or(config.delay_secs)),
        api_key,
        prompt_file: prompt_file.or_else(|| config.prompt_file.clone()),
    }
}

/// Run the sequential executor and derive the process exit code from what
/// the batch left behind.
async fn run_sequential(
    executor: &Executor,
    cancel: &mut watch::Receiver<bool>,
) -> Result<i32> {
    let summary = executor.run_all(cancel).await?;
    if summary.interrupted {
        return Ok(CODE_INTERRUPTED);
    }
    let store = StatusStore::load(&executor.workspace.status_path())?;
    progress::print_summary(&store.record);
    Ok(if store.record.failed.is_empty() { 0 } else { 1 })
}
