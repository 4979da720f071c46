//! Process runner: spawns the external agent for one job, streams its output
//! into the run record, and enforces timeout and cancellation.
//!
//! The agent is invoked as `<bin> <fixed args…> <prompt>` with the credential
//! injected through a dedicated environment variable. Stdout and stderr are
//! pumped line-by-line to the transcript files by dedicated tasks while the
//! orchestrating task waits on the child, bounded by the wall-clock deadline
//! and the stop signal. Every exit path finalizes the status token.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::{API_KEY_ENV, PilotConfig};
use crate::error::{CODE_INTERRUPTED, CODE_SPAWN_FAILURE, CODE_TIMEOUT};
use crate::run_record::{RunRecord, RunStatus};

/// How long a terminated process gets to exit before being killed.
const GRACE_PERIOD: Duration = Duration::from_secs(5);

/// The agent invocation minus the per-job prompt.
#[derive(Debug, Clone)]
pub struct AgentCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl AgentCommand {
    pub fn from_config(config: &PilotConfig) -> Self {
        Self {
            program: config.agent_bin.clone(),
            args: config.agent_args.clone(),
        }
    }
}

/// One job's invocation parameters.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub command: AgentCommand,
    pub prompt: String,
    pub cwd: PathBuf,
    /// `None` disables the wall-clock limit.
    pub timeout: Option<Duration>,
    pub api_key: Option<String>,
}

/// Raw result of one agent run, before classification.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Execute the agent for one job.
///
/// The record's status token moves `queued` → `running` → final code; the
/// final write happens on every path, including spawn failure, timeout, and
/// cancellation.
pub async fn run(
    request: &RunRequest,
    record: &RunRecord,
    cancel: &mut watch::Receiver<bool>,
) -> Result<RunOutcome> {
    record.prepare()?;

    if *cancel.borrow() {
        record.set_status(RunStatus::Interrupted)?;
        return Ok(RunOutcome {
            code: CODE_INTERRUPTED,
            stdout: String::new(),
            stderr: String::new(),
        });
    }

    let mut cmd = Command::new(&request.command.program);
    cmd.args(&request.command.args)
        .arg(&request.prompt)
        .current_dir(&request.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(key) = &request.api_key {
        cmd.env(API_KEY_ENV, key);
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            record.append_error(&format!(
                "failed to spawn agent '{}': {err}",
                request.command.program
            ))?;
            record.set_status(RunStatus::from_code(CODE_SPAWN_FAILURE))?;
            return Ok(RunOutcome {
                code: CODE_SPAWN_FAILURE,
                stdout: String::new(),
                stderr: err.to_string(),
            });
        }
    };
    record.set_status(RunStatus::Running)?;

    let out_pump = pump(child.stdout.take(), record.output.clone());
    let err_pump = pump(child.stderr.take(), record.error.clone());

    let timeout = request.timeout.filter(|d| !d.is_zero());
    let sleep = tokio::time::sleep(timeout.unwrap_or(FAR_FUTURE));
    tokio::pin!(sleep);

    let mut cancel_open = true;
    let code = loop {
        tokio::select! {
            status = child.wait() => {
                break exit_code(status.context("failed to wait for agent process")?);
            }
            _ = &mut sleep, if timeout.is_some() => {
                terminate_then_kill(&mut child).await;
                let secs = timeout.unwrap_or_default().as_secs();
                record.append_error(&format!("[timeout after {secs}s]"))?;
                break CODE_TIMEOUT;
            }
            changed = cancel.changed(), if cancel_open => {
                match changed {
                    Ok(()) if *cancel.borrow() => {
                        terminate_then_kill(&mut child).await;
                        record.append_error("[interrupted by user]")?;
                        break CODE_INTERRUPTED;
                    }
                    Ok(()) => {}
                    // Sender gone: cancellation can no longer arrive.
                    Err(_) => cancel_open = false,
                }
            }
        }
    };

    let stdout = out_pump.await.unwrap_or_default();
    let stderr = err_pump.await.unwrap_or_default();

    record.set_status(RunStatus::from_code(code))?;
    Ok(RunOutcome {
        code,
        stdout,
        stderr,
    })
}

// Effectively "no deadline" for the select arm that is disabled anyway.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365);

/// Stream one pipe line-by-line into a transcript file while accumulating the
/// full text for the caller. Transcript write failures do not abort the run.
fn pump(
    stream: Option<impl AsyncRead + Unpin + Send + 'static>,
    path: PathBuf,
) -> JoinHandle<String> {
    tokio::spawn(async move {
        let Some(stream) = stream else {
            return String::new();
        };
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .ok();
        let mut lines = BufReader::new(stream).lines();
        let mut acc = String::new();
        while let Ok(Some(line)) = lines.next_line().await {
            acc.push_str(&line);
            acc.push('\n');
            if let Some(fh) = file.as_mut() {
                let _ = fh.write_all(line.as_bytes()).await;
                let _ = fh.write_all(b"\n").await;
                let _ = fh.flush().await;
            }
        }
        acc
    })
}

/// Graceful terminate, short grace period, then forceful kill.
async fn terminate_then_kill(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: plain signal delivery to a child we own.
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }
        if tokio::time::timeout(GRACE_PERIOD, child.wait())
            .await
            .is_ok()
        {
            return;
        }
    }
    let _ = child.kill().await;
}

fn exit_code(status: std::process::ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return 128 + sig;
        }
    }
    status.code().unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn shell() -> AgentCommand {
        AgentCommand {
            program: "sh".into(),
            args: vec!["-c".into()],
        }
    }

    fn request(prompt: &str, cwd: &std::path::Path) -> RunRequest {
        RunRequest {
            command: shell(),
            prompt: prompt.into(),
            cwd: cwd.to_path_buf(),
            timeout: None,
            api_key: None,
        }
    }

    fn no_cancel() -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        // Keep the sender alive for the whole test.
        std::mem::forget(tx);
        rx
    }

    #[tokio::test]
    async fn streams_both_transcripts() {
        let tmp = TempDir::new().unwrap();
        let record = RunRecord::in_dir(tmp.path());
        let req = request("echo hello; echo oops >&2", tmp.path());

        let outcome = run(&req, &record, &mut no_cancel()).await.unwrap();
        assert_eq!(outcome.code, 0);
        assert_eq!(outcome.stdout, "hello\n");
        assert_eq!(outcome.stderr, "oops\n");
        assert_eq!(fs::read_to_string(&record.output).unwrap(), "hello\n");
        assert_eq!(fs::read_to_string(&record.error).unwrap(), "oops\n");
        assert_eq!(record.read_status(), Some(RunStatus::Succeeded));
    }

    #[tokio::test]
    async fn output_transcript_appends_across_runs() {
        let tmp = TempDir::new().unwrap();
        let record = RunRecord::in_dir(tmp.path());
        let req = request("echo round; echo err >&2", tmp.path());

        run(&req, &record, &mut no_cancel()).await.unwrap();
        run(&req, &record, &mut no_cancel()).await.unwrap();

        assert_eq!(
            fs::read_to_string(&record.output).unwrap(),
            "round\nround\n"
        );
        // Error transcript is per-run.
        assert_eq!(fs::read_to_string(&record.error).unwrap(), "err\n");
    }

    #[tokio::test]
    async fn timeout_maps_to_sentinel_124() {
        let tmp = TempDir::new().unwrap();
        let record = RunRecord::in_dir(tmp.path());
        let mut req = request("sleep 30", tmp.path());
        req.timeout = Some(Duration::from_millis(300));

        let outcome = run(&req, &record, &mut no_cancel()).await.unwrap();
        assert_eq!(outcome.code, CODE_TIMEOUT);
        assert_eq!(record.read_status(), Some(RunStatus::TimedOut));
        assert!(fs::read_to_string(&record.error).unwrap().contains("[timeout after"));
    }

    #[tokio::test]
    async fn missing_binary_maps_to_127() {
        let tmp = TempDir::new().unwrap();
        let record = RunRecord::in_dir(tmp.path());
        let req = RunRequest {
            command: AgentCommand {
                program: "taskpilot-no-such-agent".into(),
                args: vec![],
            },
            prompt: "irrelevant".into(),
            cwd: tmp.path().to_path_buf(),
            timeout: None,
            api_key: None,
        };

        let outcome = run(&req, &record, &mut no_cancel()).await.unwrap();
        assert_eq!(outcome.code, CODE_SPAWN_FAILURE);
        assert_eq!(record.read_status(), Some(RunStatus::Failed(127)));
    }

    #[tokio::test]
    async fn cancellation_maps_to_sentinel_130() {
        let tmp = TempDir::new().unwrap();
        let record = RunRecord::in_dir(tmp.path());
        let req = request("sleep 30", tmp.path());

        let (tx, mut rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let _ = tx.send(true);
        });

        let outcome = run(&req, &record, &mut rx).await.unwrap();
        assert_eq!(outcome.code, CODE_INTERRUPTED);
        assert_eq!(record.read_status(), Some(RunStatus::Interrupted));
    }

    #[tokio::test]
    async fn credential_is_injected_into_agent_env() {
        let tmp = TempDir::new().unwrap();
        let record = RunRecord::in_dir(tmp.path());
        let mut req = request("printenv CODEX_API_KEY", tmp.path());
        req.api_key = Some("sk-test-key".into());

        let outcome = run(&req, &record, &mut no_cancel()).await.unwrap();
        assert_eq!(outcome.stdout, "sk-test-key\n");
    }
}
