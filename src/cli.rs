//! Command-line interface, clap based.
//!
//! Defines the [`Cli`] struct with subcommands [`Command`] (batch, run,
//! replay, status) and global flags (--config, --api-key, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// taskpilot — crash-tolerant batch driver for an external CLI agent.
#[derive(Debug, Parser)]
#[command(name = "taskpilot", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (defaults to ./taskpilot.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Agent credential; overrides the config file and environment.
    #[arg(long, global = true)]
    pub api_key: Option<String>,

    /// Enable verbose output.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run every job directory under ROOT in parallel, skipping the ones
    /// already successful.
    Batch {
        /// Directory whose immediate subdirectories are the jobs.
        root: PathBuf,

        /// Only run the first N candidate directories.
        #[arg(long, default_value_t = 0)]
        limit: usize,

        /// Clear stale error/status files and re-run everything.
        #[arg(long, default_value_t = false)]
        force: bool,

        /// Per-job wall-clock limit in seconds; overrides the config.
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Worker pool bound; overrides the config.
        #[arg(long)]
        max_parallel: Option<usize>,

        /// Prompt template file; overrides the config.
        #[arg(long)]
        prompt_file: Option<PathBuf>,

        /// Artifact each job must produce, relative to its directory.
        /// Repeatable.
        #[arg(long = "expect")]
        expected_artifacts: Vec<String>,
    },

    /// Run the catalog sequentially in an isolated workspace, committing
    /// each success to the output project.
    Run {
        /// Catalog root containing reports/ and assets/.
        catalog: PathBuf,

        /// Workspace root (ephemeral subtree, logs, status store).
        #[arg(long, default_value = "workspace")]
        workspace: PathBuf,

        /// Output project root (git repository, created on first use).
        #[arg(long, default_value = "project")]
        project: PathBuf,

        /// Per-job wall-clock limit in seconds; overrides the config.
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Pause between jobs in seconds; overrides the config.
        #[arg(long)]
        delay_secs: Option<u64>,

        /// Prompt template file; overrides the config.
        #[arg(long)]
        prompt_file: Option<PathBuf>,
    },

    /// Rewind the output project to a job's checkpoint commit and resume
    /// after it.
    Replay {
        /// Target job: full id, bare ordinal ("3"), or padded ("003").
        target: String,

        /// Catalog root containing reports/ and assets/.
        catalog: PathBuf,

        /// Workspace root whose status store gets rewritten.
        #[arg(long, default_value = "workspace")]
        workspace: PathBuf,

        /// Output project root.
        #[arg(long, default_value = "project")]
        project: PathBuf,

        /// Stop after the rewind instead of continuing with the
        /// sequential executor.
        #[arg(long, default_value_t = false)]
        no_resume: bool,
    },

    /// Print the sequential executor's status store.
    Status {
        /// Workspace root holding the status store.
        #[arg(long, default_value = "workspace")]
        workspace: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_batch_subcommand() {
        let cli = Cli::parse_from([
            "taskpilot",
            "batch",
            "jobs",
            "--force",
            "--limit",
            "3",
            "--expect",
            "flow.svg",
            "--expect",
            "flow.pdf",
        ]);
        match cli.command {
            Command::Batch {
                root,
                limit,
                force,
                expected_artifacts,
                ..
            } => {
                assert_eq!(root, PathBuf::from("jobs"));
                assert_eq!(limit, 3);
                assert!(force);
                assert_eq!(expected_artifacts, vec!["flow.svg", "flow.pdf"]);
            }
            _ => panic!("expected Batch command"),
        }
    }

    #[test]
    fn cli_parses_run_with_defaults() {
        let cli = Cli::parse_from(["taskpilot", "run", "catalog"]);
        match cli.command {
            Command::Run {
                catalog,
                workspace,
                project,
                timeout_secs,
                ..
            } => {
                assert_eq!(catalog, PathBuf::from("catalog"));
                assert_eq!(workspace, PathBuf::from("workspace"));
                assert_eq!(project, PathBuf::from("project"));
                assert!(timeout_secs.is_none());
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn cli_parses_replay_with_ordinal_target() {
        let cli = Cli::parse_from(["taskpilot", "replay", "3", "catalog"]);
        match cli.command {
            Command::Replay {
                target, no_resume, ..
            } => {
                assert_eq!(target, "3");
                // Replay hands control back to the sequential executor
                // unless explicitly told not to.
                assert!(!no_resume);
            }
            _ => panic!("expected Replay command"),
        }
    }

    #[test]
    fn cli_parses_replay_no_resume_opt_out() {
        let cli = Cli::parse_from(["taskpilot", "replay", "002-bbb1111", "catalog", "--no-resume"]);
        match cli.command {
            Command::Replay { no_resume, .. } => assert!(no_resume),
            _ => panic!("expected Replay command"),
        }
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from([
            "taskpilot",
            "--api-key",
            "k-123",
            "--verbose",
            "status",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.api_key.as_deref(), Some("k-123"));
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
