//! Terminal output: the machine-readable progress channel and styled human
//! lines.
//!
//! External observers consume single-line `::progress::agent …` signals for
//! total count, chosen concurrency, and per-job completion, so they never
//! have to poll the filesystem. Human-readable lines use `console` styling;
//! the sequential executor gets an `indicatif` spinner per job.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::status::StatusRecord;

/// Prefix of every machine-readable progress line.
const CHANNEL: &str = "::progress::agent";

/// Emits batch progress for Mode A.
pub struct Reporter {
    green: Style,
    red: Style,
    yellow: Style,
}

impl Reporter {
    pub fn new() -> Self {
        Self {
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    pub fn total(&self, count: usize) {
        println!("{CHANNEL} total {count}");
    }

    pub fn parallel(&self, workers: usize) {
        println!("{CHANNEL} parallel {workers}");
    }

    pub fn tick(&self) {
        println!("{CHANNEL} tick");
    }

    pub fn start(&self, name: &str) {
        println!("[agent] start {name}");
    }

    pub fn done(&self, name: &str, code: i32) {
        if code == 0 {
            println!("[agent] done {name} exit=0");
        } else {
            println!(
                "[agent] done {name} exit={}",
                self.red.apply_to(code.to_string())
            );
        }
    }

    pub fn skipped(&self, names: &[String]) {
        if !names.is_empty() {
            println!(
                "[agent] {} {}",
                self.yellow.apply_to("skipped (already successful):"),
                names.join(", ")
            );
        }
    }

    pub fn all_done(&self) {
        println!(
            "[agent] {}",
            self.green.apply_to("nothing to run, all jobs already complete")
        );
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Spinner shown while the sequential executor runs one job.
pub struct JobSpinner {
    pb: ProgressBar,
    green: Style,
    red: Style,
}

impl JobSpinner {
    pub fn start(job_id: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .expect("invalid template"),
        );
        pb.set_message(format!("running {job_id}"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
        }
    }

    pub fn finish(&self, job_id: &str, code: i32) {
        self.pb.finish_and_clear();
        if code == 0 {
            println!("  {} {job_id} completed", self.green.apply_to("✓"));
        } else {
            println!("  {} {job_id} failed (exit {code})", self.red.apply_to("✗"));
        }
    }
}

/// Print the status store for the `status` subcommand.
pub fn print_summary(record: &StatusRecord) {
    let green = Style::new().green().bold();
    let red = Style::new().red().bold();
    let yellow = Style::new().yellow();

    println!("{}", green.apply_to(format!("completed: {}", record.completed.len())));
    for id in record.completed.iter().rev().take(5) {
        println!("  - {id}");
    }
    println!("{}", red.apply_to(format!("failed: {}", record.failed.len())));
    for (id, code) in &record.failed {
        let attempts = record.attempts.get(id).copied().unwrap_or(0);
        println!("  - {id} (last code {code}, {attempts} attempts)");
    }
    match &record.current {
        Some(id) => println!("{}", yellow.apply_to(format!("in flight: {id}"))),
        None => println!("in flight: none"),
    }
    if let Some(ts) = &record.last_execution {
        println!("last execution: {ts}");
    }
}
