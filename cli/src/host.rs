//! Console implementation of the scheduler's host interface.

use std::io::{self, BufRead, Write};
use std::sync::Mutex;

use ark_core::execution::host::{Host, ProgressUpdate};
use ark_core::execution::summary::BatchSummary;
use ark_core::types::job::{JobId, JobPhase, JobReport};
use tracing::debug;


/// Writes user-facing messages to stdout and reads yes/no answers from stdin.
pub struct ConsoleHost {
    assume_yes: bool,
    quiet_output: bool,
    failures: Mutex<usize>,
}

impl ConsoleHost {
    pub fn new(assume_yes: bool, quiet_output: bool) -> Self {
        ConsoleHost {
            assume_yes,
            quiet_output,
            failures: Mutex::new(0),
        }
    }

    /// Jobs that ended in anything other than success or cancellation.
    pub fn failures(&self) -> usize {
        self.failures.lock().map(|n| *n).unwrap_or(0)
    }
}

impl Host for ConsoleHost {
    fn log(&self, line: &str) {
        println!("{}", line);
    }

    fn progress(&self, update: ProgressUpdate) {
        match update {
            ProgressUpdate::Indeterminate => debug!("progress: busy"),
            ProgressUpdate::Range { total } => debug!(total, "progress range"),
            ProgressUpdate::Value(v) => debug!(value = v, "progress"),
        }
    }

    fn confirm(&self, title: &str, question: &str) -> bool {
        if self.assume_yes {
            println!("{}: {} [auto-yes]", title, question);
            return true;
        }
        print!("{}: {} [y/N] ", title, question);
        let _ = io::stdout().flush();
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(_) => parse_answer(&line),
            Err(_) => false,
        }
    }

    fn set_controls_enabled(&self, enabled: bool) {
        debug!(enabled, "controls");
    }

    fn show_error(&self, title: &str, text: &str) {
        eprintln!("== {} ==", title);
        eprintln!("{}", text);
    }

    fn job_stdout(&self, _job: JobId, line: &str) {
        if !self.quiet_output {
            println!("  | {}", line);
        }
    }

    fn job_stderr(&self, _job: JobId, line: &str) {
        if !self.quiet_output {
            eprintln!("  ! {}", line);
        }
    }

    fn job_finished(&self, report: &JobReport) {
        if matches!(report.phase, JobPhase::Failed | JobPhase::TimedOut | JobPhase::Aborted) {
            if let Ok(mut n) = self.failures.lock() {
                *n += 1;
            }
        }
    }

    fn batch_finished(&self, summary: &BatchSummary) {
        debug!(jobs = summary.jobs(), "batch finished");
    }
}


/// Only an explicit yes counts.
pub fn parse_answer(line: &str) -> bool {
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
