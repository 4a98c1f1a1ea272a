use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Scheduler-assigned job identity, unique for the scheduler's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Queued,
    Starting,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Canceled,
    Aborted,
}

impl JobPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobPhase::Succeeded
                | JobPhase::Failed
                | JobPhase::TimedOut
                | JobPhase::Canceled
                | JobPhase::Aborted
        )
    }

    /// Whether `self -> next` is an edge of the job state machine.
    pub fn can_advance_to(self, next: JobPhase) -> bool {
        use JobPhase::*;
        matches!(
            (self, next),
            (Queued, Starting)
                | (Starting, Running)
                | (Starting, Aborted)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, TimedOut)
                | (Running, Canceled)
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            JobPhase::Queued => "queued",
            JobPhase::Starting => "starting",
            JobPhase::Running => "running",
            JobPhase::Succeeded => "succeeded",
            JobPhase::Failed => "failed",
            JobPhase::TimedOut => "timed-out",
            JobPhase::Canceled => "canceled",
            JobPhase::Aborted => "aborted",
        }
    }
}

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitInfo {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitInfo {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Ended by a signal or without an exit code.
    pub fn abnormal(&self) -> bool {
        self.code.is_none()
    }
}

impl From<std::process::ExitStatus> for ExitInfo {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;
        ExitInfo { code: status.code(), signal }
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(c), _) => write!(f, "exit code {}", c),
            (None, Some(s)) => write!(f, "killed by signal {}", s),
            (None, None) => write!(f, "abnormal termination"),
        }
    }
}

/// Terminal record handed to the host once a job leaves the scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub id: JobId,
    pub file: PathBuf,
    pub basename: String,
    pub engine_id: String,
    pub phase: JobPhase,
    pub phases: Vec<JobPhase>,
    pub exit: Option<ExitInfo>,
    pub elapsed: Option<Duration>,
    pub detail: Option<String>,
}
