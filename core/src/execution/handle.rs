//! Spawning and owning one job's child process.
//!
//! [`spawn`] starts the child with piped output and hands back a
//! [`ProcessHandle`]. Two reader threads forward lines as
//! [`JobEvent::Output`]; a waiter thread reaps the child, gives the readers
//! a bounded moment to drain, then sends [`JobEvent::Exited`]. The handle
//! carries at most one timer and removes the cancellation sentinel exactly
//! once, on [`ProcessHandle::dispose`] or drop.

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::events::JobEvent;
use super::output::{OutputBuffer, OutputStream};
use crate::error::SpawnError;
use crate::types::job::{ExitInfo, JobId};

/// How long the waiter waits for each output reader after the child exits.
/// Grandchildren that inherited the pipes can keep them open indefinitely.
pub const READER_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);
/// Lines of stderr kept for failure reports.
pub const STDERR_TAIL_LINES: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Fires when the job has run too long.
    Watchdog,
    /// Fires when a polite stop went unanswered.
    Grace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    pub kind: TimerKind,
    pub deadline: Instant,
}

/// What to run for one job.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Complete environment; nothing else is inherited.
    pub env: BTreeMap<String, String>,
    pub cwd: PathBuf,
    pub sentinel: PathBuf,
}

#[derive(Debug)]
pub struct ProcessHandle {
    pub job: JobId,
    pub file: PathBuf,
    pub basename: String,
    pub engine_id: String,
    pub started: Instant,
    pub sentinel: PathBuf,
    pid: u32,
    timer: Option<Timer>,
    reaped: Arc<AtomicBool>,
    stderr: OutputBuffer,
    disposed: bool,
}

/// Start `spec` for `job`. A stale sentinel from an earlier run is removed
/// first so the child does not stop immediately.
pub fn spawn(
    job: JobId,
    file: &Path,
    engine_id: &str,
    spec: &SpawnSpec,
    events: Sender<JobEvent>,
) -> Result<ProcessHandle, SpawnError> {
    clear_sentinel(&spec.sentinel).map_err(|source| SpawnError::Sentinel {
        path: spec.sentinel.clone(),
        source,
    })?;

    let mut child = Command::new(&spec.program)
        .args(&spec.args)
        .current_dir(&spec.cwd)
        .env_clear()
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| SpawnError::Io {
            program: spec.program.clone(),
            source,
        })?;

    let pid = child.id();
    let stdout = child.stdout.take().ok_or(SpawnError::MissingPipe("stdout"));
    let stderr = child.stderr.take().ok_or(SpawnError::MissingPipe("stderr"));
    let (stdout, stderr) = match (stdout, stderr) {
        (Ok(o), Ok(e)) => (o, e),
        (Err(e), _) | (_, Err(e)) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(e);
        }
    };

    let (done_tx, done_rx) = mpsc::channel::<()>();
    forward_lines(stdout, job, OutputStream::Stdout, events.clone(), done_tx.clone());
    forward_lines(stderr, job, OutputStream::Stderr, events.clone(), done_tx);

    let reaped = Arc::new(AtomicBool::new(false));
    let reaped_flag = reaped.clone();
    thread::spawn(move || {
        let status = child.wait();
        reaped_flag.store(true, Ordering::SeqCst);
        for _ in 0..2 {
            if done_rx.recv_timeout(READER_DRAIN_TIMEOUT).is_err() {
                debug!(%job, "output reader still open after exit");
                break;
            }
        }
        let event = match status {
            Ok(status) => JobEvent::Exited {
                job,
                exit: ExitInfo::from(status),
            },
            Err(e) => JobEvent::WaitFailed {
                job,
                error: e.to_string(),
            },
        };
        let _ = events.send(event);
    });

    debug!(%job, pid, program = %spec.program, "spawned");
    Ok(ProcessHandle {
        job,
        file: file.to_path_buf(),
        basename: basename(file),
        engine_id: engine_id.to_string(),
        started: Instant::now(),
        sentinel: spec.sentinel.clone(),
        pid,
        timer: None,
        reaped,
        stderr: OutputBuffer::new(STDERR_TAIL_LINES),
        disposed: false,
    })
}

fn forward_lines<R: Read + Send + 'static>(
    pipe: R,
    job: JobId,
    stream: OutputStream,
    events: Sender<JobEvent>,
    done: Sender<()>,
) {
    thread::spawn(move || {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\n', '\r']).to_string();
                    if events.send(JobEvent::Output { job, stream, line }).is_err() {
                        break;
                    }
                }
            }
        }
        let _ = done.send(());
    });
}

pub fn basename(file: &Path) -> String {
    file.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file.to_string_lossy().to_string())
}

fn clear_sentinel(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

impl ProcessHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// True once the child has been reaped. Signals must not be sent after
    /// this, the pid may already belong to someone else.
    pub fn has_exited(&self) -> bool {
        self.reaped.load(Ordering::SeqCst)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Arm the watchdog, replacing any timer.
    pub fn arm_watchdog(&mut self, after: Duration) {
        self.timer = Some(Timer {
            kind: TimerKind::Watchdog,
            deadline: Instant::now() + after,
        });
    }

    /// Arm the grace timer, replacing the watchdog.
    pub fn arm_grace(&mut self, after: Duration) {
        self.timer = Some(Timer {
            kind: TimerKind::Grace,
            deadline: Instant::now() + after,
        });
    }

    pub fn stop_timer(&mut self) {
        self.timer = None;
    }

    pub fn timer(&self) -> Option<Timer> {
        self.timer
    }

    /// Take the timer if its deadline has passed.
    pub fn take_due_timer(&mut self, now: Instant) -> Option<TimerKind> {
        match self.timer {
            Some(t) if t.deadline <= now => {
                self.timer = None;
                Some(t.kind)
            }
            _ => None,
        }
    }

    pub fn record_stderr(&mut self, line: &str) {
        self.stderr.push_line(line);
    }

    /// Captured stderr tail.
    pub fn stderr_snapshot(&self) -> String {
        self.stderr.text()
    }

    /// Ask a cooperating child to stop.
    pub fn write_sentinel(&self) -> std::io::Result<()> {
        if let Some(dir) = self.sentinel.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&self.sentinel, b"cancel\n")
    }

    /// Stop the timer and remove the sentinel. Returns false when the handle
    /// was already disposed.
    pub fn dispose(&mut self) -> bool {
        if self.disposed {
            return false;
        }
        self.disposed = true;
        self.timer = None;
        if let Err(e) = clear_sentinel(&self.sentinel) {
            warn!(job = %self.job, path = %self.sentinel.display(), error = %e, "sentinel not removed");
        }
        true
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}
