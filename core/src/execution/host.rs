//! The scheduler's view of its front-end.
//!
//! A [`Host`] is the log sink, progress display and prompt provider the
//! scheduler drives. Every call goes through [`SafeHost`], so a panicking
//! callback is logged and skipped instead of unwinding through the loop.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use tracing::error;

use super::summary::BatchSummary;
use crate::types::job::{JobId, JobReport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressUpdate {
    /// Busy with no known extent.
    Indeterminate,
    /// Switch to a determinate display out of `total`.
    Range { total: u64 },
    Value(u64),
}

pub trait Host {
    /// Append one line to the user-facing log. Order is preserved.
    fn log(&self, line: &str);

    fn progress(&self, _update: ProgressUpdate) {}

    /// Yes/no question; only remediation asks.
    fn confirm(&self, _title: &str, _question: &str) -> bool {
        false
    }

    /// Disabled at batch start, enabled when the batch goes idle.
    fn set_controls_enabled(&self, _enabled: bool) {}

    /// Failed-build notification.
    fn show_error(&self, _title: &str, _text: &str) {}

    /// Asked when a file is popped from the queue.
    fn should_compile(&self, _file: &Path) -> bool {
        true
    }

    fn job_stdout(&self, _job: JobId, _line: &str) {}

    fn job_stderr(&self, _job: JobId, _line: &str) {}

    fn job_finished(&self, _report: &JobReport) {}

    fn batch_finished(&self, _summary: &BatchSummary) {}
}

/// Run `f`, turning a panic into `None`.
pub(crate) fn isolate<R>(what: &str, f: impl FnOnce() -> R) -> Option<R> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(r) => Some(r),
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic".into());
            error!(callback = what, panic = %msg, "callback panicked");
            None
        }
    }
}

/// Panic-isolating wrapper around a [`Host`].
#[derive(Clone)]
pub struct SafeHost {
    inner: Arc<dyn Host>,
}

impl SafeHost {
    pub fn new(inner: Arc<dyn Host>) -> Self {
        SafeHost { inner }
    }

    pub fn log(&self, line: &str) {
        isolate("log", || self.inner.log(line));
    }

    pub fn progress(&self, update: ProgressUpdate) {
        isolate("progress", || self.inner.progress(update));
    }

    pub fn confirm(&self, title: &str, question: &str) -> bool {
        isolate("confirm", || self.inner.confirm(title, question)).unwrap_or(false)
    }

    pub fn set_controls_enabled(&self, enabled: bool) {
        isolate("set_controls_enabled", || self.inner.set_controls_enabled(enabled));
    }

    pub fn show_error(&self, title: &str, text: &str) {
        isolate("show_error", || self.inner.show_error(title, text));
    }

    /// A panicking filter counts as "compile".
    pub fn should_compile(&self, file: &Path) -> bool {
        isolate("should_compile", || self.inner.should_compile(file)).unwrap_or(true)
    }

    pub fn job_stdout(&self, job: JobId, line: &str) {
        isolate("job_stdout", || self.inner.job_stdout(job, line));
    }

    pub fn job_stderr(&self, job: JobId, line: &str) {
        isolate("job_stderr", || self.inner.job_stderr(job, line));
    }

    pub fn job_finished(&self, report: &JobReport) {
        isolate("job_finished", || self.inner.job_finished(report));
    }

    pub fn batch_finished(&self, summary: &BatchSummary) {
        isolate("batch_finished", || self.inner.batch_finished(summary));
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording host for scheduler tests.

    use std::collections::HashSet;
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct MockHost {
        pub logs: Mutex<Vec<String>>,
        pub progress: Mutex<Vec<ProgressUpdate>>,
        pub controls: Mutex<Vec<bool>>,
        pub errors: Mutex<Vec<(String, String)>>,
        pub finished: Mutex<Vec<JobReport>>,
        pub batches: Mutex<Vec<BatchSummary>>,
        pub stdout: Mutex<Vec<(JobId, String)>>,
        pub questions: Mutex<Vec<String>>,
        /// Basenames declined by `should_compile`.
        pub skip: HashSet<String>,
        pub answer: bool,
        pub panic_on_log: bool,
    }

    impl MockHost {
        pub fn logged(&self, needle: &str) -> bool {
            self.logs.lock().unwrap().iter().any(|l| l.contains(needle))
        }

        pub fn reports(&self) -> Vec<JobReport> {
            self.finished.lock().unwrap().clone()
        }
    }

    impl Host for MockHost {
        fn log(&self, line: &str) {
            if self.panic_on_log {
                panic!("log sink exploded");
            }
            self.logs.lock().unwrap().push(line.to_string());
        }

        fn progress(&self, update: ProgressUpdate) {
            self.progress.lock().unwrap().push(update);
        }

        fn confirm(&self, _title: &str, question: &str) -> bool {
            self.questions.lock().unwrap().push(question.to_string());
            self.answer
        }

        fn set_controls_enabled(&self, enabled: bool) {
            self.controls.lock().unwrap().push(enabled);
        }

        fn show_error(&self, title: &str, text: &str) {
            self.errors.lock().unwrap().push((title.to_string(), text.to_string()));
        }

        fn should_compile(&self, file: &Path) -> bool {
            let name = file.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            !self.skip.contains(&name)
        }

        fn job_stdout(&self, job: JobId, line: &str) {
            self.stdout.lock().unwrap().push((job, line.to_string()));
        }

        fn job_finished(&self, report: &JobReport) {
            self.finished.lock().unwrap().push(report.clone());
        }

        fn batch_finished(&self, summary: &BatchSummary) {
            self.batches.lock().unwrap().push(summary.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MockHost;
    use super::*;

    #[test]
    fn panicking_callback_is_contained() {
        let host = Arc::new(MockHost {
            panic_on_log: true,
            ..Default::default()
        });
        let safe = SafeHost::new(host.clone());
        safe.log("boom");
        safe.set_controls_enabled(true);
        assert_eq!(*host.controls.lock().unwrap(), vec![true]);
    }

    #[test]
    fn isolate_returns_value() {
        assert_eq!(isolate("ok", || 7), Some(7));
        assert_eq!(isolate("bad", || -> i32 { panic!("nope") }), None);
    }
}
