//! Job scheduling: the bounded FIFO queue and its event loop.
//!
//! The `Scheduler` owns every job from enqueue to its terminal report. It is
//! single-threaded: child supervision threads only send [`JobEvent`]s, and
//! all state changes happen inside `pump` on the caller's thread. Jobs move
//! `queued → starting → running → {succeeded | failed | timed-out |
//! canceled}`, or `starting → aborted` when no process could be started.
//!
//! A batch begins when the first job is popped from an idle scheduler and
//! ends when both the queue and the running set are empty; deferred
//! `on_success` hooks and the summary run at that point.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::events::{parse_progress, JobEvent};
use super::handle::{self, basename, ProcessHandle, SpawnSpec, TimerKind, READER_DRAIN_TIMEOUT};
use super::host::{isolate, Host, ProgressUpdate, SafeHost};
use super::output::OutputStream;
use super::remediation::RemediationLedger;
use super::sandbox::{build_env, clamp_text, inherited_env, redact_secrets, validate_args, DIALOG_TEXT_LIMIT};
use super::summary::{format_duration, BatchSummary, ElapsedLedger};
use crate::autoargs::AutoArgs;
use crate::data::settings::effective_timeout;
use crate::engine::registry::EngineRegistry;
use crate::engine::tools::{CommandProvisioner, InstallRequest, ToolGate};
use crate::engine::{default_python, BuildContext, BuildOptions, Engine};
use crate::error::EngineError;
use crate::infrastructure::runner::ProcessRunner;
use crate::process::{platform_tree, KillReport, Terminator};
use crate::types::config::Settings;
use crate::types::job::{ExitInfo, JobId, JobPhase, JobReport};

/// Longest single wait inside `run_until_idle`.
const IDLE_WAIT: Duration = Duration::from_millis(250);

// ---------------------------------------------------------------------------
// Internal records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct QueuedJob {
    id: JobId,
    file: PathBuf,
    engine_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Timeout,
    Cancel,
}

struct RunningJob {
    handle: ProcessHandle,
    engine: Arc<dyn Engine>,
    phases: Vec<JobPhase>,
    stop: Option<StopReason>,
}

struct Batch {
    started: Instant,
    /// Succeeded jobs in success order.
    deferred: Vec<(Arc<dyn Engine>, PathBuf)>,
    elapsed: ElapsedLedger,
    summary: BatchSummary,
}

impl Batch {
    fn new() -> Self {
        Batch {
            started: Instant::now(),
            deferred: Vec::new(),
            elapsed: ElapsedLedger::new(),
            summary: BatchSummary::default(),
        }
    }
}

/// Push `next` if it is a legal successor of the last phase.
fn advance(phases: &mut Vec<JobPhase>, next: JobPhase) {
    match phases.last() {
        Some(last) if last.can_advance_to(next) => phases.push(next),
        last => warn!(from = ?last, to = ?next, "illegal job transition ignored"),
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub struct Scheduler {
    workspace: PathBuf,
    python: PathBuf,
    settings: Settings,
    options: BuildOptions,
    candidates: Vec<PathBuf>,
    engine_id: Option<String>,
    registry: Arc<EngineRegistry>,
    host: SafeHost,
    terminator: Terminator,
    tools: ToolGate,
    auto_args: AutoArgs,
    grace_period: Duration,
    cancel_kill_timeout: Duration,
    env_whitelist: Option<Vec<String>>,
    queue: VecDeque<QueuedJob>,
    running: BTreeMap<JobId, RunningJob>,
    events_tx: Sender<JobEvent>,
    events_rx: Receiver<JobEvent>,
    next_id: u64,
    batch: Option<Batch>,
    history: Vec<JobReport>,
    remediation: RemediationLedger,
    peak_running: usize,
}

impl Scheduler {
    /// A scheduler for `workspace` using the platform process table and
    /// pip-based tool provisioning.
    pub fn new(workspace: &Path, settings: Settings, registry: Arc<EngineRegistry>, host: Arc<dyn Host>) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        let terminator = Terminator::new(platform_tree()).with_poll_interval(settings.poll_interval());
        let tools = ToolGate::new(Arc::new(CommandProvisioner::new(Arc::new(ProcessRunner))));
        Scheduler {
            workspace: workspace.to_path_buf(),
            python: default_python(workspace),
            options: BuildOptions::default(),
            candidates: Vec::new(),
            engine_id: None,
            registry,
            host: SafeHost::new(host),
            terminator,
            tools,
            auto_args: AutoArgs::from_settings(&settings),
            grace_period: settings.grace_period(),
            cancel_kill_timeout: settings.cancel_kill_timeout(),
            env_whitelist: None,
            settings,
            queue: VecDeque::new(),
            running: BTreeMap::new(),
            events_tx,
            events_rx,
            next_id: 1,
            batch: None,
            history: Vec::new(),
            remediation: RemediationLedger::new(),
            peak_running: 0,
        }
    }

    pub fn with_terminator(mut self, terminator: Terminator) -> Self {
        self.terminator = terminator;
        self
    }

    pub fn with_tools(mut self, tools: ToolGate) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_python(mut self, python: PathBuf) -> Self {
        self.python = python;
        self
    }

    /// Only these variables are inherited by children.
    pub fn with_env_whitelist(mut self, keys: Vec<String>) -> Self {
        self.env_whitelist = Some(keys);
        self
    }

    pub fn set_options(&mut self, options: BuildOptions) {
        self.options = options;
    }

    /// All project files, used by the import scan of auto-arguments.
    pub fn set_candidates(&mut self, files: Vec<PathBuf>) {
        self.candidates = files;
    }

    /// Engine used by `enqueue` and `start_compilation_process`. Returns
    /// false for an unregistered id.
    pub fn set_engine(&mut self, engine_id: &str) -> bool {
        if !self.registry.contains(engine_id) {
            return false;
        }
        self.engine_id = Some(engine_id.to_string());
        true
    }

    pub fn set_grace_period(&mut self, grace: Duration) {
        self.grace_period = grace;
    }

    pub fn set_cancel_kill_timeout(&mut self, timeout: Duration) {
        self.cancel_kill_timeout = timeout;
    }

    pub fn auto_args(&self) -> &AutoArgs {
        &self.auto_args
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    /// Most jobs ever running at once.
    pub fn peak_running(&self) -> usize {
        self.peak_running
    }

    pub fn is_idle(&self) -> bool {
        self.running.is_empty() && self.queue.is_empty()
    }

    /// Running jobs and their root process ids.
    pub fn running_pids(&self) -> Vec<(JobId, u32)> {
        self.running.iter().map(|(id, rj)| (*id, rj.handle.pid())).collect()
    }

    /// Terminal reports, in completion order.
    pub fn history(&self) -> &[JobReport] {
        &self.history
    }

    // -- queueing --

    /// Queue `file` for the current engine.
    pub fn enqueue(&mut self, file: impl Into<PathBuf>) -> JobId {
        let engine_id = self.engine_id.clone().unwrap_or_default();
        self.enqueue_with_engine(file, &engine_id)
    }

    pub fn enqueue_with_engine(&mut self, file: impl Into<PathBuf>, engine_id: &str) -> JobId {
        let id = JobId(self.next_id);
        self.next_id += 1;
        let file = file.into();
        debug!(job = %id, file = %file.display(), engine = engine_id, "queued");
        self.queue.push_back(QueuedJob {
            id,
            file,
            engine_id: engine_id.to_string(),
        });
        id
    }

    /// Queue `file` and start whatever the bound allows. Files queued
    /// earlier still start first.
    pub fn start_compilation_process(&mut self, file: &Path) -> JobId {
        let id = self.enqueue(file);
        self.try_start_processes();
        id
    }

    /// Start queued jobs while slots are free. Runs the end-of-batch
    /// bookkeeping once nothing is queued or running.
    pub fn try_start_processes(&mut self) {
        let bound = self.settings.bound();
        while self.running.len() < bound {
            let Some(job) = self.queue.pop_front() else {
                break;
            };
            self.ensure_batch();
            if !self.host.should_compile(&job.file) {
                self.host.log(&format!("Skipping {}", basename(&job.file)));
                if let Some(batch) = self.batch.as_mut() {
                    batch.summary.skipped += 1;
                }
                continue;
            }
            self.launch(job);
        }
        if self.is_idle() && self.batch.is_some() {
            self.finish_batch();
        }
    }

    fn ensure_batch(&mut self) {
        if self.batch.is_none() {
            self.batch = Some(Batch::new());
            self.auto_args.begin_batch();
            self.host.set_controls_enabled(false);
            info!(queued = self.queue.len() + 1, "batch started");
        }
    }

    /// Run `f` with a build context borrowing this scheduler.
    fn with_ctx<R>(&self, f: impl FnOnce(&BuildContext<'_>) -> R) -> R {
        let host = self.host.clone();
        let log = move |line: &str| host.log(line);
        let ctx = BuildContext {
            workspace: &self.workspace,
            python: &self.python,
            options: &self.options,
            files: &self.candidates,
            auto_args: &self.auto_args,
            tools: &self.tools,
            log: &log,
        };
        f(&ctx)
    }

    /// Preflight, resolve the command and spawn. Runs on the loop thread:
    /// the tool probe blocks only until an engine first reports ready, and
    /// the dependency scan runs once per batch (files over 1.5 MB skipped).
    fn launch(&mut self, job: QueuedJob) {
        let mut phases = vec![JobPhase::Queued];
        advance(&mut phases, JobPhase::Starting);

        let Some(engine) = self.registry.instance(&job.engine_id) else {
            let reason = EngineError::UnknownEngine(job.engine_id.clone()).to_string();
            self.abort(job, phases, reason);
            return;
        };
        let name = basename(&job.file);
        let prefix = engine.log_prefix(&name);

        let prepared = self.with_ctx(|ctx| -> Result<SpawnSpec, String> {
            let ready = isolate("preflight", || engine.preflight(ctx, &job.file)).unwrap_or(false);
            if !ready {
                let e = EngineError::Preflight {
                    engine: engine.id().to_string(),
                    reason: format!("{} is not ready to build", name),
                };
                return Err(format!("[{}] {}", prefix, e));
            }
            let (program, args) = isolate("program_and_args", || engine.program_and_args(ctx, &job.file))
                .flatten()
                .ok_or_else(|| format!("[{}] no command for {}", prefix, name))?;
            validate_args(&program, &args).map_err(|e| format!("[{}] {}", prefix, e))?;
            let sentinel = engine.cancel_sentinel(&self.workspace, &job.file);
            let overlay = isolate("environment", || engine.environment(ctx, &job.file)).flatten();
            let env = build_env(
                inherited_env(),
                self.env_whitelist.as_deref(),
                overlay.as_ref(),
                &self.workspace,
                &sentinel,
            );
            Ok(SpawnSpec {
                program,
                args,
                env,
                cwd: self.workspace.clone(),
                sentinel,
            })
        });
        let spec = match prepared {
            Ok(spec) => spec,
            Err(reason) => {
                self.abort(job, phases, reason);
                return;
            }
        };

        let mut handle = match handle::spawn(job.id, &job.file, engine.id(), &spec, self.events_tx.clone()) {
            Ok(h) => h,
            Err(e) => {
                self.abort(job, phases, format!("[{}] {}", prefix, e));
                return;
            }
        };
        let timeout = effective_timeout(&self.settings, engine.id(), engine.timeout_override());
        handle.arm_watchdog(timeout);
        advance(&mut phases, JobPhase::Running);

        self.host.log(&format!("[{}] Building {} (pid {})", prefix, name, handle.pid()));
        self.host.progress(ProgressUpdate::Indeterminate);
        info!(job = %job.id, pid = handle.pid(), engine = engine.id(), file = %name, "job running");

        self.running.insert(
            job.id,
            RunningJob {
                handle,
                engine,
                phases,
                stop: None,
            },
        );
        self.peak_running = self.peak_running.max(self.running.len());
    }

    fn abort(&mut self, job: QueuedJob, mut phases: Vec<JobPhase>, reason: String) {
        advance(&mut phases, JobPhase::Aborted);
        self.host.log(&reason);
        warn!(job = %job.id, reason = %reason, "job aborted");
        let report = JobReport {
            id: job.id,
            basename: basename(&job.file),
            file: job.file,
            engine_id: job.engine_id,
            phase: JobPhase::Aborted,
            phases,
            exit: None,
            elapsed: None,
            detail: Some(reason),
        };
        if let Some(batch) = self.batch.as_mut() {
            batch.summary.count(JobPhase::Aborted);
        }
        self.host.job_finished(&report);
        self.history.push(report);
    }

    // -- event loop --

    /// Handle pending events, waiting at most `max_wait` (less when a timer
    /// is due sooner), then fire due timers. Returns the number of events
    /// handled.
    pub fn pump(&mut self, max_wait: Duration) -> usize {
        let wait = match self.next_deadline() {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()).min(max_wait),
            None => max_wait,
        };
        let mut handled = 0;
        if let Ok(event) = self.events_rx.recv_timeout(wait) {
            self.handle_event(event);
            handled += 1;
        }
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        self.fire_due_timers();
        handled
    }

    /// Drive the loop until nothing is queued or running.
    pub fn run_until_idle(&mut self) {
        self.try_start_processes();
        while !self.is_idle() {
            self.pump(IDLE_WAIT);
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.running
            .values()
            .filter_map(|rj| rj.handle.timer().map(|t| t.deadline))
            .min()
    }

    fn handle_event(&mut self, event: JobEvent) {
        match event {
            JobEvent::Output { job, stream, line } => self.on_output(job, stream, &line),
            JobEvent::Exited { job, exit } => {
                self.finalize(job, Some(exit), None);
                self.try_start_processes();
            }
            JobEvent::WaitFailed { job, error } => {
                self.finalize(job, None, Some(error));
                self.try_start_processes();
            }
        }
    }

    fn on_output(&mut self, job: JobId, stream: OutputStream, line: &str) {
        // Late lines of a disposed job are dropped.
        let Some(rj) = self.running.get_mut(&job) else {
            return;
        };
        let prefix = rj.engine.log_prefix(&rj.handle.basename);
        match stream {
            OutputStream::Stdout => {
                if let Some(progress) = parse_progress(line) {
                    if let Some(total) = progress.total {
                        self.host.progress(ProgressUpdate::Range { total });
                    }
                    if let Some(current) = progress.current {
                        self.host.progress(ProgressUpdate::Value(current));
                    }
                    if let Some(stage) = progress.stage {
                        self.host.log(&format!("[{}] {}", prefix, stage));
                    }
                    return;
                }
                self.host.job_stdout(job, line);
            }
            OutputStream::Stderr => {
                rj.handle.record_stderr(line);
                self.host.job_stderr(job, line);
            }
        }
        self.host.log(&format!("[{}] {}", prefix, redact_secrets(line)));
    }

    fn fire_due_timers(&mut self) {
        let now = Instant::now();
        let due: Vec<(JobId, TimerKind)> = self
            .running
            .iter_mut()
            .filter_map(|(id, rj)| rj.handle.take_due_timer(now).map(|kind| (*id, kind)))
            .collect();
        for (id, kind) in due {
            match kind {
                TimerKind::Watchdog => self.on_watchdog(id),
                TimerKind::Grace => self.on_grace(id),
            }
        }
    }

    fn on_watchdog(&mut self, id: JobId) {
        let Some(rj) = self.running.get_mut(&id) else {
            return;
        };
        // Reaped but still draining output: the pending exit decides.
        if rj.handle.has_exited() {
            debug!(job = %id, "watchdog fired after exit; ignoring");
            return;
        }
        if rj.stop.is_none() {
            rj.stop = Some(StopReason::Timeout);
        }
        let prefix = rj.engine.log_prefix(&rj.handle.basename);
        self.host.log(&format!(
            "[{}] {} timed out after {}; stopping",
            prefix,
            rj.handle.basename,
            format_duration(rj.handle.elapsed())
        ));
        let signalled = self.terminator.request_stop(rj.handle.pid());
        debug!(job = %id, signalled, "polite stop requested");
        rj.handle.arm_grace(self.grace_period);
    }

    fn on_grace(&mut self, id: JobId) {
        let Some(rj) = self.running.get(&id) else {
            return;
        };
        let pid = rj.handle.pid();
        if rj.handle.has_exited() || !self.terminator.is_alive(pid) {
            return;
        }
        let prefix = rj.engine.log_prefix(&rj.handle.basename);
        self.host.log(&format!("[{}] still running after grace period; killing process tree", prefix));
        let report = self.terminator.kill_process_tree(pid, true, self.cancel_kill_timeout);
        if report.is_clean() {
            return;
        }
        self.host.log(&format!("[{}] could not stop pids {:?}", prefix, report.survivors));
        // No exit will arrive for a root that survived; free the slot now.
        if report.survivors.contains(&pid) {
            warn!(job = %id, pid, "root process survived tree kill; releasing job");
            self.finalize(id, None, Some(format!("process {} could not be stopped", pid)));
            self.try_start_processes();
        }
    }

    /// Move a running job to its terminal phase and dispose its handle.
    fn finalize(&mut self, id: JobId, exit: Option<ExitInfo>, wait_error: Option<String>) {
        let Some(mut rj) = self.running.remove(&id) else {
            return;
        };
        rj.handle.stop_timer();
        let elapsed = rj.handle.elapsed();
        let phase = match (rj.stop, exit) {
            (Some(StopReason::Cancel), _) => JobPhase::Canceled,
            (Some(StopReason::Timeout), _) => JobPhase::TimedOut,
            (None, Some(e)) if e.success() => JobPhase::Succeeded,
            _ => JobPhase::Failed,
        };
        advance(&mut rj.phases, phase);

        // Snapshot before the handle goes away.
        let stderr = rj.handle.stderr_snapshot();
        rj.handle.dispose();

        let name = rj.handle.basename.clone();
        let prefix = rj.engine.log_prefix(&name);
        let status = exit
            .map(|e| e.to_string())
            .or(wait_error)
            .unwrap_or_else(|| "force-stopped".to_string());
        let mut detail = None;

        match phase {
            JobPhase::Succeeded => {
                self.host.log(&format!("[{}] {} built in {}", prefix, name, format_duration(elapsed)));
                if let Some(batch) = self.batch.as_mut() {
                    batch.deferred.push((rj.engine.clone(), rj.handle.file.clone()));
                }
            }
            JobPhase::Failed => {
                self.host.log(&format!("[{}] {} failed ({})", prefix, name, status));
                let shown = redact_secrets(&stderr);
                if self.settings.show_error_dialogs {
                    let text = if shown.is_empty() { status.clone() } else { shown.clone() };
                    self.host
                        .show_error(&format!("Build failed: {}", name), &clamp_text(&text, DIALOG_TEXT_LIMIT));
                }
                detail = Some(if shown.is_empty() { status.clone() } else { format!("{}\n{}", status, shown) });
                self.remediate(&stderr);
            }
            JobPhase::TimedOut => {
                self.host.log(&format!("[{}] {} timed out ({})", prefix, name, status));
                detail = Some(format!("timed out after {}", format_duration(elapsed)));
            }
            JobPhase::Canceled => {
                self.host.log(&format!("[{}] {} canceled", prefix, name));
            }
            _ => {}
        }

        if let Some(batch) = self.batch.as_mut() {
            if matches!(phase, JobPhase::Succeeded | JobPhase::Failed | JobPhase::TimedOut) {
                batch.elapsed.record(&name, elapsed);
            }
            batch.summary.count(phase);
        }
        info!(job = %id, phase = phase.label(), elapsed_ms = elapsed.as_millis() as u64, "job finished");

        let report = JobReport {
            id,
            file: rj.handle.file.clone(),
            basename: name,
            engine_id: rj.handle.engine_id.clone(),
            phase,
            phases: rj.phases,
            exit,
            elapsed: Some(elapsed),
            detail,
        };
        self.host.job_finished(&report);
        self.history.push(report);
    }

    fn remediate(&mut self, stderr: &str) {
        if !self.settings.auto_install_missing {
            return;
        }
        let modules = self
            .remediation
            .plan(stderr, self.settings.max_remediation_per_failure);
        if modules.is_empty() {
            return;
        }
        let question = format!(
            "The build reported missing modules: {}. Install them into {}?",
            modules.join(", "),
            self.python.display()
        );
        if !self.host.confirm("Missing modules", &question) {
            self.host.log("Skipped installing missing modules.");
            return;
        }
        match self.tools.provisioner().request_install(&self.python, &modules, &[]) {
            InstallRequest::Started => self
                .host
                .log(&format!("Installing {}; rebuild once it finishes.", modules.join(", "))),
            InstallRequest::Unavailable(reason) => self.host.log(&reason),
        }
    }

    fn finish_batch(&mut self) {
        let Some(batch) = self.batch.take() else {
            return;
        };
        for (engine, file) in &batch.deferred {
            let outcome = self.with_ctx(|ctx| isolate("on_success", || engine.on_success(ctx, file)));
            match outcome {
                Some(Ok(())) => {}
                Some(Err(e)) => self.host.log(&e.to_string()),
                None => self
                    .host
                    .log(&format!("success hook of {} panicked for {}", engine.id(), basename(file))),
            }
        }

        let mut summary = batch.summary;
        summary.record_timings(&batch.elapsed);
        summary.wall = batch.started.elapsed();
        if summary.jobs() + summary.skipped + summary.dropped > 0 {
            self.host.log("Build summary:");
            for line in summary.render() {
                self.host.log(&line);
            }
        }
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            timed_out = summary.timed_out,
            canceled = summary.canceled,
            "batch finished"
        );
        self.host.batch_finished(&summary);
        self.host.set_controls_enabled(true);
    }

    // -- cancellation --

    /// Drop everything queued, ask running children to stop through their
    /// sentinels and force-kill their trees. Returns the number of running
    /// jobs canceled; a second call in a row does nothing and returns 0.
    pub fn cancel_all_compilations(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        if dropped > 0 {
            self.host.log(&format!("Dropped {} queued build(s)", dropped));
            if let Some(batch) = self.batch.as_mut() {
                batch.summary.dropped += dropped;
            }
        }

        let ids: Vec<JobId> = self
            .running
            .iter()
            .filter(|(_, rj)| rj.stop != Some(StopReason::Cancel))
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            let Some(rj) = self.running.get_mut(id) else {
                continue;
            };
            rj.stop = Some(StopReason::Cancel);
            rj.handle.stop_timer();
            if let Err(e) = rj.handle.write_sentinel() {
                warn!(job = %id, error = %e, "cannot write cancel sentinel");
            }
            if rj.handle.has_exited() {
                continue;
            }
            let report: KillReport = self
                .terminator
                .kill_process_tree(rj.handle.pid(), true, self.cancel_kill_timeout);
            if !report.is_clean() {
                self.host
                    .log(&format!("Could not stop pids {:?} of {}", report.survivors, rj.handle.basename));
            }
        }

        // Collect the exits; anything not reaped in time is force-finalized.
        let deadline = Instant::now() + self.cancel_kill_timeout + READER_DRAIN_TIMEOUT * 2;
        while ids.iter().any(|id| self.running.contains_key(id)) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match self.events_rx.recv_timeout(deadline - now) {
                Ok(event) => self.handle_event(event),
                Err(_) => break,
            }
        }
        for id in &ids {
            if self.running.contains_key(id) {
                warn!(job = %id, "no exit observed after cancel; disposing handle");
                self.finalize(*id, None, None);
            }
        }

        self.try_start_processes();
        ids.len()
    }

    /// Cancel everything, then sweep every remaining descendant of this
    /// process.
    pub fn shutdown(&mut self) -> KillReport {
        self.cancel_all_compilations();
        let report = self.terminator.kill_all_descendants(self.cancel_kill_timeout);
        if !report.targeted.is_empty() {
            info!(killed = report.terminated.len(), survivors = report.survivors.len(), "shutdown sweep");
        }
        report
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
