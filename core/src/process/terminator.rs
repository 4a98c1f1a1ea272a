//! Staged termination of single processes and whole trees.
//!
//! Every operation here is idempotent against dead PIDs (they count as
//! success) and never raises OS errors: permission problems are logged and
//! reported as survivors. The only blocking is bounded polling for aliveness.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::TreeError;
use crate::process::ProcessTree;

/// Outcome of a tree kill.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KillReport {
    /// Live processes found when the kill started.
    pub targeted: Vec<u32>,
    /// Targets confirmed gone.
    pub terminated: Vec<u32>,
    /// Targets still alive when the timeout expired.
    pub survivors: Vec<u32>,
}

impl KillReport {
    pub fn is_clean(&self) -> bool {
        self.survivors.is_empty()
    }
}

/// A parent PID and its live descendants, deepest first. Never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeSnapshot {
    pub root: u32,
    pub descendants: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Sent,
    Gone,
    Refused,
}

#[derive(Clone)]
pub struct Terminator {
    tree: Arc<dyn ProcessTree>,
    poll_interval: Duration,
}

impl Terminator {
    pub fn new(tree: Arc<dyn ProcessTree>) -> Self {
        Terminator {
            tree,
            poll_interval: Duration::from_millis(100),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn is_alive(&self, pid: u32) -> bool {
        self.tree.is_alive(pid)
    }

    /// Recursively discover the live descendants of `pid`.
    pub fn snapshot(&self, pid: u32) -> TreeSnapshot {
        let mut seen = HashSet::from([pid]);
        let mut descendants = Vec::new();
        self.collect(pid, &mut seen, &mut descendants);
        TreeSnapshot { root: pid, descendants }
    }

    fn collect(&self, pid: u32, seen: &mut HashSet<u32>, out: &mut Vec<u32>) {
        let children = match self.tree.children_of(pid) {
            Ok(c) => c,
            Err(e) => {
                warn!(pid, error = %e, "cannot enumerate children");
                return;
            }
        };
        for child in children {
            // PID reuse can create apparent cycles.
            if seen.insert(child) {
                self.collect(child, seen, out);
                out.push(child);
            }
        }
    }

    fn deliver(&self, pid: u32, force: bool) -> Delivery {
        let result = if force {
            self.tree.kill(pid)
        } else {
            self.tree.terminate(pid)
        };
        match result {
            Ok(()) => Delivery::Sent,
            Err(e) if e.is_gone() => Delivery::Gone,
            Err(TreeError::PermissionDenied(_)) => {
                warn!(pid, force, "permission denied while signalling");
                Delivery::Refused
            }
            Err(e) => {
                warn!(pid, force, error = %e, "signal failed");
                Delivery::Refused
            }
        }
    }

    /// Poll until `pid` is gone or `timeout` elapses.
    pub fn wait_gone(&self, pid: u32, timeout: Duration) -> bool {
        self.wait_gone_until(pid, Instant::now() + timeout)
    }

    fn wait_gone_until(&self, pid: u32, deadline: Instant) -> bool {
        loop {
            if !self.tree.is_alive(pid) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(self.poll_interval.min(deadline - now));
        }
    }

    /// Stop one process: polite signal and wait, then forceful on survival.
    /// With `force` the polite step is skipped. Returns whether it is gone.
    fn stop_one(&self, pid: u32, force: bool, timeout: Duration) -> bool {
        if !self.tree.is_alive(pid) {
            return true;
        }
        let mut remaining = timeout;
        if !force {
            let polite = timeout / 2;
            match self.deliver(pid, false) {
                Delivery::Gone => return true,
                Delivery::Sent if self.wait_gone(pid, polite) => return true,
                _ => {}
            }
            remaining = timeout.saturating_sub(polite);
            debug!(pid, "escalating to forceful kill");
        }
        match self.deliver(pid, true) {
            Delivery::Gone => true,
            Delivery::Refused => false,
            Delivery::Sent => self.wait_gone(pid, remaining),
        }
    }

    /// Stop `pid`; with `recursive`, stop its descendants first, depth-first.
    pub fn kill(&self, pid: u32, force: bool, recursive: bool, timeout: Duration) -> bool {
        if recursive {
            let children = self.tree.children_of(pid).unwrap_or_else(|e| {
                warn!(pid, error = %e, "cannot enumerate children");
                Vec::new()
            });
            for child in children {
                self.kill(child, force, true, timeout);
            }
        }
        self.stop_one(pid, force, timeout)
    }

    /// Send a polite stop to every live member of the tree without waiting.
    /// Returns how many processes were signalled.
    pub fn request_stop(&self, pid: u32) -> usize {
        let snapshot = self.snapshot(pid);
        snapshot
            .descendants
            .iter()
            .chain(std::iter::once(&pid))
            .filter(|p| self.deliver(**p, false) == Delivery::Sent)
            .count()
    }

    /// Force-kill every descendant of `pid`, then (when `include_parent`)
    /// stop the root politely with forceful fallback. The whole call is
    /// bounded by roughly `timeout`.
    pub fn kill_process_tree(&self, pid: u32, include_parent: bool, timeout: Duration) -> KillReport {
        let snapshot = self.snapshot(pid);
        let root_targeted = include_parent && self.tree.is_alive(pid);
        let mut report = KillReport {
            targeted: snapshot.descendants.clone(),
            ..KillReport::default()
        };
        if root_targeted {
            report.targeted.push(pid);
        }

        let deadline = Instant::now() + timeout;
        for child in &snapshot.descendants {
            self.deliver(*child, true);
        }
        for child in &snapshot.descendants {
            if self.wait_gone_until(*child, deadline) {
                report.terminated.push(*child);
            } else {
                report.survivors.push(*child);
            }
        }

        if root_targeted {
            // The root shares the deadline; a short floor still lets the
            // forceful step be observed.
            let left = deadline
                .saturating_duration_since(Instant::now())
                .max(self.poll_interval * 2);
            if self.stop_one(pid, false, left) {
                report.terminated.push(pid);
            } else {
                report.survivors.push(pid);
            }
        }

        if !report.is_clean() {
            warn!(pid, survivors = ?report.survivors, "process tree not fully terminated");
        } else if !report.targeted.is_empty() {
            debug!(pid, count = report.terminated.len(), "process tree terminated");
        }
        report
    }

    /// Shutdown sweep: kill every descendant of the current process.
    pub fn kill_all_descendants(&self, timeout: Duration) -> KillReport {
        self.kill_process_tree(std::process::id(), false, timeout)
    }
}
