//! Batch bookkeeping: per-file elapsed times and the end-of-batch summary.

use std::time::Duration;

use serde::Serialize;

use crate::types::job::JobPhase;

// ---------------------------------------------------------------------------
// ElapsedLedger
// ---------------------------------------------------------------------------

/// Elapsed build time per file basename, in completion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ElapsedLedger {
    entries: Vec<(String, Duration)>,
}

impl ElapsedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished build. A basename built twice in one batch keeps
    /// both entries.
    pub fn record(&mut self, basename: &str, elapsed: Duration) {
        self.entries.push((basename.to_string(), elapsed));
    }

    pub fn entries(&self) -> &[(String, Duration)] {
        &self.entries
    }

    pub fn total(&self) -> Duration {
        self.entries.iter().map(|(_, d)| *d).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// BatchSummary
// ---------------------------------------------------------------------------

/// What one batch did, produced when the scheduler goes idle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub entries: Vec<(String, Duration)>,
    pub total: Duration,
    /// Wall-clock time from the first start to idle.
    pub wall: Duration,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub canceled: usize,
    pub aborted: usize,
    /// Popped from the queue but declined by the host.
    pub skipped: usize,
    /// Dropped from the queue by cancel-all.
    pub dropped: usize,
}

impl BatchSummary {
    /// Copy per-file and total times from `ledger`.
    pub fn record_timings(&mut self, ledger: &ElapsedLedger) {
        self.entries = ledger.entries().to_vec();
        self.total = ledger.total();
    }

    /// Count a terminal job.
    pub fn count(&mut self, phase: JobPhase) {
        match phase {
            JobPhase::Succeeded => self.succeeded += 1,
            JobPhase::Failed => self.failed += 1,
            JobPhase::TimedOut => self.timed_out += 1,
            JobPhase::Canceled => self.canceled += 1,
            JobPhase::Aborted => self.aborted += 1,
            JobPhase::Queued | JobPhase::Starting | JobPhase::Running => {}
        }
    }

    pub fn jobs(&self) -> usize {
        self.succeeded + self.failed + self.timed_out + self.canceled + self.aborted
    }

    /// Log lines: one per timed file, then the totals.
    pub fn render(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.entries.len() + 2);
        for (name, elapsed) in &self.entries {
            lines.push(format!("  {}: {}", name, format_duration(*elapsed)));
        }
        lines.push(format!(
            "Total build time: {} ({} wall)",
            format_duration(self.total),
            format_duration(self.wall)
        ));
        let mut counts = format!("{} succeeded, {} failed", self.succeeded, self.failed);
        for (n, label) in [
            (self.timed_out, "timed out"),
            (self.canceled, "canceled"),
            (self.aborted, "aborted"),
            (self.skipped, "skipped"),
            (self.dropped, "dropped"),
        ] {
            if n > 0 {
                counts.push_str(&format!(", {} {}", n, label));
            }
        }
        lines.push(counts);
        lines
    }
}

/// `1h02m03s`, `2m05s`, `3.42s`.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 {
        format!("{}h{:02}m{:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.2}s", d.as_secs_f64())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ledger_totals() {
        let mut l = ElapsedLedger::new();
        l.record("a.py", Duration::from_millis(1500));
        l.record("b.py", Duration::from_millis(500));
        assert_eq!(l.total(), Duration::from_secs(2));
        assert_eq!(l.entries()[0].0, "a.py");
    }

    #[test]
    fn summary_counts_and_render() {
        let mut l = ElapsedLedger::new();
        l.record("a.py", Duration::from_secs(2));
        l.record("b.py", Duration::from_secs(75));
        let mut s = BatchSummary::default();
        s.record_timings(&l);
        s.count(JobPhase::Succeeded);
        s.count(JobPhase::Failed);
        s.count(JobPhase::Canceled);
        s.count(JobPhase::Running);
        s.wall = Duration::from_secs(77);
        assert_eq!(s.jobs(), 3);
        assert_eq!(
            s.render(),
            vec![
                "  a.py: 2.00s",
                "  b.py: 1m15s",
                "Total build time: 1m17s (1m17s wall)",
                "1 succeeded, 1 failed, 1 canceled",
            ]
        );
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(Duration::from_millis(3420)), "3.42s");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1h02m03s");
    }
}
