//! Discrete events from child supervision threads to the scheduler loop,
//! and the JSON-line progress protocol.

use serde::Deserialize;

use super::output::OutputStream;
use crate::types::job::{ExitInfo, JobId};

/// Everything the scheduler learns about a running child arrives as one of
/// these, in per-stream order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    Output {
        job: JobId,
        stream: OutputStream,
        line: String,
    },
    /// The child was reaped and its output pipes are drained (or given up on).
    Exited { job: JobId, exit: ExitInfo },
    /// Waiting on the child failed; treated as an abnormal exit.
    WaitFailed { job: JobId, error: String },
}

/// A determinate progress report from a child.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressReport {
    pub current: Option<u64>,
    pub total: Option<u64>,
    pub stage: Option<String>,
}

#[derive(Deserialize)]
struct ProgressLine {
    progress: Option<ProgressCounts>,
    stage: Option<String>,
}

#[derive(Deserialize)]
struct ProgressCounts {
    current: Option<u64>,
    total: Option<u64>,
}

/// Parse `{"progress":{"current":N,"total":M}}` and/or `{"stage":"..."}`.
/// Anything else, including JSON without either key, is plain output.
pub fn parse_progress(line: &str) -> Option<ProgressReport> {
    let trimmed = line.trim();
    if !(trimmed.starts_with('{') && trimmed.ends_with('}')) {
        return None;
    }
    let parsed: ProgressLine = serde_json::from_str(trimmed).ok()?;
    if parsed.progress.is_none() && parsed.stage.is_none() {
        return None;
    }
    let (current, total) = parsed
        .progress
        .map_or((None, None), |p| (p.current, p.total));
    Some(ProgressReport {
        current,
        total,
        stage: parsed.stage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_and_stage() {
        let p = parse_progress(r#"{"progress":{"current":3,"total":10},"stage":"linking"}"#).unwrap();
        assert_eq!(p.current, Some(3));
        assert_eq!(p.total, Some(10));
        assert_eq!(p.stage.as_deref(), Some("linking"));

        let s = parse_progress(r#"  {"stage":"analysis"}  "#).unwrap();
        assert_eq!(s.current, None);
    }

    #[test]
    fn plain_lines_are_not_progress() {
        assert!(parse_progress("Building EXE from EXE-00.toc").is_none());
        assert!(parse_progress(r#"{"other": 1}"#).is_none());
        assert!(parse_progress("{broken").is_none());
        assert!(parse_progress(r#"{"progress": "half"}"#).is_none());
    }
}
