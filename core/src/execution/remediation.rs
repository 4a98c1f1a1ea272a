//! Missing-module remediation after a failed build.
//!
//! The heuristic reads "module not found" errors from stderr and offers to
//! install the named top-level packages. A name is offered at most once per
//! session, and at most `limit` names per failure.

use std::collections::HashSet;

/// Top-level module names reported missing in `stderr`, first occurrence
/// order, without duplicates.
pub fn missing_modules(stderr: &str) -> Vec<String> {
    const MARKERS: &[&str] = &[
        "ModuleNotFoundError: No module named ",
        "ImportError: No module named ",
    ];
    let mut found: Vec<String> = Vec::new();
    for line in stderr.lines() {
        for marker in MARKERS {
            let Some(at) = line.find(marker) else {
                continue;
            };
            let raw = line[at + marker.len()..]
                .trim()
                .trim_matches(|c| c == '\'' || c == '"');
            let top = raw
                .split(|c: char| c == '.' || c == '\'' || c == '"' || c.is_whitespace())
                .next()
                .unwrap_or("");
            let valid = !top.is_empty() && top.chars().all(|c| c.is_alphanumeric() || c == '_');
            if valid && !found.iter().any(|f| f == top) {
                found.push(top.to_string());
            }
        }
    }
    found
}

/// Names already offered this session.
#[derive(Debug, Default)]
pub struct RemediationLedger {
    attempted: HashSet<String>,
}

impl RemediationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names from `stderr` not yet attempted, capped at `limit`. Returned
    /// names are marked attempted.
    pub fn plan(&mut self, stderr: &str, limit: usize) -> Vec<String> {
        let fresh: Vec<String> = missing_modules(stderr)
            .into_iter()
            .filter(|m| !self.attempted.contains(m))
            .take(limit)
            .collect();
        self.attempted.extend(fresh.iter().cloned());
        fresh
    }

    pub fn was_attempted(&self, module: &str) -> bool {
        self.attempted.contains(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_forms() {
        let stderr = "\
Traceback (most recent call last):
ModuleNotFoundError: No module named 'yaml'
ModuleNotFoundError: No module named 'google.protobuf'
ImportError: No module named requests
ModuleNotFoundError: No module named 'yaml'
";
        assert_eq!(missing_modules(stderr), vec!["yaml", "google", "requests"]);
    }

    #[test]
    fn ledger_never_repeats() {
        let mut ledger = RemediationLedger::new();
        let err = "ModuleNotFoundError: No module named 'a'\nModuleNotFoundError: No module named 'b'\n";
        assert_eq!(ledger.plan(err, 1), vec!["a"]);
        assert_eq!(ledger.plan(err, 5), vec!["b"]);
        assert!(ledger.plan(err, 5).is_empty());
        assert!(ledger.was_attempted("a"));
    }
}
