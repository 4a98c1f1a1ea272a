use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Orchestrator settings. Every field has a default so partial YAML files load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub max_parallel: usize,
    pub process_timeout_secs: u64,
    pub grace_period_secs: u64,
    pub cancel_kill_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub auto_install_missing: bool,
    pub max_remediation_per_failure: usize,
    pub show_error_dialogs: bool,
    pub auto_report: bool,
    pub engine_timeouts: BTreeMap<String, u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping_path: Option<String>,
    pub manifest_files: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            max_parallel: 3,
            process_timeout_secs: 1800,
            grace_period_secs: 5,
            cancel_kill_timeout_ms: 2000,
            poll_interval_ms: 100,
            auto_install_missing: true,
            max_remediation_per_failure: 3,
            show_error_dialogs: true,
            auto_report: false,
            engine_timeouts: BTreeMap::new(),
            mapping_path: None,
            manifest_files: vec!["requirements.txt".into(), "requirements.in".into()],
        }
    }
}

impl Settings {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn cancel_kill_timeout(&self) -> Duration {
        Duration::from_millis(self.cancel_kill_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Concurrency bound, never below one.
    pub fn bound(&self) -> usize {
        self.max_parallel.max(1)
    }
}

/// Per-project build configuration (`ARK_Main_Config.yaml`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProjectConfig {
    pub exclusion_patterns: Vec<String>,
    pub inclusion_patterns: Vec<String>,
    pub compile_only_main: bool,
    pub main_file_names: Vec<String>,
    pub auto_detect_entry_points: bool,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        ProjectConfig {
            exclusion_patterns: Vec::new(),
            inclusion_patterns: vec!["**/*.py".into()],
            compile_only_main: false,
            main_file_names: vec!["main.py".into(), "app.py".into()],
            auto_detect_entry_points: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let s: Settings = serde_yaml::from_str("max_parallel: 5\n").unwrap();
        assert_eq!(s.max_parallel, 5);
        assert_eq!(s.process_timeout_secs, 1800);
        assert_eq!(s.manifest_files, vec!["requirements.txt", "requirements.in"]);
    }

    #[test]
    fn bound_is_at_least_one() {
        let s = Settings { max_parallel: 0, ..Settings::default() };
        assert_eq!(s.bound(), 1);
    }

    #[test]
    fn project_config_defaults() {
        let c: ProjectConfig = serde_yaml::from_str("compile_only_main: true").unwrap();
        assert!(c.compile_only_main);
        assert_eq!(c.inclusion_patterns, vec!["**/*.py"]);
        assert!(c.auto_detect_entry_points);
    }
}
