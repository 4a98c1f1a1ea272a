//! Loader for the per-project build configuration (`ARK_Main_Config.yaml`).
//!
//! The file is optional. When present, its exclusion patterns are merged
//! with the built-in defaults; a malformed file falls back to the defaults.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::ConfigError;
use crate::types::config::ProjectConfig;


/// Always-excluded locations: bytecode, VCS folders, virtual environments,
/// build outputs and tool caches.
pub const DEFAULT_EXCLUSION_PATTERNS: &[&str] = &[
    "**/__pycache__/**",
    "**/*.pyc",
    "**/*.pyo",
    "**/*.pyd",
    ".git/**",
    ".svn/**",
    ".hg/**",
    "venv/**",
    ".venv/**",
    "env/**",
    ".env/**",
    "node_modules/**",
    "build/**",
    "dist/**",
    "*.egg-info/**",
    ".pytest_cache/**",
    ".mypy_cache/**",
    ".tox/**",
    "site-packages/**",
];

const CONFIG_NAMES: &[&str] = &[
    "ARK_Main_Config.yaml",
    "ARK_Main_Config.yml",
    ".ARK_Main_Config.yaml",
    ".ARK_Main_Config.yml",
];


/// First existing config file in the workspace, if any.
pub fn find_config(workspace: &Path) -> Option<PathBuf> {
    CONFIG_NAMES
        .iter()
        .map(|n| workspace.join(n))
        .find(|p| p.is_file())
}


/// Parse a config document and merge default exclusions into it.
pub fn parse(content: &str, origin: &Path) -> Result<ProjectConfig, ConfigError> {
    let mut cfg: ProjectConfig = if content.trim().is_empty() {
        ProjectConfig::default()
    } else {
        serde_yaml::from_str(content).map_err(|source| ConfigError::Yaml {
            path: origin.to_path_buf(),
            source,
        })?
    };
    cfg.exclusion_patterns = merge_patterns(&cfg.exclusion_patterns);
    if cfg.inclusion_patterns.is_empty() {
        cfg.inclusion_patterns = ProjectConfig::default().inclusion_patterns;
    }
    Ok(cfg)
}


/// Load the workspace configuration, or defaults when absent or invalid.
pub fn load_project_config(workspace: &Path) -> ProjectConfig {
    let Some(path) = find_config(workspace) else {
        return defaults();
    };
    let loaded = std::fs::read_to_string(&path)
        .map_err(|source| ConfigError::Io { path: path.clone(), source })
        .and_then(|content| parse(&content, &path));
    match loaded {
        Ok(cfg) => {
            info!(path = %path.display(), "loaded project config");
            cfg
        }
        Err(e) => {
            warn!(error = %e, "project config unusable, using defaults");
            defaults()
        }
    }
}


fn defaults() -> ProjectConfig {
    ProjectConfig {
        exclusion_patterns: merge_patterns(&[]),
        ..ProjectConfig::default()
    }
}


/// Defaults first, then user patterns, without duplicates.
fn merge_patterns(user: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let all = DEFAULT_EXCLUSION_PATTERNS
        .iter()
        .map(|s| s.to_string())
        .chain(user.iter().map(|s| s.trim().to_string()));
    for p in all {
        if !p.is_empty() && !out.contains(&p) {
            out.push(p);
        }
    }
    out
}
