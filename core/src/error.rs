//! Error types shared across the crate.

use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by an engine hook or while preparing its command.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine '{0}' is not registered")]
    UnknownEngine(String),

    #[error("preflight failed for {engine}: {reason}")]
    Preflight { engine: String, reason: String },

    #[error("cannot build command for {engine}: {reason}")]
    Command { engine: String, reason: String },

    #[error("invalid argument at position {index}: {reason}")]
    InvalidArgument { index: usize, reason: String },

    #[error("{engine} incompatible: {missing}")]
    Incompatible { engine: String, missing: String },

    #[error("success hook of {engine} failed: {reason}")]
    Hook { engine: String, reason: String },

    #[error("engine manifest {path}: {reason}")]
    Manifest { path: PathBuf, reason: String },
}

/// Failures while inspecting or signalling processes.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("process {0} not found")]
    NotFound(u32),

    #[error("permission denied for process {0}")]
    PermissionDenied(u32),

    #[error("process table unavailable: {0}")]
    Table(String),

    #[error("signal to {pid} failed: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: std::io::Error,
    },
}

impl TreeError {
    /// True when the target no longer exists, which callers treat as success.
    pub fn is_gone(&self) -> bool {
        matches!(self, TreeError::NotFound(_))
    }
}

/// Failures while loading settings, project configuration or mapping files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid JSON in {origin}: {source}")]
    Json {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{origin}: {reason}")]
    Invalid { origin: String, reason: String },
}

/// Failures between a resolved command and a running child.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("failed to spawn {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("child has no {0} pipe")]
    MissingPipe(&'static str),

    #[error("cannot prepare cancellation sentinel {path}: {source}")]
    Sentinel {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_counts_as_gone() {
        assert!(TreeError::NotFound(42).is_gone());
        assert!(!TreeError::PermissionDenied(42).is_gone());
    }

    #[test]
    fn messages_name_the_subject() {
        let e = EngineError::UnknownEngine("nuitka".into());
        assert_eq!(e.to_string(), "engine 'nuitka' is not registered");
        let e = TreeError::PermissionDenied(7);
        assert_eq!(e.to_string(), "permission denied for process 7");
    }
}
