//! Process table backed by the `/proc` pseudo-filesystem.

use std::path::{Path, PathBuf};

use crate::error::TreeError;
use crate::process::{signal, ProcessTree};

pub struct ProcfsTree {
    root: PathBuf,
}

/// The fields of `/proc/<pid>/stat` this module needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatFields {
    pub state: char,
    pub ppid: u32,
}

impl StatFields {
    /// Zombie (`Z`) and dead (`X`, `x`) entries are not running processes.
    pub fn is_running(&self) -> bool {
        !matches!(self.state, 'Z' | 'X' | 'x')
    }
}

/// Parse a stat line. The command name is parenthesised and may itself
/// contain spaces or parentheses, so fields are read after the last `)`.
pub fn parse_stat(content: &str) -> Option<StatFields> {
    let close = content.rfind(')')?;
    let mut fields = content[close + 1..].split_whitespace();
    let state = fields.next()?.chars().next()?;
    let ppid = fields.next()?.parse().ok()?;
    Some(StatFields { state, ppid })
}

impl ProcfsTree {
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    /// Read from another mount point (or a fixture directory).
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        ProcfsTree { root: root.into() }
    }

    pub fn available() -> bool {
        Path::new("/proc/self/stat").is_file()
    }

    fn stat(&self, pid: u32) -> Option<StatFields> {
        let content = std::fs::read_to_string(self.root.join(pid.to_string()).join("stat")).ok()?;
        parse_stat(&content)
    }
}

impl Default for ProcfsTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTree for ProcfsTree {
    fn children_of(&self, pid: u32) -> Result<Vec<u32>, TreeError> {
        let entries = std::fs::read_dir(&self.root)
            .map_err(|e| TreeError::Table(format!("{}: {}", self.root.display(), e)))?;
        let mut children: Vec<u32> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().to_str()?.parse::<u32>().ok())
            .filter(|candidate| {
                // Entries vanish between listing and reading; skip those.
                self.stat(*candidate)
                    .map(|s| s.ppid == pid && s.is_running())
                    .unwrap_or(false)
            })
            .collect();
        children.sort_unstable();
        Ok(children)
    }

    fn is_alive(&self, pid: u32) -> bool {
        self.stat(pid).map(|s| s.is_running()).unwrap_or(false)
    }

    fn terminate(&self, pid: u32) -> Result<(), TreeError> {
        signal::terminate(pid)
    }

    fn kill(&self, pid: u32) -> Result<(), TreeError> {
        signal::kill(pid)
    }
}
