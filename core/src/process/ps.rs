//! Process table read through `ps`, for unix systems without `/proc`.

use std::sync::Arc;

use crate::error::TreeError;
use crate::infrastructure::runner::CommandRunner;
use crate::process::{signal, ProcessTree};

pub struct PsTree {
    runner: Arc<dyn CommandRunner>,
}

/// Parse `ps -A -o pid=,ppid=` output into `(pid, ppid)` pairs.
pub fn parse_table(output: &str) -> Vec<(u32, u32)> {
    output
        .lines()
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let pid = cols.next()?.parse().ok()?;
            let ppid = cols.next()?.parse().ok()?;
            Some((pid, ppid))
        })
        .collect()
}

impl PsTree {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        PsTree { runner }
    }

    fn is_zombie(&self, pid: u32) -> bool {
        let args = vec!["-o".to_string(), "stat=".to_string(), "-p".to_string(), pid.to_string()];
        match self.runner.run("ps", &args) {
            Ok(out) => out.trim_start().starts_with('Z'),
            Err(_) => false,
        }
    }
}

impl ProcessTree for PsTree {
    fn children_of(&self, pid: u32) -> Result<Vec<u32>, TreeError> {
        let args = vec!["-A".to_string(), "-o".to_string(), "pid=,ppid=".to_string()];
        let out = self.runner.run("ps", &args).map_err(TreeError::Table)?;
        let mut children: Vec<u32> = parse_table(&out)
            .into_iter()
            .filter(|(_, ppid)| *ppid == pid)
            .map(|(child, _)| child)
            .collect();
        children.sort_unstable();
        Ok(children)
    }

    fn is_alive(&self, pid: u32) -> bool {
        signal::exists(pid) && !self.is_zombie(pid)
    }

    fn terminate(&self, pid: u32) -> Result<(), TreeError> {
        signal::terminate(pid)
    }

    fn kill(&self, pid: u32) -> Result<(), TreeError> {
        signal::kill(pid)
    }
}
