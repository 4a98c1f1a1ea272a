//! Process-tree discovery and staged termination.
//!
//! [`ProcessTree`] is the per-platform primitive (enumerate children, probe,
//! signal). [`Terminator`] layers the polite → wait → forceful protocol and
//! recursive tree kills on top of it.

#[cfg(unix)]
pub mod procfs;
#[cfg(unix)]
pub mod ps;
#[cfg(unix)]
mod signal;
pub mod terminator;
#[cfg(any(windows, test))]
pub mod windows;

use std::sync::Arc;

use crate::error::TreeError;

pub use terminator::{KillReport, Terminator, TreeSnapshot};

/// Platform process table. Implementations are stateless; every call reads
/// the live table.
pub trait ProcessTree: Send + Sync {
    /// Direct, live children of `pid`.
    fn children_of(&self, pid: u32) -> Result<Vec<u32>, TreeError>;

    /// False for unknown and zombie processes.
    fn is_alive(&self, pid: u32) -> bool;

    /// Polite stop request (SIGTERM, or `taskkill` without `/F`).
    fn terminate(&self, pid: u32) -> Result<(), TreeError>;

    /// Forceful stop (SIGKILL, or `taskkill /F`).
    fn kill(&self, pid: u32) -> Result<(), TreeError>;
}

/// The process table implementation for the running platform.
#[cfg(unix)]
pub fn platform_tree() -> Arc<dyn ProcessTree> {
    if procfs::ProcfsTree::available() {
        Arc::new(procfs::ProcfsTree::new())
    } else {
        Arc::new(ps::PsTree::new(Arc::new(
            crate::infrastructure::runner::ProcessRunner,
        )))
    }
}

#[cfg(windows)]
pub fn platform_tree() -> Arc<dyn ProcessTree> {
    Arc::new(windows::WindowsTree::new(Arc::new(
        crate::infrastructure::runner::ProcessRunner,
    )))
}
