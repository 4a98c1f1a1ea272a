//! Synchronous command execution for short-lived helper commands
//! (tool probes, package installs, process-table queries).
//!
//! Long-running compiler children are spawned by the scheduler directly;
//! nothing here is used for them.

pub mod runner;
pub mod which;

pub use runner::{CommandRunner, MockRunner, ProcessRunner};
pub use which::{can_resolve_command, find_executable_in_path};
