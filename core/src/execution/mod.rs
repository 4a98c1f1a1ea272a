//! Build execution: spawning engine processes, watching them, and stopping
//! them.
//!
//! The [`scheduler::Scheduler`] owns all job state and runs on the caller's
//! thread. Child output and exits arrive as [`events::JobEvent`]s from
//! per-process reader threads; user-facing side effects go through the
//! [`host::Host`] trait.

pub mod events;
pub mod handle;
pub mod host;
pub mod output;
pub mod remediation;
pub mod sandbox;
pub mod scheduler;
pub mod summary;
