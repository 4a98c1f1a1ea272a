//! Ark: build orchestration for turning script programs into executables.
//!
//! The crate is organised leaves-first:
//!
//! - [`process`]: process-tree discovery and staged termination.
//! - [`engine`]: the compiler-backend contract, registry and built-in engines.
//! - [`autoargs`]: dependency detection and mapping-driven extra arguments.
//! - [`execution`]: the bounded job scheduler with watchdog and cancellation.
//!
//! [`data`] and [`types`] hold configuration and shared value types;
//! [`infrastructure`] wraps external command execution.

pub mod autoargs;
pub mod data;
pub mod engine;
pub mod error;
pub mod execution;
pub mod infrastructure;
pub mod logging;
pub mod process;
pub mod types;

pub use engine::registry::EngineRegistry;
pub use engine::{BuildContext, BuildOptions, Engine};
pub use execution::host::Host;
pub use execution::scheduler::Scheduler;
pub use types::config::Settings;
