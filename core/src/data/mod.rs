//! Configuration loading and workspace file selection.

pub mod glob;
pub mod project_config;
pub mod scanner;
pub mod settings;

pub use project_config::load_project_config;
pub use scanner::{scan_workspace, select_files, Selection};
pub use settings::{effective_timeout, load_for_workspace};
