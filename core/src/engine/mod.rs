//! The compiler-backend contract.
//!
//! An [`Engine`] describes how to turn one source file into a command line
//! for an external compiler. It never spawns anything itself: the scheduler
//! asks it to preflight, to produce `(program, args)` and an environment
//! overlay, and calls [`Engine::on_success`] once the batch is idle.

pub mod builtin;
pub mod compat;
pub mod manifest;
pub mod registry;
pub mod tools;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::autoargs::builder::ArgBuilder;
use crate::autoargs::AutoArgs;
use crate::error::EngineError;
use tools::{RequiredTools, ToolGate, ToolStatus};

/// Directory (relative to the workspace) holding per-job cancel sentinels.
pub const CANCEL_DIR: &str = ".pycompiler/cancel";

/// User-chosen build options, passed explicitly into every engine call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    pub onefile: bool,
    pub standalone: bool,
    pub windowed: bool,
    pub noconfirm: bool,
    pub clean: bool,
    pub show_progress: bool,
    pub name: Option<String>,
    pub icon: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    /// `(source, destination)` pairs bundled next to the program.
    pub data_files: Vec<(PathBuf, String)>,
    pub data_dirs: Vec<(PathBuf, String)>,
    pub extra_args: Vec<String>,
}

/// Everything an engine may look at while building one job.
pub struct BuildContext<'a> {
    pub workspace: &'a Path,
    /// Interpreter that runs the compiler module.
    pub python: &'a Path,
    pub options: &'a BuildOptions,
    /// Candidate project files, used for import scanning.
    pub files: &'a [PathBuf],
    pub auto_args: &'a AutoArgs,
    pub tools: &'a ToolGate,
    pub log: &'a dyn Fn(&str),
}

impl<'a> BuildContext<'a> {
    pub fn log(&self, line: &str) {
        (self.log)(line)
    }

    /// Dependency-driven arguments for `engine`; warnings go to the log.
    pub fn auto_args_for(&self, engine: &dyn Engine) -> Vec<String> {
        let outcome = self.auto_args.compute(engine, self.workspace, self.files);
        for w in &outcome.warnings {
            self.log(&format!("auto-args: {}", w));
        }
        outcome.args
    }

    pub fn python_str(&self) -> String {
        self.python.to_string_lossy().to_string()
    }
}

/// Interpreter for a workspace: its `venv`/`.venv` when present, else the
/// platform default found on `PATH`.
pub fn default_python(workspace: &Path) -> PathBuf {
    let (bin, exe) = if cfg!(windows) {
        ("Scripts", "python.exe")
    } else {
        ("bin", "python")
    };
    for venv in ["venv", ".venv"] {
        let candidate = workspace.join(venv).join(bin).join(exe);
        if candidate.is_file() {
            return candidate;
        }
    }
    PathBuf::from(if cfg!(windows) { "python" } else { "python3" })
}

pub trait Engine: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn required_core_version(&self) -> &str {
        "1.0.0"
    }

    fn required_sdk_version(&self) -> &str {
        "1.0.0"
    }

    fn required_tools(&self) -> RequiredTools {
        RequiredTools::default()
    }

    /// False may mean "an install was started, retry later".
    fn preflight(&self, ctx: &BuildContext<'_>, _file: &Path) -> bool {
        let required = self.required_tools();
        if required.is_empty() {
            return true;
        }
        ctx.tools.ensure_installed(self.id(), &required, ctx.python, ctx.log) == ToolStatus::Ready
    }

    /// Full argv, program first. Must not execute anything.
    fn build_command(&self, ctx: &BuildContext<'_>, file: &Path) -> Result<Vec<String>, EngineError>;

    /// `None` aborts the job before spawning.
    fn program_and_args(&self, ctx: &BuildContext<'_>, file: &Path) -> Option<(String, Vec<String>)> {
        match self.build_command(ctx, file) {
            Ok(argv) => {
                let (program, args) = argv.split_first()?;
                Some((program.clone(), args.to_vec()))
            }
            Err(e) => {
                ctx.log(&e.to_string());
                None
            }
        }
    }

    /// Variables overlaid on the inherited environment.
    fn environment(&self, _ctx: &BuildContext<'_>, _file: &Path) -> Option<BTreeMap<String, String>> {
        None
    }

    /// Runs once the whole batch is idle. Errors are logged, never retried.
    fn on_success(&self, _ctx: &BuildContext<'_>, _file: &Path) -> Result<(), EngineError> {
        Ok(())
    }

    /// Watchdog duration taking precedence over settings.
    fn timeout_override(&self) -> Option<Duration> {
        None
    }

    /// Mapping table JSON shipped with the engine.
    fn embedded_mapping(&self) -> Option<&str> {
        None
    }

    /// Replaces the generic auto-argument builder for this engine.
    fn arg_builder(&self) -> Option<Arc<dyn ArgBuilder>> {
        None
    }

    /// Sentinel whose existence asks the child to stop.
    fn cancel_sentinel(&self, workspace: &Path, file: &Path) -> PathBuf {
        let basename = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        workspace
            .join(CANCEL_DIR)
            .join(format!("{}_{}.cancel", self.id(), basename))
    }

    fn log_prefix(&self, _basename: &str) -> String {
        format!("{} ({})", self.name(), self.version())
    }
}

/// Output directory reported by `on_success` hooks.
pub(crate) fn output_dir(ctx: &BuildContext<'_>) -> PathBuf {
    match &ctx.options.output_dir {
        Some(d) if d.is_absolute() => d.clone(),
        Some(d) => ctx.workspace.join(d),
        None => ctx.workspace.join("dist"),
    }
}

pub(crate) fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

#[cfg(test)]
pub(crate) mod testing {
    //! Context fixture and a scriptable engine for scheduler tests.

    use super::*;
    use crate::engine::tools::testing::StaticProvisioner;
    use crate::types::config::Settings;

    pub struct Fixture {
        pub workspace: PathBuf,
        pub python: PathBuf,
        pub options: BuildOptions,
        pub files: Vec<PathBuf>,
        pub auto_args: AutoArgs,
        pub tools: ToolGate,
    }

    impl Fixture {
        pub fn new(workspace: &Path) -> Self {
            Fixture {
                workspace: workspace.to_path_buf(),
                python: PathBuf::from("python3"),
                options: BuildOptions::default(),
                files: Vec::new(),
                auto_args: AutoArgs::from_settings(&Settings::default()),
                tools: ToolGate::new(Arc::new(StaticProvisioner::with(&[
                    "pyinstaller",
                    "nuitka",
                    "cx_Freeze",
                    "gcc",
                ]))),
            }
        }

        pub fn ctx<'a>(&'a self, log: &'a dyn Fn(&str)) -> BuildContext<'a> {
            BuildContext {
                workspace: &self.workspace,
                python: &self.python,
                options: &self.options,
                files: &self.files,
                auto_args: &self.auto_args,
                tools: &self.tools,
                log,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::Fixture;
    use super::*;

    struct Echo;

    impl Engine for Echo {
        fn id(&self) -> &str {
            "echo"
        }
        fn name(&self) -> &str {
            "Echo"
        }
        fn build_command(&self, _ctx: &BuildContext<'_>, file: &Path) -> Result<Vec<String>, EngineError> {
            Ok(vec!["echo".into(), path_arg(file)])
        }
    }

    #[test]
    fn default_program_and_args_splits_argv() {
        let dir = tempfile::tempdir().unwrap();
        let fx = Fixture::new(dir.path());
        let ctx = fx.ctx(&|_| {});
        let (prog, args) = Echo.program_and_args(&ctx, Path::new("a.py")).unwrap();
        assert_eq!(prog, "echo");
        assert_eq!(args, vec!["a.py"]);
    }

    #[test]
    fn sentinel_path_layout() {
        let p = Echo.cancel_sentinel(Path::new("/ws"), Path::new("/ws/src/app.py"));
        assert_eq!(p, Path::new("/ws/.pycompiler/cancel/echo_app.py.cancel"));
    }

    #[test]
    fn default_prefix_and_preflight() {
        let dir = tempfile::tempdir().unwrap();
        let fx = Fixture::new(dir.path());
        assert_eq!(Echo.log_prefix("a.py"), "Echo (1.0.0)");
        assert!(Echo.preflight(&fx.ctx(&|_| {}), Path::new("a.py")));
    }

    #[test]
    fn venv_python_preferred() {
        let dir = tempfile::tempdir().unwrap();
        assert!(default_python(dir.path()).ends_with(if cfg!(windows) { "python" } else { "python3" }));
        let bin = if cfg!(windows) { "Scripts" } else { "bin" };
        let exe = if cfg!(windows) { "python.exe" } else { "python" };
        std::fs::create_dir_all(dir.path().join(".venv").join(bin)).unwrap();
        std::fs::write(dir.path().join(".venv").join(bin).join(exe), "").unwrap();
        assert_eq!(default_python(dir.path()), dir.path().join(".venv").join(bin).join(exe));
    }
}
