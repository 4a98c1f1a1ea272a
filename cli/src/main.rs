//! Ark CLI: builds script programs into executables from the terminal.
//!
//! # Usage
//!
//! ```text
//! ark build --engine pyinstaller --onefile
//! ark build src/main.py tools/cli.py --engine nuitka --jobs 2 --yes
//! ark engines
//! ark auto-args --engine pyinstaller --engine nuitka
//! ```

mod host;

use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ark_core::data::project_config::load_project_config;
use ark_core::data::scanner::{scan_workspace, select_files};
use ark_core::data::settings::load_for_workspace;
use ark_core::engine::builtin::register_builtin_engines;
use ark_core::logging::init_tracing;
use ark_core::{BuildOptions, EngineRegistry, Scheduler, Settings};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info, warn};

use host::ConsoleHost;

/// Workspace-relative directory scanned for engine manifests.
const ENGINES_DIR: &str = ".pycompiler/engines";

/// Longest the build loop waits before rechecking for an interrupt.
const INTERRUPT_POLL: Duration = Duration::from_millis(100);

/// Exit status after an interrupted build.
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Debug, Parser)]
#[command(name = "ark", version, about = "Build script programs into executables")]
struct Cli {
    /// Project root; defaults to the current directory.
    #[arg(long, short = 'w', global = true)]
    workspace: Option<PathBuf>,

    /// Extra directory to scan for engine manifests.
    #[arg(long, global = true)]
    engines_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build the selected files (or every candidate in the workspace).
    Build(BuildArgs),
    /// List the registered engines.
    Engines,
    /// Show the auto-arguments each engine would receive.
    AutoArgs(AutoArgsCli),
}

#[derive(Debug, Args)]
struct BuildArgs {
    /// Files to build; empty means scan the workspace.
    files: Vec<PathBuf>,

    #[arg(long, short = 'e', default_value = "pyinstaller")]
    engine: String,

    /// Maximum concurrent builds.
    #[arg(long, short = 'j')]
    jobs: Option<usize>,

    /// Per-job timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,

    #[arg(long)]
    onefile: bool,

    #[arg(long)]
    standalone: bool,

    #[arg(long)]
    windowed: bool,

    #[arg(long)]
    clean: bool,

    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    icon: Option<PathBuf>,

    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Passed verbatim to the engine; repeatable.
    #[arg(long = "extra-arg", allow_hyphen_values = true)]
    extra_args: Vec<String>,

    /// Answer yes to every prompt.
    #[arg(long, short = 'y')]
    yes: bool,

    /// Hide child output lines.
    #[arg(long, short = 'q')]
    quiet: bool,
}

#[derive(Debug, Args)]
struct AutoArgsCli {
    /// Engines to compute for; defaults to all registered engines.
    #[arg(long = "engine", short = 'e')]
    engines: Vec<String>,

    /// Write the diagnostics report into the workspace.
    #[arg(long)]
    write_report: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing("info");

    let workspace = match resolve_workspace(cli.workspace.as_deref()) {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("ark: {}", e);
            process::exit(2);
        }
    };
    let settings = load_for_workspace(&workspace);
    let registry = Arc::new(load_registry(&workspace, cli.engines_dir.as_deref()));

    let code = match cli.command {
        Command::Build(args) => run_build(&workspace, settings, registry, args),
        Command::Engines => run_engines(&registry),
        Command::AutoArgs(args) => run_auto_args(&workspace, settings, &registry, args),
    };
    process::exit(code);
}

fn resolve_workspace(arg: Option<&Path>) -> Result<PathBuf, String> {
    let dir = match arg {
        Some(p) => p.to_path_buf(),
        None => std::env::current_dir().map_err(|e| format!("no current directory: {}", e))?,
    };
    if !dir.is_dir() {
        return Err(format!("workspace {} is not a directory", dir.display()));
    }
    Ok(dir.canonicalize().unwrap_or(dir))
}

/// Built-in engines, then manifests from the workspace and `--engines-dir`.
fn load_registry(workspace: &Path, extra: Option<&Path>) -> EngineRegistry {
    let registry = EngineRegistry::new();
    register_builtin_engines(&registry);
    let dirs = std::iter::once(workspace.join(ENGINES_DIR)).chain(extra.map(Path::to_path_buf));
    for dir in dirs {
        if dir.is_dir() {
            let added = registry.discover(&dir);
            debug!(dir = %dir.display(), count = added.len(), "discovered engines");
        }
    }
    registry
}

fn build_options(args: &BuildArgs) -> BuildOptions {
    BuildOptions {
        onefile: args.onefile,
        standalone: args.standalone,
        windowed: args.windowed,
        noconfirm: true,
        clean: args.clean,
        show_progress: true,
        name: args.name.clone(),
        icon: args.icon.clone(),
        output_dir: args.output_dir.clone(),
        extra_args: args.extra_args.clone(),
        ..BuildOptions::default()
    }
}

fn run_build(workspace: &Path, mut settings: Settings, registry: Arc<EngineRegistry>, args: BuildArgs) -> i32 {
    if let Some(n) = args.jobs {
        settings.max_parallel = n;
    }
    if let Some(secs) = args.timeout {
        settings.process_timeout_secs = secs;
    }

    let project = load_project_config(workspace);
    let candidates = scan_workspace(workspace, &project);
    let selected: Vec<PathBuf> = args
        .files
        .iter()
        .map(|f| if f.is_absolute() { f.clone() } else { workspace.join(f) })
        .collect();
    let selection = select_files(workspace, &candidates, &selected, &project);
    for (reason, count) in &selection.excluded {
        info!(?reason, count, "excluded files");
    }
    if selection.files.is_empty() {
        eprintln!("ark: nothing to build");
        return 1;
    }

    let host = Arc::new(ConsoleHost::new(args.yes, args.quiet));
    let mut scheduler = Scheduler::new(workspace, settings, registry, host.clone());
    if !scheduler.set_engine(&args.engine) {
        eprintln!("ark: unknown engine '{}'", args.engine);
        return 2;
    }
    scheduler.set_options(build_options(&args));
    scheduler.set_candidates(candidates);
    for file in selection.files {
        scheduler.enqueue(file);
    }

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        warn!(error = %e, "Ctrl-C handler not installed");
    }
    let canceled = drive(&mut scheduler, &interrupted);

    let sweep = scheduler.shutdown();
    if !sweep.survivors.is_empty() {
        eprintln!("ark: {} process(es) could not be stopped", sweep.survivors.len());
    }
    if canceled {
        EXIT_INTERRUPTED
    } else if host.failures() > 0 {
        1
    } else {
        0
    }
}

/// Run the scheduler until idle. When `interrupted` is raised, cancel every
/// build and return true.
fn drive(scheduler: &mut Scheduler, interrupted: &AtomicBool) -> bool {
    scheduler.try_start_processes();
    while !scheduler.is_idle() {
        if interrupted.swap(false, Ordering::SeqCst) {
            let pids: Vec<String> = scheduler
                .running_pids()
                .iter()
                .map(|(_, pid)| pid.to_string())
                .collect();
            eprintln!("ark: interrupted; canceling builds (pids {})", pids.join(", "));
            scheduler.cancel_all_compilations();
            return true;
        }
        scheduler.pump(INTERRUPT_POLL);
    }
    false
}

fn run_engines(registry: &EngineRegistry) -> i32 {
    for id in registry.available() {
        if let Some(engine) = registry.instance(&id) {
            println!("{:<14} {} ({})", id, engine.name(), engine.version());
        }
    }
    0
}

fn run_auto_args(workspace: &Path, mut settings: Settings, registry: &EngineRegistry, args: AutoArgsCli) -> i32 {
    if args.write_report {
        settings.auto_report = true;
    }
    let ids = if args.engines.is_empty() { registry.available() } else { args.engines };
    let project = load_project_config(workspace);
    let files = scan_workspace(workspace, &project);
    let auto = ark_core::autoargs::AutoArgs::from_settings(&settings);
    let (report, warnings) = auto.compute_for_all(registry, &ids, workspace, &files);
    for w in &warnings {
        eprintln!("warning: {}", w);
    }
    match serde_json::to_string_pretty(&report) {
        Ok(text) => {
            println!("{}", text);
            0
        }
        Err(e) => {
            eprintln!("ark: {}", e);
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn build_args_parse() {
        let cli = Cli::try_parse_from([
            "ark", "build", "main.py", "--engine", "nuitka", "-j", "2", "--onefile",
            "--extra-arg", "--lto=no", "--yes",
        ])
        .unwrap();
        match cli.command {
            Command::Build(args) => {
                assert_eq!(args.files, vec![PathBuf::from("main.py")]);
                assert_eq!(args.engine, "nuitka");
                assert_eq!(args.jobs, Some(2));
                assert_eq!(args.extra_args, vec!["--lto=no".to_string()]);
                let opts = build_options(&args);
                assert!(opts.onefile && opts.noconfirm);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn workspace_must_exist() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(resolve_workspace(Some(dir.path())).is_ok());
        assert!(resolve_workspace(Some(&dir.path().join("missing"))).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn interrupt_cancels_running_and_queued_builds() {
        use ark_core::error::EngineError;
        use ark_core::types::job::JobPhase;
        use ark_core::BuildContext;

        struct Sleeper;

        impl ark_core::Engine for Sleeper {
            fn id(&self) -> &str {
                "sleeper"
            }
            fn name(&self) -> &str {
                "Sleeper"
            }
            fn build_command(&self, _ctx: &BuildContext<'_>, _file: &Path) -> Result<Vec<String>, EngineError> {
                Ok(vec!["sh".into(), "-c".into(), "sleep 30".into()])
            }
        }

        let dir = tempfile::TempDir::new().unwrap();
        let registry = Arc::new(EngineRegistry::new());
        registry.register_instance(Arc::new(Sleeper)).unwrap();
        let settings = Settings {
            max_parallel: 1,
            cancel_kill_timeout_ms: 1000,
            ..Settings::default()
        };
        let host = Arc::new(ConsoleHost::new(true, true));
        let mut scheduler = Scheduler::new(dir.path(), settings, registry, host);
        assert!(scheduler.set_engine("sleeper"));
        scheduler.enqueue(dir.path().join("a.py"));
        scheduler.enqueue(dir.path().join("b.py"));

        let interrupted = AtomicBool::new(true);
        assert!(drive(&mut scheduler, &interrupted));
        assert!(scheduler.is_idle());
        let phases: Vec<JobPhase> = scheduler.history().iter().map(|r| r.phase).collect();
        assert_eq!(phases, vec![JobPhase::Canceled]);
        assert!(!dir.path().join(".pycompiler/cancel/sleeper_a.py.cancel").exists());
    }

    #[test]
    fn registry_has_builtin_engines() {
        let dir = tempfile::TempDir::new().unwrap();
        let registry = load_registry(dir.path(), None);
        assert_eq!(registry.available(), vec!["pyinstaller", "nuitka", "cx_freeze"]);
    }
}
