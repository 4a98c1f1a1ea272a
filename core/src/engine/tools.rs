//! Declarative tool requirements and the generic "ensure installed" routine.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::infrastructure::runner::CommandRunner;
use crate::infrastructure::which::can_resolve_command;

/// Tools an engine needs, grouped by how they get installed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequiredTools {
    /// Installed into the interpreter with pip.
    pub python: Vec<String>,
    /// Must be provided by the operating system.
    pub system: Vec<String>,
}

impl RequiredTools {
    pub fn is_empty(&self) -> bool {
        self.python.is_empty() && self.system.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallRequest {
    /// Installation runs in the background; retry the build afterwards.
    Started,
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolStatus {
    Ready,
    InstallStarted,
    Unavailable(String),
}

pub trait ToolProvisioner: Send + Sync {
    fn is_python_tool_installed(&self, python: &Path, tool: &str) -> bool;

    fn is_system_tool_available(&self, tool: &str) -> bool;

    fn request_install(
        &self,
        python: &Path,
        python_missing: &[String],
        system_missing: &[String],
    ) -> InstallRequest;
}

/// Wraps a provisioner with the once-per-session install ledger.
pub struct ToolGate {
    provisioner: Arc<dyn ToolProvisioner>,
    attempted: Mutex<HashSet<String>>,
    /// `engine|python` pairs already probed as ready this session.
    ready: Mutex<HashSet<String>>,
}

impl ToolGate {
    pub fn new(provisioner: Arc<dyn ToolProvisioner>) -> Self {
        ToolGate {
            provisioner,
            attempted: Mutex::new(HashSet::new()),
            ready: Mutex::new(HashSet::new()),
        }
    }

    pub fn provisioner(&self) -> &dyn ToolProvisioner {
        self.provisioner.as_ref()
    }

    /// Check `required` and, if something is missing, request one automatic
    /// install per (engine, missing set) for the whole session.
    ///
    /// Probing runs external commands on the caller's thread. A `Ready`
    /// result is remembered, so each engine and interpreter pair is probed
    /// until it first passes and never again.
    pub fn ensure_installed(
        &self,
        engine_id: &str,
        required: &RequiredTools,
        python: &Path,
        log: &dyn Fn(&str),
    ) -> ToolStatus {
        let ready_key = format!("{}|{}", engine_id, python.display());
        if self.ready.lock().map(|r| r.contains(&ready_key)).unwrap_or(false) {
            return ToolStatus::Ready;
        }
        let python_missing: Vec<String> = required
            .python
            .iter()
            .filter(|t| !self.provisioner.is_python_tool_installed(python, t))
            .cloned()
            .collect();
        let system_missing: Vec<String> = required
            .system
            .iter()
            .filter(|t| !self.provisioner.is_system_tool_available(t))
            .cloned()
            .collect();
        if python_missing.is_empty() && system_missing.is_empty() {
            if let Ok(mut r) = self.ready.lock() {
                r.insert(ready_key);
            }
            return ToolStatus::Ready;
        }

        let mut all: Vec<&String> = python_missing.iter().chain(system_missing.iter()).collect();
        all.sort();
        let key = format!(
            "{}:{}",
            engine_id,
            all.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(",")
        );
        let first_attempt = self
            .attempted
            .lock()
            .map(|mut set| set.insert(key))
            .unwrap_or(false);
        let listing = all.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ");
        if !first_attempt {
            let reason = format!("missing tools for {}: {} (install already attempted)", engine_id, listing);
            log(&reason);
            return ToolStatus::Unavailable(reason);
        }

        log(&format!("Missing tools for {}: {}", engine_id, listing));
        match self.provisioner.request_install(python, &python_missing, &system_missing) {
            InstallRequest::Started => {
                log("Installing in the background; start the build again once it finishes.");
                ToolStatus::InstallStarted
            }
            InstallRequest::Unavailable(reason) => {
                log(&reason);
                ToolStatus::Unavailable(reason)
            }
        }
    }
}

/// Probes with `python -m pip show` and `PATH`, installs with `python -m pip install`.
pub struct CommandProvisioner {
    runner: Arc<dyn CommandRunner>,
    background: bool,
}

impl CommandProvisioner {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        CommandProvisioner { runner, background: true }
    }

    /// Run installs on the calling thread.
    pub fn foreground(mut self) -> Self {
        self.background = false;
        self
    }

    fn pip_install(runner: &dyn CommandRunner, python: &Path, packages: &[String]) {
        let mut args = vec!["-m".to_string(), "pip".to_string(), "install".to_string()];
        args.extend(packages.iter().cloned());
        match runner.run(&python.to_string_lossy(), &args) {
            Ok(_) => info!(packages = ?packages, "pip install finished"),
            Err(e) => warn!(packages = ?packages, error = %e, "pip install failed"),
        }
    }
}

impl ToolProvisioner for CommandProvisioner {
    fn is_python_tool_installed(&self, python: &Path, tool: &str) -> bool {
        let args = vec!["-m".to_string(), "pip".to_string(), "show".to_string(), tool.to_string()];
        self.runner.run(&python.to_string_lossy(), &args).is_ok()
    }

    fn is_system_tool_available(&self, tool: &str) -> bool {
        can_resolve_command(tool)
    }

    fn request_install(
        &self,
        python: &Path,
        python_missing: &[String],
        system_missing: &[String],
    ) -> InstallRequest {
        if !system_missing.is_empty() {
            return InstallRequest::Unavailable(format!(
                "install {} with the system package manager",
                system_missing.join(", ")
            ));
        }
        if python_missing.is_empty() {
            return InstallRequest::Unavailable("nothing to install".into());
        }
        if self.background {
            let runner = self.runner.clone();
            let python: PathBuf = python.to_path_buf();
            let packages = python_missing.to_vec();
            std::thread::spawn(move || Self::pip_install(runner.as_ref(), &python, &packages));
        } else {
            Self::pip_install(self.runner.as_ref(), python, python_missing);
        }
        InstallRequest::Started
    }
}


#[cfg(test)]
mod tests {
    use super::testing::StaticProvisioner;
    use super::*;
    use crate::infrastructure::runner::MockRunner;

    fn tools(py: &[&str], sys: &[&str]) -> RequiredTools {
        RequiredTools {
            python: py.iter().map(|s| s.to_string()).collect(),
            system: sys.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn ready_when_everything_installed() {
        let gate = ToolGate::new(Arc::new(StaticProvisioner::with(&["nuitka", "gcc"])));
        let status = gate.ensure_installed("nuitka", &tools(&["nuitka"], &["gcc"]), Path::new("python3"), &|_| {});
        assert_eq!(status, ToolStatus::Ready);
    }

    #[test]
    fn install_requested_once_per_session() {
        let prov = Arc::new(StaticProvisioner::default());
        let gate = ToolGate::new(prov.clone());
        let req = tools(&["pyinstaller"], &[]);
        let first = gate.ensure_installed("pyinstaller", &req, Path::new("python3"), &|_| {});
        let second = gate.ensure_installed("pyinstaller", &req, Path::new("python3"), &|_| {});
        assert_eq!(first, ToolStatus::InstallStarted);
        assert!(matches!(second, ToolStatus::Unavailable(_)));
        assert_eq!(prov.requests.lock().unwrap().len(), 1);
    }

    #[test]
    fn command_provisioner_probes_and_installs() {
        let runner = Arc::new(MockRunner::with_responses(vec![Err("not found".into()), Ok(String::new())]));
        let prov = CommandProvisioner::new(runner.clone()).foreground();
        assert!(!prov.is_python_tool_installed(Path::new("py"), "nuitka"));
        let req = prov.request_install(Path::new("py"), &["nuitka".to_string()], &[]);
        assert_eq!(req, InstallRequest::Started);
        assert_eq!(
            runner.executed_commands(),
            vec!["py -m pip show nuitka", "py -m pip install nuitka"]
        );
    }

    #[test]
    fn ready_engines_are_probed_once() {
        let runner = Arc::new(MockRunner::new());
        let gate = ToolGate::new(Arc::new(CommandProvisioner::new(runner.clone()).foreground()));
        let req = tools(&["pyinstaller"], &[]);
        for _ in 0..3 {
            let status = gate.ensure_installed("pyinstaller", &req, Path::new("py"), &|_| {});
            assert_eq!(status, ToolStatus::Ready);
        }
        assert_eq!(runner.executed_commands(), vec!["py -m pip show pyinstaller"]);
    }

    #[test]
    fn system_tools_cannot_be_auto_installed() {
        let prov = CommandProvisioner::new(Arc::new(MockRunner::new()));
        let req = prov.request_install(Path::new("py"), &[], &["gcc".to_string()]);
        assert!(matches!(req, InstallRequest::Unavailable(msg) if msg.contains("gcc")));
    }
}
