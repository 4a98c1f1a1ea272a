//! Process table for Windows, driven through `powershell`, `tasklist` and
//! `taskkill`.

use std::sync::Arc;

use crate::error::TreeError;
use crate::infrastructure::runner::CommandRunner;
use crate::process::ProcessTree;

pub struct WindowsTree {
    runner: Arc<dyn CommandRunner>,
}

impl WindowsTree {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        WindowsTree { runner }
    }

    fn taskkill(&self, pid: u32, force: bool) -> Result<(), TreeError> {
        if pid == 0 {
            return Err(TreeError::NotFound(pid));
        }
        let mut args = vec!["/PID".to_string(), pid.to_string()];
        if force {
            args.push("/F".to_string());
        }
        self.runner
            .run("taskkill", &args)
            .map(|_| ())
            .map_err(|msg| classify(pid, &msg))
    }
}

fn classify(pid: u32, message: &str) -> TreeError {
    let lower = message.to_lowercase();
    if lower.contains("not found") || lower.contains("no running instance") {
        TreeError::NotFound(pid)
    } else if lower.contains("access is denied") {
        TreeError::PermissionDenied(pid)
    } else {
        TreeError::Table(message.trim().to_string())
    }
}

impl ProcessTree for WindowsTree {
    fn children_of(&self, pid: u32) -> Result<Vec<u32>, TreeError> {
        let query = format!(
            "Get-CimInstance Win32_Process -Filter 'ParentProcessId={}' | ForEach-Object {{ $_.ProcessId }}",
            pid
        );
        let args = vec!["-NoProfile".to_string(), "-Command".to_string(), query];
        let out = self.runner.run("powershell", &args).map_err(TreeError::Table)?;
        let mut children: Vec<u32> = out
            .lines()
            .filter_map(|l| l.trim().parse().ok())
            .filter(|child| *child != pid)
            .collect();
        children.sort_unstable();
        Ok(children)
    }

    fn is_alive(&self, pid: u32) -> bool {
        let args = vec![
            "/FI".to_string(),
            format!("PID eq {}", pid),
            "/NH".to_string(),
            "/FO".to_string(),
            "CSV".to_string(),
        ];
        match self.runner.run("tasklist", &args) {
            Ok(out) => out.contains(&format!("\"{}\"", pid)),
            Err(_) => false,
        }
    }

    fn terminate(&self, pid: u32) -> Result<(), TreeError> {
        self.taskkill(pid, false)
    }

    fn kill(&self, pid: u32) -> Result<(), TreeError> {
        self.taskkill(pid, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::runner::MockRunner;

    #[test]
    fn children_parsed_from_powershell() {
        let runner = Arc::new(MockRunner::with_responses(vec![Ok("4120\r\n\r\n3988\r\n".into())]));
        let tree = WindowsTree::new(runner.clone());
        assert_eq!(tree.children_of(77).unwrap(), vec![3988, 4120]);
        assert!(runner.executed_commands()[0].contains("ParentProcessId=77"));
    }

    #[test]
    fn alive_checks_csv_row() {
        let runner = Arc::new(MockRunner::with_responses(vec![
            Ok("\"python.exe\",\"512\",\"Console\",\"1\",\"10,000 K\"\r\n".into()),
            Ok("INFO: No tasks are running which match the specified criteria.\r\n".into()),
        ]));
        let tree = WindowsTree::new(runner);
        assert!(tree.is_alive(512));
        assert!(!tree.is_alive(512));
    }

    #[test]
    fn taskkill_errors_are_classified() {
        let runner = Arc::new(MockRunner::with_responses(vec![
            Err("ERROR: The process \"9\" not found.".into()),
            Err("ERROR: Access is denied.".into()),
        ]));
        let tree = WindowsTree::new(runner.clone());
        assert!(matches!(tree.terminate(9), Err(TreeError::NotFound(9))));
        assert!(matches!(tree.kill(9), Err(TreeError::PermissionDenied(9))));
        assert_eq!(
            runner.executed_commands(),
            vec!["taskkill /PID 9", "taskkill /PID 9 /F"]
        );
    }
}
