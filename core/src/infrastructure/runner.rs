//! Command runner abstraction.
//!
//! `CommandRunner` executes one program with an argument vector and returns
//! its stdout. `ProcessRunner` spawns the real process; `MockRunner` records
//! invocations and replays preset responses.

use std::process::{Command, Stdio};
use std::sync::Mutex;

/// Executes a program to completion. `Err` carries stderr or a spawn error.
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[String]) -> Result<String, String>;
}

/// Production runner. No shell is involved, so arguments are never re-split.
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<String, String> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| format!("failed to execute {}: {}", program, e))?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.is_empty() {
                Err(format!("{} exited with {}", program, output.status))
            } else {
                Err(stderr)
            }
        }
    }
}

/// Test double: records `program arg…` lines, pops responses in order and
/// answers `Ok("")` once they run out.
#[derive(Default)]
pub struct MockRunner {
    responses: Mutex<Vec<Result<String, String>>>,
    commands: Mutex<Vec<String>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses(responses: Vec<Result<String, String>>) -> Self {
        let mut reversed = responses;
        reversed.reverse();
        MockRunner {
            responses: Mutex::new(reversed),
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn executed_commands(&self) -> Vec<String> {
        self.commands.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl CommandRunner for MockRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<String, String> {
        let line = std::iter::once(program.to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");
        if let Ok(mut cmds) = self.commands.lock() {
            cmds.push(line);
        }
        match self.responses.lock() {
            Ok(mut r) => r.pop().unwrap_or_else(|| Ok(String::new())),
            Err(_) => Ok(String::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn mock_runner_records_commands() {
        let runner = MockRunner::new();
        runner.run("python3", &args(&["-m", "pip", "show", "nuitka"])).unwrap();
        runner.run("gcc", &args(&["--version"])).unwrap();
        assert_eq!(
            runner.executed_commands(),
            vec!["python3 -m pip show nuitka", "gcc --version"]
        );
    }

    #[test]
    fn mock_runner_returns_responses_in_order() {
        let runner = MockRunner::with_responses(vec![Ok("first".into()), Err("fail".into())]);
        assert_eq!(runner.run("a", &[]).unwrap(), "first");
        assert_eq!(runner.run("b", &[]).unwrap_err(), "fail");
        assert_eq!(runner.run("c", &[]).unwrap(), "");
    }

    #[cfg(unix)]
    #[test]
    fn process_runner_captures_stdout_and_failure() {
        let out = ProcessRunner.run("sh", &args(&["-c", "echo hello"])).unwrap();
        assert_eq!(out.trim(), "hello");
        let err = ProcessRunner.run("sh", &args(&["-c", "echo bad >&2; exit 3"])).unwrap_err();
        assert_eq!(err, "bad");
    }

    #[test]
    fn process_runner_reports_missing_program() {
        let err = ProcessRunner.run("definitely-not-a-real-program-ark", &[]).unwrap_err();
        assert!(err.contains("failed to execute"));
    }
}
