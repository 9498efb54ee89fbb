//! Shell command execution inside a workspace.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use nix::sys::signal::Signal;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::process::signal_group;

/// Exit code reported when a command is killed for exceeding its timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Captured outcome of a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    /// True iff `exit_code == 0`.
    pub success: bool,
}

impl CommandResult {
    fn from_parts(stdout: String, stderr: String, exit_code: i32) -> Self {
        Self {
            stdout,
            stderr,
            exit_code,
            success: exit_code == 0,
        }
    }

    /// A successful result with no output.
    pub fn empty_success() -> Self {
        Self::from_parts(String::new(), String::new(), 0)
    }

    /// A failure that happened before the command could run.
    pub fn spawn_failure(message: impl Into<String>) -> Self {
        Self::from_parts(String::new(), message.into(), 1)
    }
}

/// Runs shell commands and buffers their output until exit.
///
/// Failing to spawn is reported as a result with exit code 1, never as an
/// `Err`. Without a timeout a hanging command blocks the caller indefinitely.
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    timeout: Option<Duration>,
}

impl CommandRunner {
    /// Creates a runner with no timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the timeout after which a command's process group is killed.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs `command` through `sh -c` in `cwd`, inheriting the environment.
    pub async fn run(&self, command: &str, cwd: &Path) -> CommandResult {
        tracing::debug!(command = %command, cwd = ?cwd, "running command");

        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(command = %command, error = %e, "failed to spawn command");
                return CommandResult::spawn_failure(format!("failed to spawn command: {}", e));
            }
        };
        let pid = child.id();

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(output) => output,
                Err(_) => {
                    if let Some(pid) = pid {
                        signal_group(pid, Signal::SIGKILL);
                    }
                    tracing::warn!(command = %command, timeout = ?limit, "command timed out");
                    return CommandResult::from_parts(
                        String::new(),
                        format!("command timed out after {:?}", limit),
                        TIMEOUT_EXIT_CODE,
                    );
                }
            },
            None => child.wait_with_output().await,
        };

        match output {
            Ok(output) => {
                let result = CommandResult::from_parts(
                    String::from_utf8_lossy(&output.stdout).to_string(),
                    String::from_utf8_lossy(&output.stderr).to_string(),
                    exit_code(output.status),
                );
                tracing::debug!(
                    command = %command,
                    exit_code = result.exit_code,
                    "command finished"
                );
                result
            }
            Err(e) => CommandResult::spawn_failure(format!("failed to wait for command: {}", e)),
        }
    }
}

/// Maps an exit status to a shell-style code (128 + signal when killed).
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    match status.code() {
        Some(code) => code,
        None => status.signal().map(|s| 128 + s).unwrap_or(1),
    }
}

/// Quotes `s` for safe interpolation into a `sh -c` string.
pub fn shell_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn captures_stdout_and_stderr() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let runner = CommandRunner::new();

        let result = runner.run("echo out; echo err >&2", dir.path()).await;

        assert!(result.success);
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.stderr, "err\n");
    }

    #[tokio::test]
    async fn nonzero_exit_is_not_success() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let result = CommandRunner::new().run("exit 1", dir.path()).await;

        assert_eq!(result.exit_code, 1);
        assert!(!result.success);
    }

    #[tokio::test]
    async fn runs_in_given_directory() {
        let dir = TempDir::new().expect("failed to create temp dir");
        std::fs::write(dir.path().join("marker.txt"), "here").expect("failed to write file");

        let result = CommandRunner::new().run("cat marker.txt", dir.path()).await;
        assert_eq!(result.stdout, "here");
    }

    #[tokio::test]
    async fn spawn_failure_is_reported_as_result() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let missing = dir.path().join("does-not-exist");

        let result = CommandRunner::new().run("true", &missing).await;

        assert_eq!(result.exit_code, 1);
        assert!(!result.success);
        assert!(result.stderr.contains("failed to spawn"));
    }

    #[tokio::test]
    async fn timeout_kills_command() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let runner = CommandRunner::new().with_timeout(Some(Duration::from_millis(200)));

        let started = std::time::Instant::now();
        let result = runner.run("sleep 30", dir.path()).await;

        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(result.exit_code, TIMEOUT_EXIT_CODE);
        assert!(result.stderr.contains("timed out"));
    }

    #[test]
    fn shell_escape_quotes_single_quotes() {
        assert_eq!(shell_escape("react"), "'react'");
        assert_eq!(shell_escape("it's"), "'it'\\''s'");
    }

    #[test]
    fn command_result_serializes_camel_case() {
        let json = serde_json::to_string(&CommandResult::empty_success()).unwrap();
        assert!(json.contains("\"exitCode\":0"));
        assert!(json.contains("\"success\":true"));
    }
}
