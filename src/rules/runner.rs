//! External check-command execution.
//!
//! `run-validation` actions hand a command string to a [`CommandRunner`].
//! The runner never fails: spawn errors and timeouts come back as
//! [`CommandOutcome`] variants so a single rule cannot crash the engine.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;

/// Default deadline for a validation command.
pub const DEFAULT_VALIDATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of running a check command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Process exited on its own
    Completed { exit_code: i32, stdout: String, stderr: String, duration: Duration },

    /// Deadline passed; the process was killed
    TimedOut { after: Duration },

    /// Process could not be started
    SpawnError(String),
}

impl CommandOutcome {
    /// Whether the command exited with `expected` before the deadline.
    pub fn exited_with(&self, expected: i32) -> bool {
        matches!(self, Self::Completed { exit_code, .. } if *exit_code == expected)
    }
}

/// Runs a check command in a working directory within a deadline.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str, working_dir: &Path, timeout: Duration) -> CommandOutcome;
}

/// Runs commands through the platform shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str, working_dir: &Path, timeout: Duration) -> CommandOutcome {
        let start = Instant::now();
        let (shell, shell_arg) = get_shell();

        let child = Command::new(shell)
            .arg(shell_arg)
            .arg(command)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(command, error = %e, "Failed to spawn validation command");
                return CommandOutcome::SpawnError(e.to_string());
            }
        };

        // Dropping the future on timeout drops the child, which kills it.
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => CommandOutcome::Completed {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                duration: start.elapsed(),
            },
            Ok(Err(e)) => CommandOutcome::SpawnError(e.to_string()),
            Err(_) => {
                tracing::warn!(command, timeout_ms = timeout.as_millis() as u64, "Validation command timed out");
                CommandOutcome::TimedOut { after: start.elapsed() }
            }
        }
    }
}

/// Get the shell and argument for the current platform.
fn get_shell() -> (&'static str, &'static str) {
    if cfg!(target_os = "windows") {
        ("cmd", "/C")
    } else {
        ("sh", "-c")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_output_and_exit_code() {
        let dir = std::env::temp_dir();
        let outcome = ShellRunner.run("echo hello", &dir, Duration::from_secs(10)).await;
        match outcome {
            CommandOutcome::Completed { exit_code, stdout, .. } => {
                assert_eq!(exit_code, 0);
                assert!(stdout.contains("hello"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_zero_exit() {
        let dir = std::env::temp_dir();
        let outcome = ShellRunner.run("exit 3", &dir, Duration::from_secs(10)).await;
        assert!(outcome.exited_with(3));
        assert!(!outcome.exited_with(0));
    }

    #[tokio::test]
    async fn test_timeout_reported_not_raised() {
        let dir = std::env::temp_dir();
        let outcome = ShellRunner.run("sleep 5", &dir, Duration::from_millis(200)).await;
        assert!(matches!(outcome, CommandOutcome::TimedOut { .. }));
    }

    #[tokio::test]
    async fn test_missing_working_dir_is_spawn_error() {
        let outcome = ShellRunner
            .run("true", Path::new("/definitely/not/here"), Duration::from_secs(1))
            .await;
        assert!(matches!(outcome, CommandOutcome::SpawnError(_)));
    }
}
