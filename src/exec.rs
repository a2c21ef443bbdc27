//! External command execution.
//!
//! Probes talk to `kwokctl` and `kubectl` through the [`CommandRunner`] trait
//! so tests can substitute canned output. The real runner bounds every
//! command with a timeout and kills the child when its future is dropped,
//! which is how cancellation reaches a running command.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::error::ProbeError;

/// Captured output of a command that exited successfully
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output, lossily decoded
    pub stdout: String,
    /// Standard error, lossily decoded
    pub stderr: String,
}

impl CommandOutput {
    /// Output with the given stdout and empty stderr
    pub fn stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }
}

/// Trait abstracting external command execution
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` and capture its output.
    ///
    /// A non-zero exit status is reported as [`ProbeError::Invocation`].
    async fn output(&self, program: &str, args: &[String]) -> Result<CommandOutput, ProbeError>;
}

/// Render a command line for logs and error messages
pub fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs commands as child processes of this one
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
}

impl ProcessRunner {
    /// Create a runner that gives up on a command after `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn output(&self, program: &str, args: &[String]) -> Result<CommandOutput, ProbeError> {
        let line = command_line(program, args);
        debug!(command = %line, "running command");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                ProbeError::invocation(format!("{line} timed out after {:?}", self.timeout))
            })?
            .map_err(|e| ProbeError::invocation(format!("failed to execute {line}: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(ProbeError::invocation(format!(
                "{line} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(CommandOutput { stdout, stderr })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn command_line_joins_program_and_args() {
        assert_eq!(
            command_line("kwokctl", &args(&["--name", "e2e", "scale", "node"])),
            "kwokctl --name e2e scale node"
        );
        assert_eq!(command_line("kubectl", &[]), "kubectl");
    }

    #[tokio::test]
    async fn missing_binary_is_invocation_error() {
        let runner = ProcessRunner::new(Duration::from_secs(5));
        let err = runner
            .output("kwok-e2e-definitely-not-installed", &args(&["version"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Invocation { .. }));
        assert!(err.to_string().contains("failed to execute"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_stdout_of_successful_command() {
        let runner = ProcessRunner::new(Duration::from_secs(5));
        let out = runner
            .output("sh", &args(&["-c", "echo kwok-e2e"]))
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "kwok-e2e");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_reports_stderr() {
        let runner = ProcessRunner::new(Duration::from_secs(5));
        let err = runner
            .output("sh", &args(&["-c", "echo boom >&2; exit 3"]))
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("boom"), "{msg}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_command_times_out() {
        let runner = ProcessRunner::new(Duration::from_millis(100));
        let err = runner
            .output("sh", &args(&["-c", "sleep 5"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
