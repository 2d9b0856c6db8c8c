// SPDX-License-Identifier: GPL-3.0-only

//! External command execution with timeouts
//!
//! Every invocation of the camera-control tool (and the helpers used for USB
//! remediation) goes through a [`CommandRunner`], so the DSLR backend can be
//! driven by a scripted runner in tests.

use crate::constants::gphoto::CLAIM_CONFLICT_MARKER;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Exit status and captured streams of a finished command
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Non-zero exit caused by another process holding the USB device
    pub fn is_claim_conflict(&self) -> bool {
        !self.success() && self.stderr.to_lowercase().contains(CLAIM_CONFLICT_MARKER)
    }

    /// Short description of a failure for logs and errors
    pub fn failure_summary(&self) -> String {
        let stderr = self.stderr.trim();
        let code = self
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        if stderr.is_empty() {
            format!("exit status {}", code)
        } else {
            format!("exit status {}: {}", code, stderr)
        }
    }
}

/// Errors launching or waiting for a command
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessError {
    /// Executable is not installed / not on PATH
    #[error("program not found: {0}")]
    NotFound(String),
    /// Command did not finish in time and was killed
    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },
    #[error("I/O error: {0}")]
    Io(String),
}

/// Runs an external program to completion
pub trait CommandRunner: Send + Sync {
    fn run(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<CommandOutput, ProcessError>;
}

/// Shared runner handle
pub type SharedRunner = Arc<dyn CommandRunner>;

/// Runner backed by real child processes
///
/// Owns a small tokio runtime so that timeouts kill the child instead of
/// leaving it behind. Callers use the blocking `run` from plain threads.
pub struct SystemCommandRunner {
    runtime: tokio::runtime::Runtime,
}

impl SystemCommandRunner {
    pub fn new() -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("photobox-process")
            .enable_all()
            .build()?;
        Ok(Self { runtime })
    }

    /// Convenience constructor returning the shared handle
    pub fn shared() -> std::io::Result<SharedRunner> {
        Ok(Arc::new(Self::new()?))
    }
}

impl CommandRunner for SystemCommandRunner {
    fn run(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<CommandOutput, ProcessError> {
        debug!(program, ?args, ?timeout, "Running command");

        let mut command = tokio::process::Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        self.runtime.block_on(async {
            let child = command.spawn().map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ProcessError::NotFound(program.to_string())
                } else {
                    ProcessError::Io(e.to_string())
                }
            })?;

            // Dropping the future on timeout drops the child, which kills it
            match tokio::time::timeout(timeout, child.wait_with_output()).await {
                Ok(Ok(output)) => Ok(CommandOutput {
                    exit_code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                }),
                Ok(Err(e)) => Err(ProcessError::Io(e.to_string())),
                Err(_) => Err(ProcessError::Timeout {
                    program: program.to_string(),
                    timeout,
                }),
            }
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_conflict_detection() {
        let out = CommandOutput::failed(
            1,
            "*** Error ***\nCould not claim the USB device\n",
        );
        assert!(out.is_claim_conflict());

        // Marker on a successful run is not a conflict
        let mut ok = CommandOutput::ok("");
        ok.stderr = "could not claim".into();
        assert!(!ok.is_claim_conflict());

        assert!(!CommandOutput::failed(1, "No camera found").is_claim_conflict());
    }

    #[test]
    fn test_failure_summary() {
        assert_eq!(
            CommandOutput::failed(2, "  boom \n").failure_summary(),
            "exit status 2: boom"
        );
        assert_eq!(CommandOutput::failed(1, "").failure_summary(), "exit status 1");
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_captures_output() {
        let runner = SystemCommandRunner::new().unwrap();
        let out = runner
            .run("sh", &["-c", "echo hello; echo oops >&2; exit 3"], Duration::from_secs(5))
            .unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_timeout() {
        let runner = SystemCommandRunner::new().unwrap();
        let err = runner
            .run("sleep", &["5"], Duration::from_millis(100))
            .unwrap_err();
        assert!(matches!(err, ProcessError::Timeout { .. }));
    }

    #[test]
    fn test_system_runner_missing_program() {
        let runner = SystemCommandRunner::new().unwrap();
        let err = runner
            .run("photobox-no-such-tool", &["--version"], Duration::from_secs(1))
            .unwrap_err();
        assert_eq!(err, ProcessError::NotFound("photobox-no-such-tool".into()));
    }
}
