//! External command execution
//!
//! Everything that shells out (`wg`, `wg-quick`, package managers) goes
//! through [`CommandExecutor`], so callers can substitute a fake in tests.

use crate::error::{Result, WgUtilsError};
use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// A program invocation
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program name or path
    pub program: String,
    /// Arguments, passed without a shell
    pub args: Vec<String>,
    /// Text written to the child's stdin, then stdin is closed
    pub stdin: Option<String>,
}

impl CommandSpec {
    /// Create an invocation of `program` with no arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Feed `input` on stdin
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// `program arg1 arg2` for log and error messages
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// Stdin may carry private keys
impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("stdin", &self.stdin.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if terminated by a signal
    pub status_code: Option<i32>,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            status_code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Whether the command exited with status 0
    pub fn success(&self) -> bool {
        self.status_code == Some(0)
    }

    /// Stdout on success, `Command` error carrying stderr otherwise
    pub fn into_stdout(self, spec: &CommandSpec) -> Result<String> {
        if self.success() {
            return Ok(self.stdout);
        }
        let code = self
            .status_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        Err(WgUtilsError::Command(format!(
            "{} exited with {}: {}",
            spec.command_line(),
            code,
            self.stderr.trim()
        )))
    }
}

/// Capability to run external programs
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run the command to completion and capture its output
    ///
    /// Errors only when the program cannot be started or times out; a
    /// non-zero exit is reported through [`CommandOutput`].
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

/// Runs commands as child processes
#[derive(Debug, Clone, Default)]
pub struct SystemExecutor {
    timeout: Option<Duration>,
}

impl SystemExecutor {
    /// Create an executor without a timeout
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill commands that run longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    async fn spawn_and_wait(spec: &CommandSpec) -> Result<CommandOutput> {
        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                WgUtilsError::Command(format!(
                    "Failed to execute {}: {}",
                    spec.command_line(),
                    e
                ))
            })?;

        if let (Some(input), Some(mut stdin)) = (&spec.stdin, child.stdin.take()) {
            stdin.write_all(input.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        Ok(CommandOutput {
            status_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[async_trait]
impl CommandExecutor for SystemExecutor {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        debug!("Executing command: {}", spec.command_line());

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, Self::spawn_and_wait(spec))
                .await
                .map_err(|_| {
                    WgUtilsError::Command(format!(
                        "{} timed out after {:?}",
                        spec.command_line(),
                        limit
                    ))
                })??,
            None => Self::spawn_and_wait(spec).await?,
        };

        debug!(
            "Command {} finished with {:?}",
            spec.program, output.status_code
        );
        Ok(output)
    }
}
