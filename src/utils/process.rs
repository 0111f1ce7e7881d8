//! Subprocess execution with timeouts

use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

/// A program and its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Build a spec from a slice of words, the first being the program
    pub fn from_argv(argv: &[&str]) -> Option<Self> {
        let (program, rest) = argv.split_first()?;
        Some(Self::new(*program).args(rest.iter().copied()))
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured outcome of running a command
#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    pub ok: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub duration: Duration,
}

impl RunOutput {
    /// Output for a command that never produced an exit status
    pub fn spawn_failure(message: impl Into<String>, duration: Duration) -> Self {
        Self {
            ok: false,
            stdout: String::new(),
            stderr: message.into(),
            exit_code: None,
            timed_out: false,
            duration,
        }
    }

    /// Output for a command that exceeded its timeout
    pub fn timeout(timeout: Duration) -> Self {
        Self {
            ok: false,
            stdout: String::new(),
            stderr: format!("Command timed out after {}s", timeout.as_secs()),
            exit_code: None,
            timed_out: true,
            duration: timeout,
        }
    }

    /// The most informative text: stderr if present, stdout otherwise
    pub fn error_text(&self) -> &str {
        if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        }
    }
}

/// Capability to run external commands
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command, killing it when `timeout` elapses.
    ///
    /// `retries` re-runs the command after ordinary failures; a timeout is
    /// never retried.
    async fn run(&self, command: &CommandSpec, timeout: Duration, retries: u32) -> RunOutput;
}

/// Runs commands as real child processes
#[derive(Debug, Default, Clone)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self
    }

    async fn run_once(&self, command: &CommandSpec, timeout: Duration) -> RunOutput {
        let started = Instant::now();

        let child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                return RunOutput::spawn_failure(
                    format!("Failed to start '{}': {e}", command.program),
                    started.elapsed(),
                )
            }
        };

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => RunOutput {
                ok: output.status.success(),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                exit_code: output.status.code(),
                timed_out: false,
                duration: started.elapsed(),
            },
            Ok(Err(e)) => RunOutput::spawn_failure(
                format!("Failed to wait for '{}': {e}", command.program),
                started.elapsed(),
            ),
            Err(_) => RunOutput::timeout(timeout),
        }
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, command: &CommandSpec, timeout: Duration, retries: u32) -> RunOutput {
        let mut attempt = 0;
        loop {
            debug!("Running '{}' (attempt {})", command, attempt + 1);
            let output = self.run_once(command, timeout).await;

            if output.ok || output.timed_out || attempt >= retries {
                return output;
            }

            attempt += 1;
            tokio::time::sleep(Duration::from_millis(250 * u64::from(attempt))).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_spec_display() {
        let spec = CommandSpec::new("pip").args(["install", "requests"]);
        assert_eq!(spec.to_string(), "pip install requests");
    }

    #[test]
    fn test_from_argv() {
        let spec = CommandSpec::from_argv(&["apt-cache", "search", "vim"]).unwrap();
        assert_eq!(spec.program, "apt-cache");
        assert_eq!(spec.args, vec!["search", "vim"]);
        assert!(CommandSpec::from_argv(&[]).is_none());
    }

    #[test]
    fn test_error_text_prefers_stderr() {
        let output = RunOutput {
            stdout: "out".to_string(),
            stderr: "err".to_string(),
            ..Default::default()
        };
        assert_eq!(output.error_text(), "err");

        let output = RunOutput {
            stdout: "out".to_string(),
            ..Default::default()
        };
        assert_eq!(output.error_text(), "out");
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_failure() {
        let runner = SystemCommandRunner::new();
        let spec = CommandSpec::new("crossfire-no-such-program-xyz");
        let output = runner.run(&spec, Duration::from_secs(5), 0).await;
        assert!(!output.ok);
        assert!(!output.timed_out);
        assert!(output.exit_code.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_is_classified() {
        let runner = SystemCommandRunner::new();
        let spec = CommandSpec::new("sleep").arg("5");
        let output = runner.run(&spec, Duration::from_millis(100), 2).await;
        assert!(output.timed_out);
        assert!(!output.ok);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_command_captures_stdout() {
        let runner = SystemCommandRunner::new();
        let spec = CommandSpec::new("echo").arg("hello");
        let output = runner.run(&spec, Duration::from_secs(5), 0).await;
        assert!(output.ok);
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.exit_code, Some(0));
    }
}
