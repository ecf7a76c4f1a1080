//! External command execution.
//!
//! Extractors never spawn processes directly; they go through a
//! `CommandRunner` so that cycles can be driven by scripted output in tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::error::RunError;

/// Runs a shell command line and returns its stdout.
///
/// Implementations must enforce `timeout`, must not retry, and must report
/// blank output as `RunError::EmptyOutput`.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str, timeout: Duration) -> Result<String, RunError>;
}

/// Runs commands through `sh -c`, so pipelines and redirections work.
///
/// On Unix the shell leads its own process group. When the deadline passes,
/// or the run is cancelled, the whole group is killed, so every stage of a
/// pipeline goes with it. Processes that move to another group are not
/// tracked.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: PathBuf,
}

impl ShellRunner {
    pub fn new() -> Self {
        Self::with_shell("sh")
    }

    pub fn with_shell(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str, timeout: Duration) -> Result<String, RunError> {
        tracing::trace!(command, ?timeout, "Running command");

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn()?;
        let group = ProcessGroupGuard::new(child.id());

        // Dropping the wait future kills the shell; the guard takes the rest of
        // the group.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                tracing::debug!(command, ?timeout, "Command timed out, killing its process group");
                return Err(RunError::Timeout(timeout));
            }
        };
        group.disarm();

        if !output.status.success() {
            return Err(RunError::ExecutionFailed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if stdout.trim().is_empty() {
            return Err(RunError::EmptyOutput);
        }
        Ok(stdout)
    }
}

/// Kills a process group when dropped, unless disarmed after the group leader
/// exited on its own.
struct ProcessGroupGuard {
    pgid: Option<u32>,
}

impl ProcessGroupGuard {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }

    fn disarm(mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_process_group(pgid);
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    // kill(0, ..) would signal our own group.
    let pgid = match libc::pid_t::try_from(pgid) {
        Ok(pgid) if pgid > 0 => pgid,
        _ => return,
    };
    let ret = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if ret != 0 {
        // ESRCH: every member already exited.
        tracing::trace!(
            pgid,
            error = %std::io::Error::last_os_error(),
            "Failed to kill process group"
        );
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}

/// Canned reply for a `StaticRunner` command.
#[derive(Debug, Clone)]
pub enum Scripted {
    Output(String),
    /// Reply with the output after sleeping, so deadlines can be exercised.
    Delayed(Duration, String),
    Exit(i32),
    Timeout,
    Empty,
    SpawnFailure,
}

/// Replays scripted replies keyed by the exact command line and records every
/// invocation. Commands without a script fail with exit status 127.
#[derive(Default)]
pub struct StaticRunner {
    scripts: HashMap<String, Scripted>,
    calls: Mutex<Vec<String>>,
}

impl StaticRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, command: impl Into<String>, reply: Scripted) -> Self {
        self.scripts.insert(command.into(), reply);
        self
    }

    pub fn output(self, command: impl Into<String>, stdout: impl Into<String>) -> Self {
        self.reply(command, Scripted::Output(stdout.into()))
    }

    /// Every command run so far, in invocation order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl CommandRunner for StaticRunner {
    async fn run(&self, command: &str, timeout: Duration) -> Result<String, RunError> {
        self.calls.lock().push(command.to_string());

        match self.scripts.get(command).cloned() {
            Some(Scripted::Output(stdout)) if stdout.trim().is_empty() => Err(RunError::EmptyOutput),
            Some(Scripted::Output(stdout)) => Ok(stdout),
            Some(Scripted::Delayed(delay, stdout)) => {
                if delay >= timeout {
                    tokio::time::sleep(timeout).await;
                    return Err(RunError::Timeout(timeout));
                }
                tokio::time::sleep(delay).await;
                Ok(stdout)
            }
            Some(Scripted::Exit(code)) => Err(RunError::ExecutionFailed {
                code: Some(code),
                stderr: String::new(),
            }),
            Some(Scripted::Timeout) => Err(RunError::Timeout(timeout)),
            Some(Scripted::Empty) => Err(RunError::EmptyOutput),
            Some(Scripted::SpawnFailure) => Err(RunError::SpawnFailed(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no such file or directory",
            ))),
            None => Err(RunError::ExecutionFailed {
                code: Some(127),
                stderr: format!("{}: command not found", command),
            }),
        }
    }
}
