// src/exec/launcher.rs

//! Starting script processes.
//!
//! The supervisor talks to a [`Launcher`] rather than to
//! `tokio::process::Command` directly, so tests can swap in launchers that
//! fail on purpose or run an inline shell body. Every launcher should go
//! through [`spawn_command`] so the child gets the same stdio, process-group
//! and kill-on-drop setup.

use std::fmt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::errors::{Result, TimeboxError};

use super::signal;

/// Trait abstracting how a script is turned into a running process.
pub trait Launcher: Send + Sync {
    fn launch(&self, script_path: &Path) -> Result<ProcessHandle>;
}

/// Production launcher: `<interpreter> [args...] <script_path>`.
#[derive(Debug, Clone)]
pub struct ScriptLauncher {
    interpreter: String,
    interpreter_args: Vec<String>,
}

impl ScriptLauncher {
    pub fn new(interpreter: impl Into<String>, interpreter_args: Vec<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
            interpreter_args,
        }
    }

    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }
}

impl Launcher for ScriptLauncher {
    fn launch(&self, script_path: &Path) -> Result<ProcessHandle> {
        if !script_path.is_file() {
            return Err(TimeboxError::Launch(format!(
                "script file {} does not exist",
                script_path.display()
            )));
        }

        let mut cmd = Command::new(&self.interpreter);
        cmd.args(&self.interpreter_args).arg(script_path);

        // Python block-buffers a piped stdout; ask for line-by-line output so
        // the log follows the script in real time.
        cmd.env("PYTHONUNBUFFERED", "1");

        debug!(
            interpreter = %self.interpreter,
            script = %script_path.display(),
            "launching script"
        );
        spawn_command(cmd)
    }
}

/// Spawn `cmd` with piped stdout/stderr, null stdin, kill-on-drop and (on
/// unix) a fresh process group.
pub fn spawn_command(mut cmd: Command) -> Result<ProcessHandle> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    let child = cmd
        .spawn()
        .map_err(|e| TimeboxError::Launch(format!("spawning '{program}': {e}")))?;

    ProcessHandle::from_child(child)
}

/// A live child process plus its output pipes.
///
/// Owned by exactly one supervisor. Dropping the handle kills the child.
pub struct ProcessHandle {
    child: Child,
    pid: u32,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

impl ProcessHandle {
    pub fn from_child(mut child: Child) -> Result<Self> {
        let pid = child
            .id()
            .ok_or_else(|| TimeboxError::Launch("child exited before its pid was read".into()))?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        Ok(Self {
            child,
            pid,
            stdout,
            stderr,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Hand the output pipes to the relay. Later calls return `None`s.
    pub fn take_output(&mut self) -> (Option<ChildStdout>, Option<ChildStderr>) {
        (self.stdout.take(), self.stderr.take())
    }

    /// Wait for the process to exit. Cancel safe.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// SIGTERM the process group, wait up to `grace`, then force-kill.
    pub async fn terminate(&mut self, grace: Duration) -> std::io::Result<ExitStatus> {
        if let Some(status) = self.child.try_wait()? {
            return Ok(status);
        }

        self.request_stop();

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => {
                let status = status?;
                info!(pid = self.pid, ?status, "script exited after termination request");
                Ok(status)
            }
            Err(_) => {
                warn!(
                    pid = self.pid,
                    grace_ms = grace.as_millis() as u64,
                    "script ignored termination request; killing"
                );
                if let Err(e) = signal::kill_group(self.pid) {
                    if !signal::is_no_such_process(&e) {
                        debug!(pid = self.pid, error = %e, "failed to kill process group");
                    }
                }
                self.child.kill().await?;
                self.child.wait().await
            }
        }
    }

    /// SIGKILL whatever is left in the script's process group after the
    /// script itself exited (e.g. jobs it put in the background).
    pub fn kill_leftovers(&self) {
        match signal::kill_group(self.pid) {
            Ok(()) => info!(pid = self.pid, "killed processes left behind by script"),
            Err(e) if signal::is_no_such_process(&e) => {}
            Err(e) => debug!(pid = self.pid, error = %e, "failed to kill leftover processes"),
        }
    }

    #[cfg(unix)]
    fn request_stop(&mut self) {
        if let Err(e) = signal::terminate_group(self.pid) {
            if !signal::is_no_such_process(&e) {
                warn!(pid = self.pid, error = %e, "failed to send SIGTERM to script");
            }
        }
    }

    #[cfg(not(unix))]
    fn request_stop(&mut self) {
        if let Err(e) = self.child.start_kill() {
            warn!(pid = self.pid, error = %e, "failed to stop script");
        }
    }
}
