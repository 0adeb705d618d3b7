use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::process::Command;
use timebox::errors::{Result, TimeboxError};
use timebox::exec::{spawn_command, Launcher, ProcessHandle};

/// A launcher that never starts anything and always reports a launch error.
#[derive(Debug, Clone, Default)]
pub struct FailingLauncher {
    attempts: Arc<Mutex<Vec<PathBuf>>>,
}

impl FailingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script paths it was asked to launch.
    pub fn attempts(&self) -> Vec<PathBuf> {
        self.attempts.lock().unwrap().clone()
    }
}

impl Launcher for FailingLauncher {
    fn launch(&self, script_path: &Path) -> Result<ProcessHandle> {
        self.attempts.lock().unwrap().push(script_path.to_path_buf());
        Err(TimeboxError::Launch(format!(
            "refusing to launch {}",
            script_path.display()
        )))
    }
}

/// A launcher that ignores the script path and runs a fixed `sh -c` body.
///
/// Lets supervisor tests drive real processes without writing script files.
#[derive(Debug, Clone)]
pub struct InlineLauncher {
    body: String,
}

impl InlineLauncher {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }
}

impl Launcher for InlineLauncher {
    fn launch(&self, _script_path: &Path) -> Result<ProcessHandle> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&self.body);
        spawn_command(cmd)
    }
}
