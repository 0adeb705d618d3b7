use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of a `ScriptRun`, assigned by the record store at upload time.
pub type ScriptId = u64;

/// Persisted lifecycle status of a script run.
///
/// - `Uploaded`: stored, never started.
/// - `Running`: a supervisor owns (or owned, before a restart) a live process.
/// - `Completed`, `Stopped`, `Error`: terminal. A terminal run never changes
///   status again; running the same script again needs a new record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Uploaded,
    Running,
    Completed,
    Stopped,
    Error,
}

impl RunStatus {
    pub const ALL: [RunStatus; 5] = [
        RunStatus::Uploaded,
        RunStatus::Running,
        RunStatus::Completed,
        RunStatus::Stopped,
        RunStatus::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Uploaded => "uploaded",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Stopped => "stopped",
            RunStatus::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Stopped | RunStatus::Error
        )
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// `Running -> Running` is allowed so that fields such as the pid can be
    /// recorded after the run has been claimed.
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        match (self, next) {
            (RunStatus::Uploaded, RunStatus::Running) => true,
            (RunStatus::Running, RunStatus::Running) => true,
            (RunStatus::Running, next) => next.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "uploaded" => Ok(RunStatus::Uploaded),
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "stopped" => Ok(RunStatus::Stopped),
            "error" => Ok(RunStatus::Error),
            other => Err(format!(
                "invalid run status: {other} (expected uploaded, running, completed, stopped or error)"
            )),
        }
    }
}
