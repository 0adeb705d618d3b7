// src/exec/supervisor.rs

//! Timeout supervisor: owns one script process for its whole lifetime.
//!
//! ```text
//! Starting -> Running -> { Completed | TimedOut | StoppedByUser | Error }
//! ```
//!
//! While running, the supervisor races three events with `tokio::select!`:
//! the process exiting, the run-time deadline, and a stop signal from the
//! coordinator. Timeout and stop share the same termination sequence
//! (SIGTERM, bounded grace, SIGKILL). Whatever happens, the output relay is
//! drained for a bounded time and the terminal status is persisted before
//! [`Supervisor::run`] returns. On a natural exit the rest of the script's
//! process group is killed and its output drained before the exit line is
//! logged.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::oneshot;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use crate::errors::{Result, TimeboxError};
use crate::logsink::LogSink;
use crate::store::{RecordStore, RunUpdate, ScriptRun};
use crate::types::RunStatus;

use super::launcher::{Launcher, ProcessHandle};
use super::relay::{spawn_relay, OutputRelay};

/// Timing knobs for supervision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorOptions {
    /// Time between SIGTERM and SIGKILL.
    pub term_grace: Duration,
    /// Time the output relay may keep draining once the process is gone.
    pub drain_grace: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            term_grace: Duration::from_secs(5),
            drain_grace: Duration::from_secs(3),
        }
    }
}

/// How a supervised run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The process exited on its own. `exit_code` is `None` when it was
    /// killed by a signal nobody here sent.
    Completed { exit_code: Option<i32> },
    TimedOut,
    StoppedByUser,
    Error(String),
}

impl Outcome {
    /// Status written to the record store.
    ///
    /// A timeout is persisted as `completed`. Only the run log tells the two
    /// apart ("Timeout reached" line).
    pub fn persisted_status(&self) -> RunStatus {
        match self {
            Outcome::Completed { .. } | Outcome::TimedOut => RunStatus::Completed,
            Outcome::StoppedByUser => RunStatus::Stopped,
            Outcome::Error(_) => RunStatus::Error,
        }
    }
}

/// Convert a run time in hours into a wall-clock budget.
pub fn run_duration(hours: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(hours * 3600.0)
        .map_err(|e| TimeboxError::Validation(format!("invalid run time {hours} hours: {e}")))
}

pub struct Supervisor {
    run: ScriptRun,
    store: Arc<dyn RecordStore>,
    launcher: Arc<dyn Launcher>,
    sink: LogSink,
    options: SupervisorOptions,
    stop_rx: oneshot::Receiver<()>,
}

impl Supervisor {
    /// `run` must already be claimed (`running`) in the store.
    pub fn new(
        run: ScriptRun,
        store: Arc<dyn RecordStore>,
        launcher: Arc<dyn Launcher>,
        sink: LogSink,
        options: SupervisorOptions,
        stop_rx: oneshot::Receiver<()>,
    ) -> Self {
        Self {
            run,
            store,
            launcher,
            sink,
            options,
            stop_rx,
        }
    }

    /// Supervise the run to a terminal state and return how it ended.
    pub async fn run(mut self) -> Outcome {
        let script_id = self.run.id;
        let mut relay = None;

        let outcome = match self.supervise(&mut relay).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(script_id, error = %err, "script supervision failed");
                self.log(&format!("ERROR: {err}")).await;
                Outcome::Error(err.to_string())
            }
        };

        self.drain(&mut relay).await;
        self.finalize(&outcome);
        outcome
    }

    async fn supervise(&mut self, relay: &mut Option<OutputRelay>) -> Result<Outcome> {
        let script_id = self.run.id;
        let budget = run_duration(self.run.run_time_hours)?;

        self.log("Script starting...").await;
        let mut process = self.launcher.launch(&self.run.script_path)?;
        let pid = process.pid();
        let started_at = Instant::now();

        match self
            .store
            .update_status(script_id, RunStatus::Running, RunUpdate::pid(pid))
        {
            Ok(_) => {}
            Err(TimeboxError::InvalidTransition { from, .. }) => {
                // Stopped between the claim and the launch.
                info!(script_id, pid, %from, "run left running state before launch finished");
                self.terminate(&mut process).await?;
                return Ok(Outcome::StoppedByUser);
            }
            Err(err) => return Err(err),
        }

        info!(script_id, pid, hours = self.run.run_time_hours, "script started");
        self.log(&format!("Script started (PID: {pid})")).await;
        self.log(&format!("Will run for {} hours", self.run.run_time_hours))
            .await;

        let (stdout, stderr) = process.take_output();
        *relay = Some(spawn_relay(
            script_id,
            stdout,
            stderr,
            self.sink.clone(),
            self.run.log_path.clone(),
        ));

        let deadline = started_at.checked_add(budget).ok_or_else(|| {
            TimeboxError::Validation(format!(
                "run time of {} hours is too large",
                self.run.run_time_hours
            ))
        })?;
        let sleep = sleep_until(deadline);
        tokio::pin!(sleep);

        let mut stop_armed = true;

        loop {
            tokio::select! {
                status = process.wait() => {
                    let status = status?;
                    let exit_code = status.code();
                    let shown = exit_code.map_or_else(|| format!("{status}"), |c| c.to_string());
                    info!(script_id, pid, exit_code = ?exit_code, "script exited");
                    // Background jobs would outlive the run and hold the pipes open.
                    process.kill_leftovers();
                    self.drain(relay).await;
                    self.log(&format!("Script completed with exit code: {shown}")).await;
                    return Ok(Outcome::Completed { exit_code });
                }

                _ = &mut sleep => {
                    info!(script_id, pid, "run time exceeded; stopping script");
                    self.log("Timeout reached, stopping script").await;
                    self.terminate(&mut process).await?;
                    return Ok(Outcome::TimedOut);
                }

                signal = &mut self.stop_rx, if stop_armed => {
                    match signal {
                        Ok(()) => {
                            info!(script_id, pid, "stop requested; terminating script");
                            self.terminate(&mut process).await?;
                            return Ok(Outcome::StoppedByUser);
                        }
                        Err(_) => {
                            // Coordinator went away without asking to stop;
                            // keep enforcing the deadline.
                            debug!(script_id, "stop channel closed without a stop request");
                            stop_armed = false;
                        }
                    }
                }
            }
        }
    }

    /// Let the relay finish within the drain grace. No-op once drained.
    async fn drain(&self, relay: &mut Option<OutputRelay>) {
        if let Some(relay) = relay.take() {
            let cut_off = relay.finish(self.options.drain_grace).await;
            if cut_off > 0 {
                warn!(
                    script_id = self.run.id,
                    cut_off, "output relay did not drain within grace period"
                );
            }
        }
    }

    async fn terminate(&self, process: &mut ProcessHandle) -> Result<()> {
        let status = process.terminate(self.options.term_grace).await?;
        debug!(script_id = self.run.id, pid = process.pid(), ?status, "script terminated");
        Ok(())
    }

    /// Persist the terminal status. A run already made terminal elsewhere
    /// (a stop request) keeps the status it has.
    fn finalize(&self, outcome: &Outcome) {
        let script_id = self.run.id;
        let status = outcome.persisted_status();

        match self
            .store
            .update_status(script_id, status, RunUpdate::finished(Utc::now()))
        {
            Ok(_) => info!(script_id, %status, "run finished"),
            Err(TimeboxError::InvalidTransition { from, .. }) => {
                debug!(script_id, recorded = %from, outcome = %status, "run already terminal");
            }
            Err(err) => {
                error!(script_id, %status, error = %err, "failed to persist terminal status");
            }
        }
    }

    async fn log(&self, line: &str) {
        if let Err(e) = self.sink.append(&self.run.log_path, line).await {
            warn!(script_id = self.run.id, error = %e, "failed to write run log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_persisted_as_completed() {
        assert_eq!(Outcome::TimedOut.persisted_status(), RunStatus::Completed);
        assert_eq!(
            Outcome::Completed { exit_code: Some(1) }.persisted_status(),
            RunStatus::Completed
        );
        assert_eq!(Outcome::StoppedByUser.persisted_status(), RunStatus::Stopped);
        assert_eq!(
            Outcome::Error("boom".into()).persisted_status(),
            RunStatus::Error
        );
    }

    #[test]
    fn run_duration_converts_hours() {
        assert_eq!(run_duration(1.0).unwrap(), Duration::from_secs(3600));
        assert_eq!(run_duration(0.001).unwrap(), Duration::from_millis(3600));
        assert!(run_duration(-1.0).is_err());
        assert!(run_duration(f64::NAN).is_err());
    }
}
