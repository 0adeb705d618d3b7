// src/engine/coordinator.rs

//! Run coordinator: admission control and run bookkeeping.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::{Result, TimeboxError};
use crate::exec::signal;
use crate::exec::{Launcher, Outcome, Supervisor, SupervisorOptions};
use crate::fs::FileSystem;
use crate::logsink::LogSink;
use crate::store::{NewScriptRun, RecordStore, RunUpdate, ScriptRun};
use crate::types::{RunStatus, ScriptId};

use super::{validate_run_time_hours, StartAccepted, UploadOptions, UploadRequest};

/// Log line written when a run is stopped on request.
pub const STOPPED_BY_USER: &str = "Script stopped by user";

/// In-memory handle for a run supervised by this coordinator.
///
/// - `stop` asks the supervisor to terminate the process early.
/// - `handle` is the Tokio task running the supervisor.
struct ActiveRun {
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Outcome>,
}

/// Accepts start/stop requests and owns the runs it started.
///
/// Cheap to clone; clones share the same store, launcher and active-run
/// table. Only runs started through this coordinator (or a clone) are
/// tracked in memory. Runs recorded as `running` by an earlier process can
/// still be stopped through their persisted pid.
#[derive(Clone)]
pub struct RunCoordinator {
    store: Arc<dyn RecordStore>,
    blobs: Arc<dyn FileSystem>,
    launcher: Arc<dyn Launcher>,
    sink: LogSink,
    supervisor: SupervisorOptions,
    upload: UploadOptions,
    active: Arc<Mutex<HashMap<ScriptId, ActiveRun>>>,
}

impl std::fmt::Debug for RunCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunCoordinator")
            .field("supervisor", &self.supervisor)
            .field("upload", &self.upload)
            .finish_non_exhaustive()
    }
}

impl RunCoordinator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        blobs: Arc<dyn FileSystem>,
        launcher: Arc<dyn Launcher>,
        supervisor: SupervisorOptions,
        upload: UploadOptions,
    ) -> Self {
        Self {
            store,
            blobs,
            launcher,
            sink: LogSink::new(),
            supervisor,
            upload,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Store a script body and create its `uploaded` record.
    pub fn upload(&self, request: UploadRequest) -> Result<ScriptRun> {
        if request.content.is_empty() {
            return Err(TimeboxError::Validation("No file content".to_string()));
        }

        let file_name = Path::new(request.file_name.trim())
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| TimeboxError::Validation("A file name is required".to_string()))?;

        let extension = Path::new(&file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        if !self.upload.allowed_extensions.iter().any(|a| a == extension) {
            let allowed: Vec<String> = self
                .upload
                .allowed_extensions
                .iter()
                .map(|e| format!(".{e}"))
                .collect();
            return Err(TimeboxError::Validation(format!(
                "Only {} files allowed",
                allowed.join(", ")
            )));
        }

        let hours = request.run_time_hours.unwrap_or(self.upload.default_hours);
        validate_run_time_hours(hours)?;

        let blob_id = Uuid::now_v7();
        let script_path = self.upload.scripts_dir.join(format!("{blob_id}_{file_name}"));
        self.blobs.write(&script_path, &request.content)?;

        let run = self.store.create(NewScriptRun {
            script_name: file_name,
            script_path,
            run_time_hours: hours,
            log_path: self.fresh_log_path(),
        })?;

        info!(
            script_id = run.id,
            name = %run.script_name,
            hours,
            bytes = request.content.len(),
            "script uploaded"
        );
        Ok(run)
    }

    /// Start the run `id` in the background and return immediately.
    ///
    /// The "nothing else is running" check and the claim of `id` are two
    /// separate store calls. Sequential starts always see the previous
    /// claim; two concurrent starts may both pass the check.
    pub fn start(&self, id: ScriptId) -> Result<StartAccepted> {
        let run = self.store.get(id)?;

        if self.store.count_by_status(RunStatus::Running)? > 0 {
            return Err(TimeboxError::Conflict(
                "Another script is already running".to_string(),
            ));
        }

        if run.status != RunStatus::Uploaded {
            return Err(TimeboxError::Conflict(format!(
                "Script {id} has already {}; resubmit it to run again",
                past_tense(run.status)
            )));
        }

        if !self.blobs.is_file(&run.script_path) {
            return Err(TimeboxError::ScriptFileMissing(run.script_path));
        }

        let run = self
            .store
            .update_status(id, RunStatus::Running, RunUpdate::started(Utc::now()))?;

        let accepted = StartAccepted {
            script_id: id,
            run_time_hours: run.run_time_hours,
        };

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let supervisor = Supervisor::new(
            run,
            Arc::clone(&self.store),
            Arc::clone(&self.launcher),
            self.sink.clone(),
            self.supervisor,
            stop_rx,
        );

        // Insert while holding the lock so the task's own removal can never
        // run before the entry exists.
        let mut active = self.active_runs();
        let table = Arc::clone(&self.active);
        let handle = tokio::spawn(async move {
            let outcome = supervisor.run().await;
            table
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
            debug!(script_id = id, ?outcome, "supervisor finished");
            outcome
        });
        active.insert(
            id,
            ActiveRun {
                stop: Some(stop_tx),
                handle,
            },
        );
        drop(active);

        info!(script_id = id, hours = accepted.run_time_hours, "run accepted");
        Ok(accepted)
    }

    /// Stop the running run `id`.
    ///
    /// The record is marked `stopped` and the log gets a "stopped by user"
    /// line before the process is signalled, so the caller observes the
    /// terminal state as soon as this returns. A second call fails with
    /// `NoRunningScript`.
    pub async fn stop(&self, id: ScriptId) -> Result<()> {
        let run = match self.store.get(id) {
            Ok(run) if run.status == RunStatus::Running => run,
            Ok(_) | Err(TimeboxError::NotFound(_)) => {
                return Err(TimeboxError::NoRunningScript(id));
            }
            Err(err) => return Err(err),
        };

        match self
            .store
            .update_status(id, RunStatus::Stopped, RunUpdate::finished(Utc::now()))
        {
            Ok(_) => {}
            Err(TimeboxError::InvalidTransition { .. }) => {
                return Err(TimeboxError::NoRunningScript(id));
            }
            Err(err) => return Err(err),
        }

        if let Err(e) = self.sink.append(&run.log_path, STOPPED_BY_USER).await {
            warn!(script_id = id, error = %e, "failed to write stop line to run log");
        }

        let stop_tx = self
            .active_runs()
            .get_mut(&id)
            .and_then(|active| active.stop.take());

        match (stop_tx, run.pid) {
            (Some(stop_tx), _) => {
                if stop_tx.send(()).is_err() {
                    debug!(script_id = id, "supervisor already finished while stopping");
                }
            }
            (None, Some(pid)) => stop_untracked(id, pid),
            (None, None) => {
                debug!(script_id = id, "no tracked process and no pid; nothing to signal");
            }
        }

        info!(script_id = id, "run stopped by user");
        Ok(())
    }

    /// Current log of run `id`; placeholders instead of read errors.
    pub async fn logs(&self, id: ScriptId) -> Result<String> {
        let run = self.store.get(id)?;
        Ok(self.sink.read(&run.log_path).await)
    }

    pub fn get(&self, id: ScriptId) -> Result<ScriptRun> {
        self.store.get(id)
    }

    pub fn list(&self) -> Result<Vec<ScriptRun>> {
        self.store.list()
    }

    /// Create a fresh `uploaded` run of a finished run's script.
    pub fn resubmit(&self, id: ScriptId) -> Result<ScriptRun> {
        let previous = self.store.get(id)?;
        if !previous.status.is_terminal() {
            return Err(TimeboxError::Conflict(format!(
                "Script {id} is {}; only finished runs can be resubmitted",
                previous.status
            )));
        }
        if !self.blobs.is_file(&previous.script_path) {
            return Err(TimeboxError::ScriptFileMissing(previous.script_path));
        }

        let run = self.store.create(NewScriptRun {
            script_name: previous.script_name,
            script_path: previous.script_path,
            run_time_hours: previous.run_time_hours,
            log_path: self.fresh_log_path(),
        })?;
        info!(script_id = run.id, previous = id, "run resubmitted");
        Ok(run)
    }

    /// Whether a supervisor started by this coordinator is still alive.
    pub fn is_tracked(&self, id: ScriptId) -> bool {
        self.active_runs().contains_key(&id)
    }

    /// Stop every tracked run and wait for the supervisors to finish.
    pub async fn shutdown(&self) {
        let ids: Vec<ScriptId> = self.active_runs().keys().copied().collect();
        if ids.is_empty() {
            return;
        }

        info!(runs = ids.len(), "stopping active runs for shutdown");
        for id in &ids {
            if let Err(err) = self.stop(*id).await {
                debug!(script_id = id, error = %err, "run was not running at shutdown");
            }
        }

        let handles: Vec<(ScriptId, JoinHandle<Outcome>)> = self
            .active_runs()
            .drain()
            .map(|(id, active)| (id, active.handle))
            .collect();

        let wait = self.supervisor.term_grace + self.supervisor.drain_grace + Duration::from_secs(1);
        for (id, handle) in handles {
            match tokio::time::timeout(wait, handle).await {
                Ok(Ok(outcome)) => debug!(script_id = id, ?outcome, "supervisor shut down"),
                Ok(Err(e)) => warn!(script_id = id, error = %e, "supervisor task failed"),
                Err(_) => warn!(script_id = id, "supervisor did not finish before shutdown"),
            }
        }
    }

    fn active_runs(&self) -> MutexGuard<'_, HashMap<ScriptId, ActiveRun>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fresh_log_path(&self) -> std::path::PathBuf {
        self.upload.logs_dir.join(format!("{}.log", Uuid::now_v7()))
    }
}

/// Best-effort SIGTERM for a run recorded by another process.
fn stop_untracked(id: ScriptId, pid: u32) {
    match signal::terminate_pid(pid) {
        Ok(()) => info!(script_id = id, pid, "sent SIGTERM to untracked script"),
        Err(e) if signal::is_no_such_process(&e) => {
            debug!(script_id = id, pid, "untracked script already gone");
        }
        Err(e) => warn!(script_id = id, pid, error = %e, "failed to signal untracked script"),
    }
}

fn past_tense(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Uploaded => "been uploaded",
        RunStatus::Running => "started",
        RunStatus::Completed => "completed",
        RunStatus::Stopped => "been stopped",
        RunStatus::Error => "failed",
    }
}
