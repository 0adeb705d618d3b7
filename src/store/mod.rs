// src/store/mod.rs

//! Persistent record of every script run.
//!
//! [`RecordStore`] is the single source of truth for "is something running".
//! Each call is atomic on its own; nothing spans calls. Lifecycle rules
//! (`uploaded -> running -> terminal`, terminal is final) are enforced here,
//! inside [`RecordBook::apply_update`], so no caller can resurrect a run.
//!
//! - [`MemoryRecordStore`]: ephemeral, for tests.
//! - [`FileRecordStore`]: JSON document on disk, rewritten on each mutation.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, TimeboxError};
use crate::types::{RunStatus, ScriptId};

pub mod file;
pub mod memory;

pub use file::FileRecordStore;
pub use memory::MemoryRecordStore;

/// One scheduled/executed attempt of a user script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptRun {
    pub id: ScriptId,
    pub script_name: String,
    pub script_path: PathBuf,
    pub run_time_hours: f64,
    pub log_path: PathBuf,
    pub status: RunStatus,
    /// OS pid of the child; only present while `running`.
    pub pid: Option<u32>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Input for [`RecordStore::create`]; the store assigns id and status.
#[derive(Debug, Clone)]
pub struct NewScriptRun {
    pub script_name: String,
    pub script_path: PathBuf,
    pub run_time_hours: f64,
    pub log_path: PathBuf,
}

/// Fields written alongside a status change. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunUpdate {
    pub pid: Option<u32>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl RunUpdate {
    pub fn started(at: DateTime<Utc>) -> Self {
        Self {
            start_time: Some(at),
            ..Self::default()
        }
    }

    pub fn pid(pid: u32) -> Self {
        Self {
            pid: Some(pid),
            ..Self::default()
        }
    }

    pub fn finished(at: DateTime<Utc>) -> Self {
        Self {
            end_time: Some(at),
            ..Self::default()
        }
    }
}

/// Abstract persistent mapping from script id to its run record.
pub trait RecordStore: Send + Sync {
    fn get(&self, id: ScriptId) -> Result<ScriptRun>;

    /// Insert a new run with status `uploaded` and return it.
    fn create(&self, run: NewScriptRun) -> Result<ScriptRun>;

    /// Move `id` to `status`, applying `update`, if the lifecycle allows it.
    ///
    /// Fails with `NotFound` for unknown ids and `InvalidTransition` when the
    /// current status does not permit the move.
    fn update_status(&self, id: ScriptId, status: RunStatus, update: RunUpdate)
        -> Result<ScriptRun>;

    fn count_by_status(&self, status: RunStatus) -> Result<usize>;

    /// All runs ordered by id.
    fn list(&self) -> Result<Vec<ScriptRun>>;
}

/// In-memory state shared by both store implementations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordBook {
    next_id: ScriptId,
    runs: BTreeMap<ScriptId, ScriptRun>,
}

impl RecordBook {
    pub fn get(&self, id: ScriptId) -> Result<ScriptRun> {
        self.runs.get(&id).cloned().ok_or(TimeboxError::NotFound(id))
    }

    pub fn create(&mut self, run: NewScriptRun, now: DateTime<Utc>) -> ScriptRun {
        // Ids start at 1, matching an autoincrement key.
        let id = self.next_id.max(self.runs.keys().next_back().copied().unwrap_or(0)) + 1;
        self.next_id = id;

        let record = ScriptRun {
            id,
            script_name: run.script_name,
            script_path: run.script_path,
            run_time_hours: run.run_time_hours,
            log_path: run.log_path,
            status: RunStatus::Uploaded,
            pid: None,
            start_time: None,
            end_time: None,
            created_at: now,
        };
        self.runs.insert(id, record.clone());
        record
    }

    pub fn apply_update(
        &mut self,
        id: ScriptId,
        status: RunStatus,
        update: RunUpdate,
        now: DateTime<Utc>,
    ) -> Result<ScriptRun> {
        let run = self.runs.get_mut(&id).ok_or(TimeboxError::NotFound(id))?;

        if !run.status.can_transition_to(status) {
            return Err(TimeboxError::InvalidTransition {
                id,
                from: run.status,
                to: status,
            });
        }

        run.status = status;
        if let Some(pid) = update.pid {
            run.pid = Some(pid);
        }
        if let Some(start) = update.start_time {
            run.start_time = Some(start);
        }
        if status.is_terminal() {
            run.pid = None;
            run.end_time = Some(update.end_time.unwrap_or(now));
        }

        Ok(run.clone())
    }

    pub fn count_by_status(&self, status: RunStatus) -> usize {
        self.runs.values().filter(|r| r.status == status).count()
    }

    pub fn list(&self) -> Vec<ScriptRun> {
        self.runs.values().cloned().collect()
    }
}
