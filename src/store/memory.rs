// src/store/memory.rs

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::debug;

use super::{NewScriptRun, RecordBook, RecordStore, RunUpdate, ScriptRun};
use crate::errors::Result;
use crate::types::{RunStatus, ScriptId};

/// Stores run records in memory only (lost on restart).
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    book: Mutex<RecordBook>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn book(&self) -> MutexGuard<'_, RecordBook> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecordStore for MemoryRecordStore {
    fn get(&self, id: ScriptId) -> Result<ScriptRun> {
        self.book().get(id)
    }

    fn create(&self, run: NewScriptRun) -> Result<ScriptRun> {
        let record = self.book().create(run, Utc::now());
        debug!(script_id = record.id, "created run record (memory)");
        Ok(record)
    }

    fn update_status(
        &self,
        id: ScriptId,
        status: RunStatus,
        update: RunUpdate,
    ) -> Result<ScriptRun> {
        let record = self.book().apply_update(id, status, update, Utc::now())?;
        debug!(script_id = id, %status, "updated run status (memory)");
        Ok(record)
    }

    fn count_by_status(&self, status: RunStatus) -> Result<usize> {
        Ok(self.book().count_by_status(status))
    }

    fn list(&self) -> Result<Vec<ScriptRun>> {
        Ok(self.book().list())
    }
}
