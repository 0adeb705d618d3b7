// src/store/file.rs

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use chrono::Utc;
use tracing::{debug, info};

use super::{NewScriptRun, RecordBook, RecordStore, RunUpdate, ScriptRun};
use crate::errors::Result;
use crate::types::{RunStatus, ScriptId};

/// Stores run records in a JSON file (`<data_dir>/records.json`).
///
/// The whole book is kept in memory and rewritten through a temp file plus
/// rename after every mutation, so a crash never leaves a half-written file.
/// A mutation whose write fails is rolled back in memory too.
///
/// Writes are synchronous and run on the calling thread, including async
/// handlers and supervisor tasks. The file holds one small record per run
/// and is touched a handful of times per run.
#[derive(Debug)]
pub struct FileRecordStore {
    path: PathBuf,
    book: Mutex<RecordBook>,
}

impl FileRecordStore {
    /// Open (or create) the record file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let book = load_book(&path)?;
        info!(
            path = %path.display(),
            runs = book.list().len(),
            running = book.count_by_status(RunStatus::Running),
            "opened record store"
        );
        Ok(Self {
            path,
            book: Mutex::new(book),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn book(&self) -> MutexGuard<'_, RecordBook> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `mutate` to the book and persist; restore the previous book if
    /// either step fails.
    fn mutate<T>(&self, mutate: impl FnOnce(&mut RecordBook) -> Result<T>) -> Result<T> {
        let mut book = self.book();
        let previous = book.clone();

        let value = mutate(&mut book)?;
        if let Err(err) = save_book(&self.path, &book) {
            *book = previous;
            return Err(err);
        }
        Ok(value)
    }
}

impl RecordStore for FileRecordStore {
    fn get(&self, id: ScriptId) -> Result<ScriptRun> {
        self.book().get(id)
    }

    fn create(&self, run: NewScriptRun) -> Result<ScriptRun> {
        let record = self.mutate(|book| Ok(book.create(run, Utc::now())))?;
        debug!(script_id = record.id, "created run record (file)");
        Ok(record)
    }

    fn update_status(
        &self,
        id: ScriptId,
        status: RunStatus,
        update: RunUpdate,
    ) -> Result<ScriptRun> {
        let record = self.mutate(|book| book.apply_update(id, status, update, Utc::now()))?;
        debug!(script_id = id, %status, "updated run status (file)");
        Ok(record)
    }

    fn count_by_status(&self, status: RunStatus) -> Result<usize> {
        Ok(self.book().count_by_status(status))
    }

    fn list(&self) -> Result<Vec<ScriptRun>> {
        Ok(self.book().list())
    }
}

fn load_book(path: &Path) -> Result<RecordBook> {
    if !path.exists() {
        return Ok(RecordBook::default());
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading record file at {:?}", path))?;
    if contents.trim().is_empty() {
        return Ok(RecordBook::default());
    }

    Ok(serde_json::from_str(&contents)?)
}

fn save_book(path: &Path, book: &RecordBook) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating record directory at {:?}", parent))?;
    }

    let tmp_path = path.with_extension("json.tmp");
    let file = File::create(&tmp_path)
        .with_context(|| format!("creating record file at {:?}", tmp_path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, book)?;
    writer.flush()?;
    writer
        .get_ref()
        .sync_all()
        .with_context(|| format!("syncing record file at {:?}", tmp_path))?;

    fs::rename(&tmp_path, path)
        .with_context(|| format!("replacing record file at {:?}", path))?;
    Ok(())
}
