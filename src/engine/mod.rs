// src/engine/mod.rs

//! Orchestration engine for timebox.
//!
//! [`RunCoordinator`] accepts upload / start / stop / logs requests, enforces
//! that at most one script runs at a time, and hands each accepted run to an
//! [`crate::exec::Supervisor`] running in the background.

use std::path::PathBuf;

use serde::Serialize;

use crate::errors::{Result, TimeboxError};
use crate::types::ScriptId;

pub mod coordinator;

pub use coordinator::RunCoordinator;

/// Upper bound for a requested run time (one year).
pub const MAX_RUN_TIME_HOURS: f64 = 24.0 * 365.0;

/// Where uploads go and what they may look like.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadOptions {
    pub scripts_dir: PathBuf,
    pub logs_dir: PathBuf,
    /// Extensions without the leading dot, e.g. `"py"`.
    pub allowed_extensions: Vec<String>,
    pub default_hours: f64,
}

/// A script body plus the requested run time.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file_name: String,
    pub content: Vec<u8>,
    /// `None` uses [`UploadOptions::default_hours`].
    pub run_time_hours: Option<f64>,
}

/// Returned by [`RunCoordinator::start`] once a run has been handed off.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StartAccepted {
    pub script_id: ScriptId,
    pub run_time_hours: f64,
}

/// Check that `hours` is a usable run time.
pub fn validate_run_time_hours(hours: f64) -> Result<()> {
    if !hours.is_finite() || hours <= 0.0 {
        return Err(TimeboxError::Validation(format!(
            "Run time must be a positive number of hours (got {hours})"
        )));
    }
    if hours > MAX_RUN_TIME_HOURS {
        return Err(TimeboxError::Validation(format!(
            "Run time must be at most {MAX_RUN_TIME_HOURS} hours (got {hours})"
        )));
    }
    Ok(())
}
