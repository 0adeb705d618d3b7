// src/errors.rs

//! Crate-wide error type and result alias.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{RunStatus, ScriptId};

#[derive(Error, Debug)]
pub enum TimeboxError {
    /// Missing or malformed input.
    #[error("{0}")]
    Validation(String),

    #[error("Script not found: {0}")]
    NotFound(ScriptId),

    #[error("No running script found with ID {0}")]
    NoRunningScript(ScriptId),

    #[error("Script file not found: {}", .0.display())]
    ScriptFileMissing(PathBuf),

    /// Admission control refused the request (e.g. another run is active).
    #[error("{0}")]
    Conflict(String),

    #[error("Script {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: ScriptId,
        from: RunStatus,
        to: RunStatus,
    },

    #[error("Failed to launch script: {0}")]
    Launch(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TimeboxError>;
