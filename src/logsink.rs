// src/logsink.rs

//! Append-only, timestamped text log per script run.
//!
//! Every line is written as `[<timestamp>] <text>\n` with a single write,
//! flushed before the next append starts. Appends through one [`LogSink`]
//! are serialized, so lines coming from the stdout and stderr relays never
//! interleave mid-line and a reader of an in-progress log always sees a
//! prefix of the final content.
//!
//! Reads never fail: a missing log yields [`NO_LOGS_PLACEHOLDER`] and any
//! other I/O error yields [`READ_ERROR_PLACEHOLDER`].

use std::io;
use std::path::Path;
use std::sync::Arc;

use chrono::Local;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

pub const NO_LOGS_PLACEHOLDER: &str = "No logs available yet...";
pub const READ_ERROR_PLACEHOLDER: &str = "Error reading log file";

/// `ctime`-style local timestamp, e.g. `Thu Oct 15 09:04:05 2026`.
const TIMESTAMP_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

#[derive(Debug, Clone, Default)]
pub struct LogSink {
    write_lock: Arc<Mutex<()>>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one timestamped line to the log at `path`.
    ///
    /// Embedded newlines are kept on the same record by replacing them with
    /// spaces.
    pub async fn append(&self, path: &Path, line: &str) -> io::Result<()> {
        let record = format_line(&timestamp(), line);

        let _guard = self.write_lock.lock().await;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(record.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Current content of the log at `path`, or a placeholder.
    pub async fn read(&self, path: &Path) -> String {
        match fs::read(path).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => NO_LOGS_PLACEHOLDER.to_string(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read run log");
                READ_ERROR_PLACEHOLDER.to_string()
            }
        }
    }
}

pub fn timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

fn format_line(timestamp: &str, line: &str) -> String {
    let line = line.trim_end_matches(['\n', '\r']);
    let line = line.replace(['\n', '\r'], " ");
    format!("[{timestamp}] {line}\n")
}
