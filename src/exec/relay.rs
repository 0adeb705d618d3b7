// src/exec/relay.rs

//! Output relay: drains a child's stdout/stderr into the run log.
//!
//! One Tokio task per stream, each forwarding lines as they arrive. The
//! tasks block only on their own pipe, never on the supervisor. Lines are
//! read as raw bytes and decoded lossily so a script printing invalid UTF-8
//! does not end the relay early.

use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{ChildStderr, ChildStdout};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::logsink::LogSink;
use crate::types::ScriptId;

/// Prefix for lines captured from stderr.
pub const STDERR_PREFIX: &str = "[ERROR] ";

/// Handles of the running relay tasks for one script run.
#[derive(Debug)]
pub struct OutputRelay {
    tasks: Vec<JoinHandle<()>>,
}

/// Start draining `stdout` and `stderr` into the log at `log_path`.
pub fn spawn_relay(
    script_id: ScriptId,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    sink: LogSink,
    log_path: PathBuf,
) -> OutputRelay {
    let mut tasks = Vec::with_capacity(2);

    if let Some(stdout) = stdout {
        tasks.push(tokio::spawn(relay_lines(
            script_id,
            stdout,
            "",
            sink.clone(),
            log_path.clone(),
        )));
    }

    if let Some(stderr) = stderr {
        tasks.push(tokio::spawn(relay_lines(
            script_id,
            stderr,
            STDERR_PREFIX,
            sink,
            log_path,
        )));
    }

    OutputRelay { tasks }
}

impl OutputRelay {
    /// Wait up to `grace` for every stream to reach EOF, then abort whatever
    /// is still running. Returns how many streams were cut off.
    pub async fn finish(self, grace: Duration) -> usize {
        let deadline = Instant::now() + grace;
        let mut cut_off = 0;

        for mut task in self.tasks {
            if timeout_at(deadline, &mut task).await.is_err() {
                task.abort();
                cut_off += 1;
            }
        }

        cut_off
    }
}

async fn relay_lines<R>(
    script_id: ScriptId,
    stream: R,
    prefix: &'static str,
    sink: LogSink,
    log_path: PathBuf,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    let mut lines = 0usize;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                let text = text.trim_end_matches(['\n', '\r']);
                let line = format!("{prefix}{text}");
                if let Err(e) = sink.append(&log_path, &line).await {
                    warn!(script_id, error = %e, "failed to append script output to log");
                }
                lines += 1;
            }
            Err(e) => {
                warn!(script_id, error = %e, "error reading script output; relay stopping");
                break;
            }
        }
    }

    debug!(
        script_id,
        stream = if prefix.is_empty() { "stdout" } else { "stderr" },
        lines,
        "output stream closed"
    );
}
