#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use timebox::engine::{RunCoordinator, UploadOptions, UploadRequest};
use timebox::exec::{Launcher, ScriptLauncher, SupervisorOptions};
use timebox::fs::RealFileSystem;
use timebox::store::{MemoryRecordStore, NewScriptRun, RecordStore, ScriptRun};

/// Short graces so tests that stop or time out scripts finish quickly.
pub fn fast_supervisor_options() -> SupervisorOptions {
    SupervisorOptions {
        term_grace: Duration::from_millis(500),
        drain_grace: Duration::from_millis(500),
    }
}

/// A coordinator over a temp directory that runs uploaded `.sh` files with
/// `sh`.
pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<MemoryRecordStore>,
    pub coordinator: RunCoordinator,
}

impl Harness {
    pub fn new() -> Self {
        HarnessBuilder::new().build()
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.dir.path().join("scripts")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.dir.path().join("logs")
    }

    /// Upload `body` as `name` with the given run time.
    pub fn upload(&self, name: &str, body: &str, hours: f64) -> ScriptRun {
        self.coordinator
            .upload(UploadRequest {
                file_name: name.to_string(),
                content: body.as_bytes().to_vec(),
                run_time_hours: Some(hours),
            })
            .expect("upload failed")
    }

    /// Create an `uploaded` record directly in the store, bypassing the
    /// upload flow (e.g. to point at a script that does not exist).
    pub fn insert_record(&self, name: &str, script_path: PathBuf, hours: f64) -> ScriptRun {
        self.store
            .create(NewScriptRun {
                script_name: name.to_string(),
                script_path,
                run_time_hours: hours,
                log_path: self.logs_dir().join(format!("{name}.log")),
            })
            .expect("create failed")
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`Harness`].
pub struct HarnessBuilder {
    launcher: Option<Arc<dyn Launcher>>,
    options: SupervisorOptions,
    allowed_extensions: Vec<String>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            launcher: None,
            options: fast_supervisor_options(),
            allowed_extensions: vec!["sh".to_string()],
        }
    }

    pub fn with_launcher(mut self, launcher: impl Launcher + 'static) -> Self {
        self.launcher = Some(Arc::new(launcher));
        self
    }

    pub fn with_options(mut self, options: SupervisorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_allowed_extension(mut self, ext: &str) -> Self {
        self.allowed_extensions.push(ext.to_string());
        self
    }

    pub fn build(self) -> Harness {
        let dir = tempfile::tempdir().expect("creating tempdir");
        let store = Arc::new(MemoryRecordStore::new());
        let launcher: Arc<dyn Launcher> = match self.launcher {
            Some(launcher) => launcher,
            None => Arc::new(ScriptLauncher::new("sh", Vec::new())),
        };

        let upload = UploadOptions {
            scripts_dir: dir.path().join("scripts"),
            logs_dir: dir.path().join("logs"),
            allowed_extensions: self.allowed_extensions,
            default_hours: 1.0,
        };

        let coordinator = RunCoordinator::new(
            Arc::clone(&store) as Arc<dyn RecordStore>,
            Arc::new(RealFileSystem),
            launcher,
            self.options,
            upload,
        );

        Harness {
            dir,
            store,
            coordinator,
        }
    }
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Poll `check` until it returns true or `timeout` elapses.
pub async fn wait_until<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}
