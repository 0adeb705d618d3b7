// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::engine::UploadOptions;
use crate::exec::SupervisorOptions;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [server]
/// host = "127.0.0.1"
/// port = 3000
///
/// [storage]
/// data_dir = "/tmp/timebox"
///
/// [supervisor]
/// interpreter = "python3"
/// term_grace = "5s"
/// drain_grace = "3s"
///
/// [upload]
/// allowed_extensions = ["py"]
/// default_hours = 1.0
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub supervisor: SupervisorSection,

    #[serde(default)]
    pub upload: UploadSection,
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// `[storage]` section.
///
/// Everything the service persists lives under `data_dir`:
/// `scripts/` for uploaded blobs, `logs/` for run logs and `records.json`
/// for the record store.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/tmp/timebox")
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl StorageSection {
    pub fn scripts_dir(&self) -> PathBuf {
        self.data_dir.join("scripts")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    pub fn records_path(&self) -> PathBuf {
        self.data_dir.join("records.json")
    }
}

/// `[supervisor]` section. Durations are strings like `"5s"` or `"500ms"`.
#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorSection {
    /// Program that runs an uploaded script, e.g. `python3` or `sh`.
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Extra arguments placed between the interpreter and the script path.
    #[serde(default)]
    pub interpreter_args: Vec<String>,

    /// How long a terminated script gets to exit after SIGTERM before it is
    /// killed.
    #[serde(default = "default_term_grace")]
    pub term_grace: String,

    /// How long the output relay may keep draining after the process ended.
    #[serde(default = "default_drain_grace")]
    pub drain_grace: String,
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_term_grace() -> String {
    "5s".to_string()
}

fn default_drain_grace() -> String {
    "3s".to_string()
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            interpreter_args: Vec::new(),
            term_grace: default_term_grace(),
            drain_grace: default_drain_grace(),
        }
    }
}

/// `[upload]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadSection {
    /// File extensions (without the dot) accepted by the upload flow.
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    /// Run time used when an upload does not specify one.
    #[serde(default = "default_hours")]
    pub default_hours: f64,
}

fn default_allowed_extensions() -> Vec<String> {
    vec!["py".to_string()]
}

fn default_hours() -> f64 {
    1.0
}

impl Default for UploadSection {
    fn default() -> Self {
        Self {
            allowed_extensions: default_allowed_extensions(),
            default_hours: default_hours(),
        }
    }
}

/// Validated configuration.
///
/// Built from [`RawConfigFile`] through `TryFrom` (see `validate.rs`), so
/// durations are already parsed and paths already derived.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub server: ServerSection,
    pub storage: StorageSection,
    pub interpreter: String,
    pub interpreter_args: Vec<String>,
    pub supervisor: SupervisorOptions,
    pub upload: UploadOptions,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        raw: RawConfigFile,
        term_grace: Duration,
        drain_grace: Duration,
    ) -> Self {
        let upload = UploadOptions {
            scripts_dir: raw.storage.scripts_dir(),
            logs_dir: raw.storage.logs_dir(),
            allowed_extensions: raw.upload.allowed_extensions,
            default_hours: raw.upload.default_hours,
        };

        Self {
            server: raw.server,
            storage: raw.storage,
            interpreter: raw.supervisor.interpreter,
            interpreter_args: raw.supervisor.interpreter_args,
            supervisor: SupervisorOptions {
                term_grace,
                drain_grace,
            },
            upload,
        }
    }
}
