// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`launcher`] turns a script path into a running child process.
//! - [`relay`] drains the child's stdout/stderr into the run log.
//! - [`supervisor`] owns one child for its lifetime: deadline, stop signal,
//!   termination and the terminal status update.
//! - [`signal`] holds the pid / process-group signalling helpers.

pub mod launcher;
pub mod relay;
pub mod signal;
pub mod supervisor;

pub use launcher::{spawn_command, Launcher, ProcessHandle, ScriptLauncher};
pub use relay::{spawn_relay, OutputRelay, STDERR_PREFIX};
pub use supervisor::{run_duration, Outcome, Supervisor, SupervisorOptions};
