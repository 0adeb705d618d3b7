// src/config/mod.rs

//! Configuration loading and validation for timebox.
//!
//! - `model.rs`: the TOML-backed data model.
//! - `loader.rs`: reading a config file from disk (or falling back to
//!   defaults).
//! - `validate.rs`: semantic checks and conversion into [`ConfigFile`].

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_or_default};
pub use model::{
    ConfigFile, RawConfigFile, ServerSection, StorageSection, SupervisorSection, UploadSection,
};
pub use validate::{parse_duration, validate_config};
