// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::engine::validate_run_time_hours;
use crate::errors::{Result, TimeboxError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = TimeboxError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        let term_grace = parse_config_duration("supervisor.term_grace", &raw.supervisor.term_grace)?;
        let drain_grace =
            parse_config_duration("supervisor.drain_grace", &raw.supervisor.drain_grace)?;
        Ok(ConfigFile::new_unchecked(raw, term_grace, drain_grace))
    }
}

/// Run every semantic check on a raw config.
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    validate_raw_config(cfg)
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_supervisor(cfg)?;
    validate_upload(cfg)?;
    Ok(())
}

fn validate_supervisor(cfg: &RawConfigFile) -> Result<()> {
    if cfg.supervisor.interpreter.trim().is_empty() {
        return Err(TimeboxError::Config(
            "[supervisor].interpreter must not be empty".to_string(),
        ));
    }
    parse_config_duration("supervisor.term_grace", &cfg.supervisor.term_grace)?;
    parse_config_duration("supervisor.drain_grace", &cfg.supervisor.drain_grace)?;
    Ok(())
}

fn validate_upload(cfg: &RawConfigFile) -> Result<()> {
    if cfg.upload.allowed_extensions.is_empty() {
        return Err(TimeboxError::Config(
            "[upload].allowed_extensions must list at least one extension".to_string(),
        ));
    }

    for ext in &cfg.upload.allowed_extensions {
        if ext.is_empty() || ext.starts_with('.') {
            return Err(TimeboxError::Config(format!(
                "[upload].allowed_extensions entry '{ext}' must be a bare extension such as \"py\""
            )));
        }
    }

    validate_run_time_hours(cfg.upload.default_hours).map_err(|e| {
        TimeboxError::Config(format!("[upload].default_hours is invalid: {e}"))
    })?;

    Ok(())
}

fn parse_config_duration(key: &str, value: &str) -> Result<Duration> {
    parse_duration(value)
        .map_err(|e| TimeboxError::Config(format!("[{key}] = \"{value}\": {e}")))
}

/// Parse durations such as `"500ms"`, `"5s"`, `"2m"` or `"1h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration(" 5s "), Ok(Duration::from_secs(5)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
    }

    #[test]
    fn rejects_missing_or_unknown_units() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("3d").is_err());
        assert!(parse_duration("s").is_err());
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = ConfigFile::try_from(RawConfigFile::default()).unwrap();
        assert_eq!(cfg.interpreter, "python3");
        assert_eq!(cfg.supervisor.term_grace, Duration::from_secs(5));
        assert_eq!(cfg.supervisor.drain_grace, Duration::from_secs(3));
        assert_eq!(cfg.upload.allowed_extensions, vec!["py".to_string()]);
        assert!(cfg.upload.scripts_dir.ends_with("scripts"));
        assert!(cfg.upload.logs_dir.ends_with("logs"));
    }

    #[test]
    fn empty_interpreter_is_a_config_error() {
        let mut raw = RawConfigFile::default();
        raw.supervisor.interpreter = "  ".to_string();
        match ConfigFile::try_from(raw) {
            Err(TimeboxError::Config(msg)) => assert!(msg.contains("interpreter")),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn dotted_extension_is_rejected() {
        let mut raw = RawConfigFile::default();
        raw.upload.allowed_extensions = vec![".py".to_string()];
        assert!(matches!(
            ConfigFile::try_from(raw),
            Err(TimeboxError::Config(_))
        ));
    }
}
