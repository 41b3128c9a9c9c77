// src/config/validate.rs

use crate::config::model::{Config, RawConfig};
use crate::errors::{Result, ScriptRunError};

impl TryFrom<RawConfig> for Config {
    type Error = ScriptRunError;

    fn try_from(raw: RawConfig) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(Config::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfig) -> Result<()> {
    validate_interpreter(cfg)?;
    validate_scratch(cfg)?;
    validate_session(cfg)?;
    Ok(())
}

fn validate_interpreter(cfg: &RawConfig) -> Result<()> {
    if cfg.interpreter.path.trim().is_empty() {
        return Err(ScriptRunError::ConfigError(
            "[interpreter].path must not be empty".to_string(),
        ));
    }
    if cfg.interpreter.script_flag.trim().is_empty() {
        return Err(ScriptRunError::ConfigError(
            "[interpreter].script_flag must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_scratch(cfg: &RawConfig) -> Result<()> {
    for (key, value) in [
        ("prefix", &cfg.scratch.prefix),
        ("extension", &cfg.scratch.extension),
    ] {
        if value.contains(['/', '\\']) {
            return Err(ScriptRunError::ConfigError(format!(
                "[scratch].{} must not contain path separators (got '{}')",
                key, value
            )));
        }
    }
    Ok(())
}

fn validate_session(cfg: &RawConfig) -> Result<()> {
    if cfg.session.output_buffer == 0 {
        return Err(ScriptRunError::ConfigError(
            "[session].output_buffer must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.session.drain_timeout_ms == 0 {
        return Err(ScriptRunError::ConfigError(
            "[session].drain_timeout_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}
