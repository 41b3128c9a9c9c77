// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{Config, RawConfig};
use crate::errors::Result;

/// Environment variable overriding `[interpreter].path`.
pub const INTERPRETER_ENV_VAR: &str = "SCRIPTRUN_INTERPRETER";

/// Load a configuration file from a given path and return the raw `RawConfig`.
///
/// This only performs TOML deserialization; use [`load_and_validate`] or
/// [`resolve`] to get a checked [`Config`].
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfig = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and run validation.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Config> {
    let raw_config = load_from_path(&path)?;
    let config = Config::try_from(raw_config)?;
    Ok(config)
}

/// `Scriptrun.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Scriptrun.toml")
}

/// Values from the command line that take precedence over everything else.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub interpreter: Option<String>,
    pub temp_dir: Option<PathBuf>,
}

impl RawConfig {
    /// Layer overrides on top of file values.
    ///
    /// Interpreter precedence: CLI flag, then [`INTERPRETER_ENV_VAR`], then
    /// the file. Empty environment values are ignored.
    pub fn apply_overrides<F>(&mut self, overrides: &Overrides, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let from_env = env(INTERPRETER_ENV_VAR).filter(|v| !v.trim().is_empty());

        if let Some(path) = overrides.interpreter.clone().or(from_env) {
            debug!(interpreter = %path, "interpreter path overridden");
            self.interpreter.path = path;
        }

        if let Some(dir) = &overrides.temp_dir {
            self.scratch.dir = dir.clone();
        }
    }
}

/// Build the effective configuration.
///
/// - `explicit`: a path given on the command line; it must exist.
/// - Otherwise [`default_config_path`] is used if present, built-in defaults
///   if not.
pub fn resolve<F>(explicit: Option<&Path>, overrides: &Overrides, env: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let mut raw = match explicit {
        Some(path) => load_from_path(path)?,
        None => {
            let path = default_config_path();
            if path.is_file() {
                debug!(path = %path.display(), "loading default config file");
                load_from_path(&path)?
            } else {
                RawConfig::default()
            }
        }
    };

    raw.apply_overrides(overrides, env);
    Config::try_from(raw)
}
