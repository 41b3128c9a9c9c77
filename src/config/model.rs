// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::exec::session::{SessionOptions, DEFAULT_DRAIN_TIMEOUT, DEFAULT_OUTPUT_BUFFER};

/// Default interpreter, resolved through `PATH`.
pub const DEFAULT_INTERPRETER: &str = "kotlinc";

/// Flag that tells the interpreter to execute a file as a script.
pub const DEFAULT_SCRIPT_FLAG: &str = "-script";

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [interpreter]
/// path = "kotlinc"
/// script_flag = "-script"
/// args = []
///
/// [scratch]
/// dir = "."
/// prefix = "temp"
/// extension = "kts"
///
/// [session]
/// output_buffer = 256
/// drain_timeout_ms = 1000
/// ```
///
/// All sections are optional and have defaults. This is the unvalidated form;
/// convert to [`Config`] with `Config::try_from`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    pub interpreter: InterpreterConfig,

    #[serde(default)]
    pub scratch: ScratchConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

/// `[interpreter]` section: what gets executed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InterpreterConfig {
    /// Interpreter executable; a bare name is looked up on `PATH`.
    #[serde(default = "default_interpreter_path")]
    pub path: String,

    /// Literal placed right before the script path.
    #[serde(default = "default_script_flag")]
    pub script_flag: String,

    /// Extra arguments placed before `script_flag`.
    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory of the interpreter process; inherited if unset.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

fn default_interpreter_path() -> String {
    DEFAULT_INTERPRETER.to_string()
}

fn default_script_flag() -> String {
    DEFAULT_SCRIPT_FLAG.to_string()
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            path: default_interpreter_path(),
            script_flag: default_script_flag(),
            args: Vec::new(),
            working_dir: None,
        }
    }
}

/// `[scratch]` section: where script files are materialized.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScratchConfig {
    #[serde(default = "default_scratch_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_prefix")]
    pub prefix: String,

    #[serde(default = "default_extension")]
    pub extension: String,
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_prefix() -> String {
    "temp".to_string()
}

fn default_extension() -> String {
    "kts".to_string()
}

impl Default for ScratchConfig {
    fn default() -> Self {
        Self {
            dir: default_scratch_dir(),
            prefix: default_prefix(),
            extension: default_extension(),
        }
    }
}

/// `[session]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_output_buffer")]
    pub output_buffer: usize,

    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

fn default_output_buffer() -> usize {
    DEFAULT_OUTPUT_BUFFER
}

fn default_drain_timeout_ms() -> u64 {
    DEFAULT_DRAIN_TIMEOUT.as_millis() as u64
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            output_buffer: default_output_buffer(),
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

impl SessionConfig {
    pub fn options(&self) -> SessionOptions {
        SessionOptions {
            output_buffer: self.output_buffer,
            drain_timeout: Duration::from_millis(self.drain_timeout_ms),
        }
    }
}

/// Validated configuration. Only constructed through `TryFrom<RawConfig>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub interpreter: InterpreterConfig,
    pub scratch: ScratchConfig,
    pub session: SessionConfig,
}

impl Config {
    pub(crate) fn new_unchecked(raw: RawConfig) -> Self {
        Self {
            interpreter: raw.interpreter,
            scratch: raw.scratch,
            session: raw.session,
        }
    }
}
