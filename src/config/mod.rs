// src/config/mod.rs

//! Configuration: TOML model, loading, overrides and validation.
//!
//! - [`model`] mirrors the `Scriptrun.toml` layout.
//! - [`loader`] reads the file and layers environment/CLI overrides on top.
//! - [`validate`] turns a `RawConfig` into a checked `Config`.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{
    default_config_path, load_and_validate, load_from_path, resolve, Overrides,
    INTERPRETER_ENV_VAR,
};
pub use model::{
    Config, InterpreterConfig, RawConfig, ScratchConfig, SessionConfig, DEFAULT_INTERPRETER,
    DEFAULT_SCRIPT_FLAG,
};
