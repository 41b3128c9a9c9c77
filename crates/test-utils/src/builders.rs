#![allow(dead_code)]

use std::path::PathBuf;

use scriptrun::config::{Config, RawConfig};

/// Builder for `Config` to simplify test setup.
pub struct ConfigBuilder {
    config: RawConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfig::default(),
        }
    }

    pub fn interpreter(mut self, path: &str) -> Self {
        self.config.interpreter.path = path.to_string();
        self
    }

    pub fn script_flag(mut self, flag: &str) -> Self {
        self.config.interpreter.script_flag = flag.to_string();
        self
    }

    pub fn interpreter_arg(mut self, arg: &str) -> Self {
        self.config.interpreter.args.push(arg.to_string());
        self
    }

    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch.dir = dir.into();
        self
    }

    pub fn extension(mut self, ext: &str) -> Self {
        self.config.scratch.extension = ext.to_string();
        self
    }

    pub fn drain_timeout_ms(mut self, ms: u64) -> Self {
        self.config.session.drain_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        Config::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
