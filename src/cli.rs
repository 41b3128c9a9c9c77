// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `scriptrun`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "scriptrun",
    version,
    about = "Run a script through an external interpreter and stream its output.",
    long_about = None
)]
pub struct CliArgs {
    /// Script file to run, or `-` to read the script from stdin.
    #[arg(value_name = "SCRIPT", required_unless_present = "eval", conflicts_with = "eval")]
    pub script: Option<PathBuf>,

    /// Run this source text instead of a file.
    #[arg(short = 'e', long, value_name = "SOURCE")]
    pub eval: Option<String>,

    /// Path to the config file (TOML).
    ///
    /// Default: `Scriptrun.toml` in the current working directory, if present.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Interpreter executable (overrides `SCRIPTRUN_INTERPRETER` and config).
    #[arg(long, value_name = "PATH")]
    pub interpreter: Option<String>,

    /// Directory for temporary script files.
    #[arg(long, value_name = "DIR")]
    pub temp_dir: Option<PathBuf>,

    /// Re-run the script whenever the file changes; a running session is
    /// cancelled first.
    #[arg(long, requires = "script")]
    pub watch: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SCRIPTRUN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Print the command that would run, but don't execute anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_path_and_flags() {
        let args = CliArgs::try_parse_from([
            "scriptrun",
            "--interpreter",
            "/opt/kotlinc/bin/kotlinc",
            "--watch",
            "demo.kts",
        ])
        .unwrap();
        assert_eq!(args.script, Some(PathBuf::from("demo.kts")));
        assert_eq!(args.interpreter.as_deref(), Some("/opt/kotlinc/bin/kotlinc"));
        assert!(args.watch);
    }

    #[test]
    fn eval_replaces_script() {
        let args = CliArgs::try_parse_from(["scriptrun", "-e", "println(1)"]).unwrap();
        assert_eq!(args.eval.as_deref(), Some("println(1)"));
        assert!(args.script.is_none());
    }

    #[test]
    fn script_or_eval_is_required() {
        assert!(CliArgs::try_parse_from(["scriptrun"]).is_err());
        assert!(CliArgs::try_parse_from(["scriptrun", "-e", "x", "a.kts"]).is_err());
    }

    #[test]
    fn watch_needs_a_script_file() {
        assert!(CliArgs::try_parse_from(["scriptrun", "--watch", "-e", "x"]).is_err());
    }
}
