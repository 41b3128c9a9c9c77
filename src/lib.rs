// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod types;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing::info;

use crate::cli::CliArgs;
use crate::config::{Config, Overrides};
use crate::engine::{ConsoleSink, CoreRuntime, RunReason, Runtime, RuntimeEvent, RuntimeOptions};
use crate::errors::{Result, ScriptRunError};
use crate::exec::{InterpreterRunner, SessionSupervisor, TokioLauncher};
use crate::fs::{FileSystem, RealFileSystem, ScriptFileStore};
use crate::types::Script;

pub use crate::exec::{ExecutionSession, ScriptRunner};
pub use crate::types::{ExecutionState, OutputLine, OutputStream};

/// Where the script text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    File(PathBuf),
    Stdin,
    Inline(String),
}

impl ScriptSource {
    pub fn from_args(args: &CliArgs) -> Result<Self> {
        match (&args.eval, &args.script) {
            (Some(source), _) => Ok(ScriptSource::Inline(source.clone())),
            (None, Some(path)) if path.as_os_str() == "-" => Ok(ScriptSource::Stdin),
            (None, Some(path)) => Ok(ScriptSource::File(path.clone())),
            (None, None) => Err(ScriptRunError::ConfigError(
                "no script given (pass a SCRIPT path, `-` or --eval)".to_string(),
            )),
        }
    }

    pub async fn load(&self, fs: &dyn FileSystem) -> Result<Script> {
        match self {
            ScriptSource::File(path) => Ok(Script::new(fs.read_to_string(path)?)),
            ScriptSource::Stdin => {
                let mut content = String::new();
                tokio::io::stdin()
                    .read_to_string(&mut content)
                    .await
                    .context("reading script from stdin")?;
                Ok(Script::new(content))
            }
            ScriptSource::Inline(source) => Ok(Script::new(source.clone())),
        }
    }

    fn watch_path(&self) -> Option<&Path> {
        match self {
            ScriptSource::File(path) => Some(path),
            _ => None,
        }
    }
}

/// Build the production runner from a validated config.
pub fn build_runner(config: &Config, fs: Arc<dyn FileSystem>) -> Result<InterpreterRunner> {
    let store = ScriptFileStore::new(
        fs,
        &config.scratch.dir,
        config.scratch.prefix.clone(),
        config.scratch.extension.clone(),
    )?;

    Ok(InterpreterRunner::new(
        config.interpreter.clone(),
        store,
        Arc::new(TokioLauncher),
        config.session.options(),
    ))
}

/// High-level entry point used by `main.rs`. Returns the process exit status.
///
/// This wires together:
/// - config loading and overrides
/// - runner / supervisor / runtime
/// - (optional) file watcher
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<i32> {
    let overrides = Overrides {
        interpreter: args.interpreter.clone(),
        temp_dir: args.temp_dir.clone(),
    };
    let config = config::resolve(args.config.as_deref(), &overrides, |key| {
        std::env::var(key).ok()
    })?;

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let source = ScriptSource::from_args(&args)?;
    if args.watch && source.watch_path().is_none() {
        return Err(ScriptRunError::ConfigError(
            "--watch needs a script file, not stdin or --eval".to_string(),
        ));
    }

    let runner = build_runner(&config, Arc::clone(&fs))?;

    if args.dry_run {
        print_dry_run(&config, &runner);
        return Ok(0);
    }

    let script = source.load(fs.as_ref()).await?;

    // Runtime event channel.
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);

    // Optional file watcher.
    let _watcher_handle = match source.watch_path() {
        Some(path) if args.watch => Some(crate::watch::spawn_script_watcher(
            path,
            script.content(),
            Arc::clone(&fs),
            rt_tx.clone(),
        )?),
        _ => None,
    };

    // Ctrl-C → cancel the current session and exit.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }

    info!(interpreter = %config.interpreter.path, watch = args.watch, "starting");
    rt_tx
        .send(RuntimeEvent::RunRequested {
            script,
            reason: RunReason::Initial,
        })
        .await
        .map_err(|e| anyhow::anyhow!("sending initial run request: {e}"))?;

    let core = CoreRuntime::new(RuntimeOptions {
        exit_when_finished: !args.watch,
    });
    let runtime = Runtime::new(
        core,
        rt_rx,
        rt_tx,
        SessionSupervisor::new(runner),
        Arc::new(ConsoleSink),
    );
    runtime.run().await
}

/// Print the effective configuration and the command line a run would use.
fn print_dry_run(config: &Config, runner: &InterpreterRunner) {
    let example = runner.build_command("<script file>");

    println!("scriptrun dry-run");
    println!("  interpreter = {}", config.interpreter.path);
    println!("  script_flag = {}", config.interpreter.script_flag);
    if !config.interpreter.args.is_empty() {
        println!("  args = {:?}", config.interpreter.args);
    }
    if let Some(dir) = &config.interpreter.working_dir {
        println!("  working_dir = {}", dir.display());
    }
    println!(
        "  scratch = {}/{}<random>.{}",
        config.scratch.dir.display(),
        config.scratch.prefix,
        config.scratch.extension
    );
    println!();
    println!("command: {example}");
}
