// src/exec/runner.rs

//! Runner: turns a [`Script`] into a ready-to-start [`ExecutionSession`].
//!
//! [`InterpreterRunner`] writes the script to a scratch file, builds
//! `<interpreter> <args..> <script-flag> <path>` and arranges for the file to
//! be removed once the session is over. The removal is driven by observing
//! the session finishing; the session itself knows nothing about files.
//! Removal tasks are tracked so a caller about to exit can wait for them with
//! [`ScriptRunner::settle`].

use std::ffi::OsString;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::task::TaskTracker;
use tracing::debug;

use crate::config::InterpreterConfig;
use crate::errors::Result;
use crate::exec::launcher::{CommandSpec, ProcessLauncher};
use crate::exec::session::{ExecutionSession, SessionOptions};
use crate::fs::ScriptFileStore;
use crate::types::Script;

/// Future returned by [`ScriptRunner::settle`].
pub type SettleFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Something that can turn run requests into sessions.
///
/// The supervisor is generic over this so tests can swap in runners that do
/// not touch the filesystem.
pub trait ScriptRunner: Send + Sync {
    /// Prepare a session for `script` without starting it.
    ///
    /// Errors are limited to preparing the run (e.g. writing the scratch
    /// file). Process failures show up later as the session's state.
    fn prepare_session(&self, script: Script) -> Result<ExecutionSession>;

    /// Prepare and immediately start a session.
    fn start_session(&self, script: Script) -> Result<ExecutionSession> {
        let session = self.prepare_session(script)?;
        session.start()?;
        Ok(session)
    }

    /// Wait for background work belonging to sessions that stopped (such as
    /// removing their script files).
    ///
    /// Sessions that are still running keep this pending, so cancel them
    /// first.
    fn settle(&self) -> SettleFuture<'_> {
        Box::pin(std::future::ready(()))
    }
}

/// Runs scripts through an external interpreter executable.
#[derive(Debug, Clone)]
pub struct InterpreterRunner {
    interpreter: InterpreterConfig,
    store: ScriptFileStore,
    launcher: Arc<dyn ProcessLauncher>,
    options: SessionOptions,
    cleanup: TaskTracker,
}

impl InterpreterRunner {
    pub fn new(
        interpreter: InterpreterConfig,
        store: ScriptFileStore,
        launcher: Arc<dyn ProcessLauncher>,
        options: SessionOptions,
    ) -> Self {
        Self {
            interpreter,
            store,
            launcher,
            options,
            cleanup: TaskTracker::new(),
        }
    }

    pub fn interpreter(&self) -> &InterpreterConfig {
        &self.interpreter
    }

    /// Command line used to run a script stored at `script_path`.
    pub fn build_command(&self, script_path: impl Into<OsString>) -> CommandSpec {
        let command = CommandSpec::new(&self.interpreter.path)
            .args(&self.interpreter.args)
            .arg(&self.interpreter.script_flag)
            .arg(script_path);

        match &self.interpreter.working_dir {
            Some(dir) => command.current_dir(dir),
            None => command,
        }
    }
}

impl ScriptRunner for InterpreterRunner {
    fn prepare_session(&self, script: Script) -> Result<ExecutionSession> {
        let path = self.store.materialize(&script)?;
        let command = self.build_command(&path);

        let session = ExecutionSession::new(command, Arc::clone(&self.launcher), self.options.clone());
        debug!(session = %session.id(), path = %path.display(), "prepared session");

        let store = self.store.clone();
        let watched = session.clone();
        self.cleanup.spawn(async move {
            let state = watched.finished().await;
            debug!(session = %watched.id(), %state, "session over; removing script file");
            store.discard(&path);
        });

        Ok(session)
    }

    fn settle(&self) -> SettleFuture<'_> {
        Box::pin(async move {
            self.cleanup.close();
            self.cleanup.wait().await;
            self.cleanup.reopen();
        })
    }
}
