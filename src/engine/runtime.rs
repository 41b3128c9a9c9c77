// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::errors::Result;
use crate::exec::{ScriptRunner, SessionSupervisor};
use crate::types::Script;

use super::core::CoreRuntime;
use super::presenter::{present_session, OutputSink};
use super::{CoreCommand, RuntimeEvent};

/// Upper bound on waiting for a cancelled session to tear down on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Async IO shell around [`CoreRuntime`].
///
/// Reads events, feeds them to the core, and executes the resulting commands
/// against the [`SessionSupervisor`]. Every started session gets a presenter
/// task that streams it to the sink and reports back when it stops.
pub struct Runtime<R: ScriptRunner> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    event_tx: mpsc::Sender<RuntimeEvent>,
    supervisor: SessionSupervisor<R>,
    sink: Arc<dyn OutputSink>,
}

impl<R: ScriptRunner> fmt::Debug for Runtime<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("supervisor", &self.supervisor)
            .finish_non_exhaustive()
    }
}

impl<R: ScriptRunner> Runtime<R> {
    pub fn new(
        core: CoreRuntime,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        event_tx: mpsc::Sender<RuntimeEvent>,
        supervisor: SessionSupervisor<R>,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        Self {
            core,
            event_rx,
            event_tx,
            supervisor,
            sink,
        }
    }

    /// Main event loop. Returns the exit status requested by the core.
    ///
    /// Before returning, the current session is cancelled (a no-op if it
    /// already stopped) and the runner's cleanup is awaited, so nothing is
    /// left behind when the process exits right after.
    pub async fn run(mut self) -> Result<i32> {
        info!("scriptrun runtime started");
        let outcome = self.event_loop().await;
        self.settle().await;
        outcome
    }

    async fn event_loop(&mut self) -> Result<i32> {
        let mut exit_code = 0;

        loop {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    info!("runtime event channel closed; exiting");
                    break;
                }
            };

            debug!(?event, "runtime received event");

            let step = self.core.step(event);

            for command in step.commands {
                if let Some(code) = self.execute_command(command).await? {
                    exit_code = code;
                }
            }

            if !step.keep_running {
                info!(exit_code, "core requested exit; stopping runtime");
                break;
            }
        }

        Ok(exit_code)
    }

    async fn settle(&mut self) {
        if let Some(session) = self.supervisor.shutdown() {
            if tokio::time::timeout(SHUTDOWN_GRACE, session.finished())
                .await
                .is_err()
            {
                warn!(session = %session.id(), "session teardown did not finish in time");
            }
        }

        if tokio::time::timeout(SHUTDOWN_GRACE, self.supervisor.runner().settle())
            .await
            .is_err()
        {
            warn!("runner cleanup did not finish in time");
        }
    }

    /// Execute a single command from the core. Returns an exit status for
    /// `RequestExit`.
    async fn execute_command(&mut self, command: CoreCommand) -> Result<Option<i32>> {
        match command {
            CoreCommand::StartSession(script) => {
                self.start_session(script).await?;
                Ok(None)
            }
            CoreCommand::CancelCurrent => {
                if let Some(session) = self.supervisor.shutdown() {
                    if tokio::time::timeout(SHUTDOWN_GRACE, session.finished())
                        .await
                        .is_err()
                    {
                        warn!(session = %session.id(), "session teardown did not finish in time");
                    }
                }
                Ok(None)
            }
            CoreCommand::RequestExit(code) => Ok(Some(code)),
        }
    }

    async fn start_session(&mut self, script: Script) -> Result<()> {
        let sink = Arc::clone(&self.sink);
        let tx = self.event_tx.clone();

        let started = self.supervisor.start_session_with(script, move |session| {
            let outputs = session.subscribe_outputs();
            let session = session.clone();
            tokio::spawn(async move {
                let id = session.id();
                let state = present_session(session, outputs, sink).await;
                let _ = tx
                    .send(RuntimeEvent::SessionFinished { session: id, state })
                    .await;
            });
        });

        match started {
            Ok(session) => {
                self.core.session_started(session.id());
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "could not start session");
                if self.core.current().is_none() || self.exits_when_finished() {
                    return Err(err);
                }
                Ok(())
            }
        }
    }

    fn exits_when_finished(&self) -> bool {
        self.core.options().exit_when_finished
    }
}
