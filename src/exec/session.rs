// src/exec/session.rs

//! Execution Session: one spawned process, its lifecycle state machine, and
//! the fan-out of its output lines.
//!
//! A session is created in [`ExecutionState::Initialized`] and started at
//! most once. All work it spawns (two stream readers and an exit waiter) is
//! tied to one [`CancellationToken`] and tracked by one [`TaskTracker`], so
//! tearing the session down is "cancel the token" and waiting for it is
//! "wait on the tracker".
//!
//! Process and I/O errors never escape as `Err`; they are recorded as
//! [`ExecutionState::Failed`] and observed through [`ExecutionSession::subscribe_state`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::exec::launcher::{CommandSpec, ProcessHandle, ProcessLauncher};
use crate::exec::multiplexer::{FailureReporter, OutputFanout, OutputMultiplexer};
use crate::types::{ExecutionState, OutputLine, OutputStream, SessionFailure, SessionId};

/// Default per-subscriber queue length for output lines.
pub const DEFAULT_OUTPUT_BUFFER: usize = 256;

/// Default idle grace period for stream readers after the process exited.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_millis(1000);

/// Tuning knobs for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Queue length of each output subscriber. A full queue holds the
    /// stream readers back until the subscriber catches up; lines are never
    /// dropped.
    pub output_buffer: usize,

    /// After the process exited, how long the readers may go without
    /// publishing a line before the rest of the output is abandoned and
    /// `Completed` is published. Readers that keep delivering are waited for.
    pub drain_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            output_buffer: DEFAULT_OUTPUT_BUFFER,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

/// Misuse of the session API. Process failures are *not* reported this way.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("session {0} was already started")]
    AlreadyStarted(SessionId),
}

/// Handle to one execution session. Cheap to clone; all clones share state.
///
/// Dropping handles does not stop the process: call [`cancel`](Self::cancel).
#[derive(Clone)]
pub struct ExecutionSession {
    shared: Arc<Shared>,
}

struct Shared {
    id: SessionId,
    command: CommandSpec,
    launcher: Arc<dyn ProcessLauncher>,
    options: SessionOptions,
    state_tx: watch::Sender<ExecutionState>,
    history: Mutex<Vec<ExecutionState>>,
    outputs: Arc<OutputFanout>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    started: AtomicBool,
}

impl fmt::Debug for ExecutionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionSession")
            .field("id", &self.shared.id)
            .field("command", &self.shared.command)
            .field("state", &*self.shared.state_tx.borrow())
            .field("cancelled", &self.shared.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl ExecutionSession {
    /// Create a session for `command`. Nothing is spawned until [`start`](Self::start).
    pub fn new(
        command: CommandSpec,
        launcher: Arc<dyn ProcessLauncher>,
        options: SessionOptions,
    ) -> Self {
        let (state_tx, _) = watch::channel(ExecutionState::Initialized);
        let outputs = Arc::new(OutputFanout::new(options.output_buffer));

        Self {
            shared: Arc::new(Shared {
                id: SessionId::next(),
                command,
                launcher,
                options,
                state_tx,
                history: Mutex::new(vec![ExecutionState::Initialized]),
                outputs,
                cancel: CancellationToken::new(),
                tracker: TaskTracker::new(),
                started: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    pub fn command(&self) -> &CommandSpec {
        &self.shared.command
    }

    /// Current state.
    pub fn state(&self) -> ExecutionState {
        self.shared.state_tx.borrow().clone()
    }

    /// Current state plus all later changes. The current value is available
    /// immediately via `borrow()`.
    pub fn subscribe_state(&self) -> watch::Receiver<ExecutionState> {
        self.shared.state_tx.subscribe()
    }

    /// Output lines published from now on. Earlier lines are not replayed.
    ///
    /// The stream ends (`recv` yields `None`) once the session's work has
    /// stopped and every queued line was taken. Keep receiving: a subscriber
    /// that stops reading without dropping its receiver holds the process's
    /// output back.
    pub fn subscribe_outputs(&self) -> mpsc::Receiver<OutputLine> {
        self.shared.outputs.subscribe()
    }

    /// Every state this session has been in, oldest first.
    pub fn state_history(&self) -> Vec<ExecutionState> {
        self.shared
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Launch the process and spawn the readers and the exit waiter.
    ///
    /// On launch failure the session goes straight to `Failed` and nothing is
    /// spawned. A session cancelled before `start` stays `Initialized`.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> Result<(), SessionError> {
        let shared = &self.shared;
        let id = shared.id;

        if shared.started.swap(true, Ordering::SeqCst) {
            return Err(SessionError::AlreadyStarted(id));
        }

        if shared.cancel.is_cancelled() {
            debug!(session = %id, "session cancelled before start; not launching");
            shared.outputs.close();
            shared.tracker.close();
            return Ok(());
        }

        info!(session = %id, command = %shared.command, "starting process");

        let mut process = match shared.launcher.launch(&shared.command) {
            Ok(process) => process,
            Err(err) => {
                warn!(session = %id, error = %err, "failed to start process");
                shared.transition(ExecutionState::Failed(SessionFailure::from(&err)));
                shared.outputs.close();
                shared.tracker.close();
                return Ok(());
            }
        };

        shared.transition(ExecutionState::Running);

        let report: FailureReporter = {
            let shared = Arc::clone(shared);
            Arc::new(move |failure| shared.fail(failure))
        };
        let mux = OutputMultiplexer::new(
            id,
            Arc::clone(&shared.outputs),
            shared.cancel.clone(),
            report,
        );

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = process.stdout.take() {
            readers.push(mux.attach(&shared.tracker, OutputStream::Stdout, stdout));
        }
        if let Some(stderr) = process.stderr.take() {
            readers.push(mux.attach(&shared.tracker, OutputStream::Stderr, stderr));
        }

        shared
            .tracker
            .spawn(wait_for_exit(Arc::clone(shared), process.handle, readers));
        shared.tracker.close();

        debug!(session = %id, pid = ?process.pid, "process started");
        Ok(())
    }

    /// Stop the session: kill the process if alive and stop all reads.
    ///
    /// Returns immediately; teardown finishes in the background (see
    /// [`finished`](Self::finished)). The state is left as it was. Idempotent.
    pub fn cancel(&self) {
        let shared = &self.shared;
        if !shared.cancel.is_cancelled() {
            info!(session = %shared.id, state = %self.state(), "cancelling session");
        }
        shared.cancel.cancel();
        if !shared.started.load(Ordering::SeqCst) {
            shared.outputs.close();
        }
        shared.tracker.close();
    }

    /// Wait until all work of this session has stopped, then return the
    /// final state.
    ///
    /// Resolves after a terminal state was reached or after cancellation.
    /// Pending forever for a session that was neither started nor cancelled.
    pub async fn finished(&self) -> ExecutionState {
        self.shared.tracker.wait().await;
        self.state()
    }
}

impl Shared {
    /// Apply a forward transition. Backwards or repeated transitions, and any
    /// transition after cancellation, are dropped.
    fn transition(&self, next: ExecutionState) -> bool {
        let applied = self.state_tx.send_if_modified(|current| {
            if self.cancel.is_cancelled() || next.rank() <= current.rank() {
                return false;
            }
            *current = next.clone();
            self.history
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(next.clone());
            true
        });

        if applied {
            info!(session = %self.id, state = %next, "session state changed");
        } else {
            debug!(session = %self.id, state = %next, "ignoring stale state transition");
        }
        applied
    }

    /// Record a failure and tear down the remaining work.
    fn fail(&self, failure: SessionFailure) {
        self.transition(ExecutionState::Failed(failure));
        self.cancel.cancel();
    }
}

/// Wait for the process to exit (or for cancellation) and publish the result.
async fn wait_for_exit(
    shared: Arc<Shared>,
    mut handle: Box<dyn ProcessHandle>,
    mut readers: Vec<JoinHandle<()>>,
) {
    let id = shared.id;
    let cancel = shared.cancel.clone();

    let exited = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        res = handle.wait() => Some(res),
    };

    match exited {
        None => {
            debug!(session = %id, "cancellation requested; killing process");
            if let Err(err) = handle.kill().await {
                warn!(session = %id, error = %err, "failed to kill process on cancellation");
            }
        }
        Some(Ok(exit_code)) => {
            debug!(session = %id, exit_code, "process exited; draining output");
            drain_after_exit(&shared, &mut readers).await;
            shared.transition(ExecutionState::Completed { exit_code });
        }
        Some(Err(err)) => {
            warn!(session = %id, error = %err, "waiting for process failed");
            shared.fail(SessionFailure::wait(&err));
        }
    }

    // Whatever is left (e.g. a reader held open by a grandchild) stops here.
    cancel.cancel();
    join_readers(&mut readers).await;
    shared.outputs.close();
}

/// Let the readers finish after exit. Gives up once they published nothing
/// for a whole `drain_timeout`.
async fn drain_after_exit(shared: &Shared, readers: &mut Vec<JoinHandle<()>>) {
    let mut seen = shared.outputs.published();
    loop {
        if tokio::time::timeout(shared.options.drain_timeout, join_readers(readers))
            .await
            .is_ok()
        {
            return;
        }

        let published = shared.outputs.published();
        if published == seen {
            debug!(session = %shared.id, "output readers idle after drain timeout");
            return;
        }
        seen = published;
    }
}

/// Await the readers. Cancel-safe: a reader is only forgotten once it ended.
async fn join_readers(readers: &mut Vec<JoinHandle<()>>) {
    while let Some(reader) = readers.last_mut() {
        let _ = reader.await;
        readers.pop();
    }
}
