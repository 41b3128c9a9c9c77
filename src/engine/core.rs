// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! Consumes [`RuntimeEvent`]s and produces the commands the async shell
//! (`engine::runtime::Runtime`) should execute. No Tokio, channels or
//! processes in here, so it is unit tested directly.

use tracing::debug;

use crate::engine::{RuntimeEvent, RuntimeOptions, INTERRUPTED_EXIT_CODE};
use crate::types::{ExecutionState, Script, SessionId};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreCommand {
    /// Start a session for this script through the supervisor.
    StartSession(Script),
    /// Cancel the current session and wait (bounded) for its teardown.
    CancelCurrent,
    /// Stop with this process exit status.
    RequestExit(i32),
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    fn continue_with(commands: Vec<CoreCommand>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }

    fn exit(mut commands: Vec<CoreCommand>, code: i32) -> Self {
        commands.push(CoreCommand::RequestExit(code));
        Self {
            commands,
            keep_running: false,
        }
    }
}

#[derive(Debug)]
pub struct CoreRuntime {
    options: RuntimeOptions,
    current: Option<SessionId>,
}

impl CoreRuntime {
    pub fn new(options: RuntimeOptions) -> Self {
        Self {
            options,
            current: None,
        }
    }

    pub fn options(&self) -> RuntimeOptions {
        self.options
    }

    pub fn current(&self) -> Option<SessionId> {
        self.current
    }

    /// Tell the core which session the shell installed for the last
    /// `StartSession` command.
    pub fn session_started(&mut self, session: SessionId) {
        self.current = Some(session);
    }

    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::RunRequested { script, reason } => {
                debug!(?reason, "run requested");
                CoreStep::continue_with(vec![CoreCommand::StartSession(script)])
            }
            RuntimeEvent::SessionFinished { session, state } => {
                if self.current != Some(session) {
                    debug!(session = %session, "ignoring finish of superseded session");
                    return CoreStep::continue_with(Vec::new());
                }
                if self.options.exit_when_finished {
                    CoreStep::exit(Vec::new(), exit_code_for(&state))
                } else {
                    CoreStep::continue_with(Vec::new())
                }
            }
            RuntimeEvent::ShutdownRequested => {
                CoreStep::exit(vec![CoreCommand::CancelCurrent], INTERRUPTED_EXIT_CODE)
            }
        }
    }
}

/// Process exit status reported for a session's final state.
pub fn exit_code_for(state: &ExecutionState) -> i32 {
    match state {
        ExecutionState::Completed { exit_code } => *exit_code,
        ExecutionState::Failed(_) => 1,
        ExecutionState::Initialized | ExecutionState::Running => 1,
    }
}
