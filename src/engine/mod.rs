// src/engine/mod.rs

//! Front-end engine driving the supervisor from the command line.
//!
//! Run requests come from the initial invocation and (in watch mode) from
//! file changes; session completions come back from the presenters. The pure
//! decision logic lives in [`core`]; the async shell that owns the
//! supervisor is [`runtime`]; [`presenter`] streams a session to a sink.

use crate::types::{ExecutionState, Script, SessionId};

/// Exit status used when the user interrupts the run (Ctrl-C).
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Why a run was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunReason {
    /// The script given on the command line.
    Initial,
    /// The watched script file changed.
    FileChanged,
}

/// Options used by both the core and the async shell.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// If true, stop once the current session finished (one-shot mode).
    /// Watch mode keeps running until shutdown.
    pub exit_when_finished: bool,
}

/// Events flowing into the runtime.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    RunRequested { script: Script, reason: RunReason },
    /// A presenter saw its session stop.
    SessionFinished {
        session: SessionId,
        state: ExecutionState,
    },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod core;
pub mod presenter;
pub mod runtime;

pub use core::{CoreCommand, CoreRuntime, CoreStep};
pub use presenter::{present_session, ConsoleSink, OutputSink, TranscriptSink};
pub use runtime::Runtime;
