// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`launcher`] starts OS processes (`ProcessLauncher`, `TokioLauncher`).
//! - [`multiplexer`] drains stdout/stderr into the session's output subscribers.
//! - [`session`] owns one process and its lifecycle state machine.
//! - [`supervisor`] keeps at most one current session.
//! - [`runner`] builds the interpreter command and manages the scratch file.

pub mod launcher;
pub mod multiplexer;
pub mod runner;
pub mod session;
pub mod supervisor;

pub use launcher::{
    BoxedReader, CommandSpec, LaunchError, ProcessFuture, ProcessHandle, ProcessLauncher,
    RunningProcess, TokioLauncher,
};
pub use runner::{InterpreterRunner, ScriptRunner, SettleFuture};
pub use session::{ExecutionSession, SessionError, SessionOptions};
pub use supervisor::SessionSupervisor;
