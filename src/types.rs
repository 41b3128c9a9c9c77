// src/types.rs

//! Core value types shared by the execution layer and its consumers.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

/// Source text submitted for execution.
///
/// A `Script` has no identity beyond its content; a fresh one is created per
/// run request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    content: String,
}

impl Script {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

impl From<&str> for Script {
    fn from(value: &str) -> Self {
        Script::new(value)
    }
}

impl From<String> for Script {
    fn from(value: String) -> Self {
        Script::new(value)
    }
}

/// Process-wide unique identifier of an execution session, used in logs and
/// to tell superseded sessions apart from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SessionId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which pipe of the child process a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputStream::Stdout => f.write_str("stdout"),
            OutputStream::Stderr => f.write_str("stderr"),
        }
    }
}

/// One line of process output, without its line terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub session: SessionId,
    pub stream: OutputStream,
    pub text: String,
}

/// Why a session ended up in [`ExecutionState::Failed`].
///
/// Stores the rendered cause rather than the `io::Error` itself so the state
/// can be cloned out to every subscriber.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionFailure {
    #[error("failed to start '{program}': {message}")]
    Launch {
        program: String,
        kind: io::ErrorKind,
        message: String,
    },

    #[error("error reading {stream}: {message}")]
    StreamRead {
        stream: OutputStream,
        kind: io::ErrorKind,
        message: String,
    },

    #[error("error waiting for process exit: {message}")]
    Wait { kind: io::ErrorKind, message: String },
}

impl SessionFailure {
    pub fn stream_read(stream: OutputStream, err: &io::Error) -> Self {
        SessionFailure::StreamRead {
            stream,
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub fn wait(err: &io::Error) -> Self {
        SessionFailure::Wait {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// The `io::ErrorKind` of the underlying cause.
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            SessionFailure::Launch { kind, .. }
            | SessionFailure::StreamRead { kind, .. }
            | SessionFailure::Wait { kind, .. } => *kind,
        }
    }
}

/// Lifecycle of an execution session.
///
/// Transitions only move forward:
/// `Initialized -> Running -> Completed | Failed`, or
/// `Initialized -> Failed` when the process never starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionState {
    Initialized,
    Running,
    /// The process exited on its own. Only `exit_code == 0` counts as success.
    Completed { exit_code: i32 },
    Failed(SessionFailure),
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionState::Completed { .. } | ExecutionState::Failed(_)
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionState::Completed { exit_code: 0 })
    }

    pub fn is_running_or_initialized(&self) -> bool {
        matches!(self, ExecutionState::Initialized | ExecutionState::Running)
    }

    /// Position in the lifecycle; used to reject backwards transitions.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            ExecutionState::Initialized => 0,
            ExecutionState::Running => 1,
            ExecutionState::Completed { .. } | ExecutionState::Failed(_) => 2,
        }
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionState::Initialized => f.write_str("initialized"),
            ExecutionState::Running => f.write_str("running"),
            ExecutionState::Completed { exit_code } => write!(f, "completed (exit code {exit_code})"),
            ExecutionState::Failed(cause) => write!(f, "failed: {cause}"),
        }
    }
}

/// Running reduction of a session's output into displayable text.
///
/// The session itself keeps no history; consumers that want a transcript
/// fold the lines they observe into one of these.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    lines: Vec<OutputLine>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: OutputLine) {
        self.lines.push(line);
    }

    pub fn lines(&self) -> &[OutputLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Text of every line from one stream, in arrival order.
    pub fn stream_text(&self, stream: OutputStream) -> Vec<&str> {
        self.lines
            .iter()
            .filter(|l| l.stream == stream)
            .map(|l| l.text.as_str())
            .collect()
    }

    /// All lines joined with `\n`, in arrival order.
    pub fn render(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
