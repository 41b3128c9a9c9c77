// src/engine/presenter.rs

//! Streams one session's output and final state to an [`OutputSink`].

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::debug;

use crate::exec::ExecutionSession;
use crate::types::{ExecutionState, OutputLine, OutputStream, SessionId, Transcript};

/// Where a presenter delivers what it observes.
pub trait OutputSink: Send + Sync {
    fn line(&self, line: &OutputLine);

    /// Called once per session that stopped on its own (not cancelled).
    fn finished(&self, session: SessionId, state: &ExecutionState);
}

/// Writes script stdout to stdout and script stderr plus status to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink;

impl OutputSink for ConsoleSink {
    fn line(&self, line: &OutputLine) {
        let res = match line.stream {
            OutputStream::Stdout => writeln!(std::io::stdout().lock(), "{}", line.text),
            OutputStream::Stderr => writeln!(std::io::stderr().lock(), "{}", line.text),
        };
        if let Err(err) = res {
            debug!(error = %err, "failed to write output line to console");
        }
    }

    fn finished(&self, _session: SessionId, state: &ExecutionState) {
        match state {
            ExecutionState::Failed(cause) => eprintln!("execution failed: {cause}"),
            ExecutionState::Completed { exit_code } if *exit_code != 0 => {
                eprintln!("exit code: {exit_code}")
            }
            _ => {}
        }
    }
}

/// Collects everything in memory; used by tests and embedders.
#[derive(Debug, Default)]
pub struct TranscriptSink {
    transcript: Mutex<Transcript>,
    finished: Mutex<Vec<(SessionId, ExecutionState)>>,
}

impl TranscriptSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transcript(&self) -> Transcript {
        self.transcript
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn finished_sessions(&self) -> Vec<(SessionId, ExecutionState)> {
        self.finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl OutputSink for TranscriptSink {
    fn line(&self, line: &OutputLine) {
        self.transcript
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.clone());
    }

    fn finished(&self, session: SessionId, state: &ExecutionState) {
        self.finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((session, state.clone()));
    }
}

/// Forward `outputs` to `sink` until the session's work has stopped, then
/// report the final state and return it.
///
/// `outputs` should be subscribed before the session starts, otherwise early
/// lines are missed. Every line published after subscribing is delivered;
/// a slow sink slows the session's readers down instead. Cancelled sessions
/// are not reported to the sink.
pub async fn present_session(
    session: ExecutionSession,
    mut outputs: mpsc::Receiver<OutputLine>,
    sink: Arc<dyn OutputSink>,
) -> ExecutionState {
    let id = session.id();

    let mut lines = 0u64;
    while let Some(line) = outputs.recv().await {
        sink.line(&line);
        lines += 1;
    }
    let state = session.finished().await;
    debug!(session = %id, lines, %state, "session output complete");

    if session.is_cancelled() && !state.is_terminal() {
        debug!(session = %id, "session cancelled before finishing");
    } else {
        sink.finished(id, &state);
    }

    state
}
