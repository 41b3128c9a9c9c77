#![allow(dead_code)]

pub use scriptrun_test_utils::{init_tracing, with_timeout};

use tokio::sync::mpsc::{self, error::TryRecvError};

use std::time::Duration;

use scriptrun::engine::{OutputSink, TranscriptSink};
use scriptrun::exec::{ExecutionSession, SessionOptions};
use scriptrun::types::{ExecutionState, OutputLine, OutputStream, SessionId};

/// Everything currently buffered in `rx`, without waiting.
pub fn drain(rx: &mut mpsc::Receiver<OutputLine>) -> Vec<OutputLine> {
    let mut lines = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(line) => lines.push(line),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
        }
    }
    lines
}

/// Receive until the stream ends.
pub async fn collect(mut rx: mpsc::Receiver<OutputLine>) -> Vec<OutputLine> {
    let mut lines = Vec::new();
    while let Some(line) = rx.recv().await {
        lines.push(line);
    }
    lines
}

/// Text of the lines from `stream`, in order.
pub fn texts(lines: &[OutputLine], stream: OutputStream) -> Vec<String> {
    lines
        .iter()
        .filter(|l| l.stream == stream)
        .map(|l| l.text.clone())
        .collect()
}

/// Subscribe, start, wait until finished and return what was published.
pub async fn run_to_end(session: &ExecutionSession) -> Vec<OutputLine> {
    let rx = session.subscribe_outputs();
    session.start().expect("first start succeeds");
    let lines = with_timeout(collect(rx)).await;
    with_timeout(session.finished()).await;
    lines
}

pub fn quick_options() -> SessionOptions {
    SessionOptions {
        drain_timeout: Duration::from_millis(200),
        ..SessionOptions::default()
    }
}

/// Sink that blocks for `delay` on every line, like a slow terminal.
pub struct SlowSink {
    pub inner: TranscriptSink,
    delay: Duration,
}

impl SlowSink {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: TranscriptSink::new(),
            delay,
        }
    }
}

impl OutputSink for SlowSink {
    fn line(&self, line: &OutputLine) {
        std::thread::sleep(self.delay);
        self.inner.line(line);
    }

    fn finished(&self, session: SessionId, state: &ExecutionState) {
        self.inner.finished(session, state);
    }
}
