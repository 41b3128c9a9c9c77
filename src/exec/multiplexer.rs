// src/exec/multiplexer.rs

//! Output Multiplexer: drains a child's stdout and stderr concurrently and
//! forwards every line to every subscriber of the session.
//!
//! Each stream gets its own Tokio task, so a stall on one pipe never holds
//! back the other. Line order is preserved within a stream; interleaving
//! across streams is whatever order the lines arrive in.
//!
//! Delivery is lossless: every subscriber has a bounded queue and a reader
//! waits for room before it reads on. A slow subscriber therefore slows the
//! readers down (and, once the OS pipe fills, the process itself) instead of
//! missing lines.

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, trace, warn};

use crate::exec::launcher::BoxedReader;
use crate::types::{OutputLine, OutputStream, SessionFailure, SessionId};

/// Longest line published in one piece. Longer runs of bytes without a
/// newline are split into several lines of at most this many bytes.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Callback used by a reader task to report an I/O failure to its session.
pub type FailureReporter = Arc<dyn Fn(SessionFailure) + Send + Sync>;

/// Why [`drain_lines`] stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    EndOfStream,
    Cancelled,
}

/// Read `reader` line by line until EOF, awaiting `emit` for every line.
///
/// - Lines are split on `\n`; a trailing `\r` is dropped.
/// - Bytes that are not valid UTF-8 are decoded lossily.
/// - A last line without a terminator is still emitted.
/// - Lines longer than [`MAX_LINE_BYTES`] are split.
/// - Cancellation wins over a pending read or a pending `emit`, and an error
///   that surfaces after cancellation is treated as teardown, not as a
///   failure.
pub async fn drain_lines<R, F, Fut>(
    reader: R,
    cancel: &CancellationToken,
    emit: F,
) -> io::Result<DrainOutcome>
where
    R: AsyncRead + Unpin,
    F: FnMut(String) -> Fut,
    Fut: Future<Output = ()>,
{
    drain_lines_capped(reader, MAX_LINE_BYTES, cancel, emit).await
}

/// [`drain_lines`] with an explicit line length cap (at least 1 byte).
pub async fn drain_lines_capped<R, F, Fut>(
    reader: R,
    max_line: usize,
    cancel: &CancellationToken,
    mut emit: F,
) -> io::Result<DrainOutcome>
where
    R: AsyncRead + Unpin,
    F: FnMut(String) -> Fut,
    Fut: Future<Output = ()>,
{
    let max_line = max_line.max(1);
    let mut reader = BufReader::new(reader);
    let mut buf: Vec<u8> = Vec::with_capacity(256);

    loop {
        let filled = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(DrainOutcome::Cancelled),
            filled = reader.fill_buf() => filled,
        };

        let chunk = match filled {
            Ok(chunk) => chunk,
            Err(_) if cancel.is_cancelled() => return Ok(DrainOutcome::Cancelled),
            Err(err) => return Err(err),
        };

        if chunk.is_empty() {
            if !buf.is_empty() {
                let line = decode_line(&buf);
                if !deliver(cancel, emit(line)).await {
                    return Ok(DrainOutcome::Cancelled);
                }
            }
            return Ok(DrainOutcome::EndOfStream);
        }

        // A full buffer is flushed as soon as the next byte is known not to
        // be its terminator.
        let room = max_line - buf.len();
        let (used, complete) = match chunk.iter().take(room + 1).position(|&b| b == b'\n') {
            Some(newline) => (newline + 1, true),
            None if room == 0 => (0, true),
            None => (chunk.len().min(room), false),
        };
        buf.extend_from_slice(&chunk[..used]);
        reader.consume(used);

        if complete {
            let line = decode_line(&buf);
            buf.clear();
            if !deliver(cancel, emit(line)).await {
                return Ok(DrainOutcome::Cancelled);
            }
        }
    }
}

/// Await one delivery unless the token fires first. Returns false if cancelled.
async fn deliver(cancel: &CancellationToken, delivery: impl Future<Output = ()>) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = delivery => true,
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// Subscriber queues of one session.
///
/// `publish` waits until every live subscriber has room for the line.
/// Subscribers that dropped their receiver are forgotten. After `close`,
/// receivers see the end of the stream once their queue is empty, and new
/// subscribers get an already finished stream.
#[derive(Debug)]
pub(crate) struct OutputFanout {
    capacity: usize,
    subscribers: Mutex<Option<Vec<mpsc::Sender<OutputLine>>>>,
    published: AtomicU64,
}

impl OutputFanout {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: Mutex::new(Some(Vec::new())),
            published: AtomicU64::new(0),
        }
    }

    pub(crate) fn subscribe(&self) -> mpsc::Receiver<OutputLine> {
        let (tx, rx) = mpsc::channel(self.capacity);
        if let Some(subscribers) = self.lock().as_mut() {
            subscribers.push(tx);
        }
        rx
    }

    /// Lines handed to subscribers so far.
    pub(crate) fn published(&self) -> u64 {
        self.published.load(Ordering::Acquire)
    }

    pub(crate) async fn publish(&self, line: OutputLine) {
        let targets = match self.lock().as_ref() {
            Some(subscribers) => subscribers.clone(),
            None => return,
        };

        let mut dropped = false;
        for tx in &targets {
            if tx.send(line.clone()).await.is_err() {
                dropped = true;
            }
        }
        self.published.fetch_add(1, Ordering::AcqRel);

        if dropped {
            if let Some(subscribers) = self.lock().as_mut() {
                subscribers.retain(|tx| !tx.is_closed());
            }
        }
    }

    pub(crate) fn close(&self) {
        self.lock().take();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Vec<mpsc::Sender<OutputLine>>>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fans the output pipes of one process into the session's subscribers.
pub(crate) struct OutputMultiplexer {
    session: SessionId,
    fanout: Arc<OutputFanout>,
    cancel: CancellationToken,
    report: FailureReporter,
}

impl OutputMultiplexer {
    pub(crate) fn new(
        session: SessionId,
        fanout: Arc<OutputFanout>,
        cancel: CancellationToken,
        report: FailureReporter,
    ) -> Self {
        Self {
            session,
            fanout,
            cancel,
            report,
        }
    }

    /// Spawn a reader task for one pipe on the session's tracker.
    pub(crate) fn attach(
        &self,
        tracker: &TaskTracker,
        stream: OutputStream,
        reader: BoxedReader,
    ) -> JoinHandle<()> {
        let session = self.session;
        let fanout = Arc::clone(&self.fanout);
        let cancel = self.cancel.clone();
        let report = Arc::clone(&self.report);

        tracker.spawn(async move {
            let outcome = drain_lines(reader, &cancel, |text| {
                trace!(session = %session, %stream, line = %text, "emitting output");
                let fanout = Arc::clone(&fanout);
                async move {
                    fanout
                        .publish(OutputLine {
                            session,
                            stream,
                            text,
                        })
                        .await
                }
            })
            .await;

            match outcome {
                Ok(DrainOutcome::EndOfStream) => {
                    debug!(session = %session, %stream, "output stream closed");
                }
                Ok(DrainOutcome::Cancelled) => {
                    debug!(session = %session, %stream, "output reader cancelled");
                }
                Err(err) => {
                    warn!(session = %session, %stream, error = %err, "reading output failed");
                    report(SessionFailure::stream_read(stream, &err));
                }
            }
        })
    }
}
