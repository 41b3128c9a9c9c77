use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, DuplexStream, ReadBuf};

use scriptrun::errors::Result;
use scriptrun::exec::{
    BoxedReader, CommandSpec, ExecutionSession, LaunchError, ProcessFuture, ProcessHandle,
    ProcessLauncher, RunningProcess, ScriptRunner, SessionOptions,
};
use scriptrun::types::Script;

/// Behaviour of one fake output pipe.
#[derive(Debug, Clone)]
pub enum FakeStream {
    /// Yields these bytes, then EOF.
    Bytes(Vec<u8>),
    /// Yields these bytes, then every read fails with `kind`.
    FailAfter(Vec<u8>, io::ErrorKind),
    /// Never yields anything; reaches EOF only once the process is killed.
    Pending,
}

/// How the fake process ends.
#[derive(Debug, Clone, Copy)]
pub enum FakeExit {
    Code(i32),
    /// `wait` never resolves; only `kill` ends the process.
    UntilKilled,
    /// `wait` fails with this error.
    WaitError(io::ErrorKind),
}

/// A scripted process description.
#[derive(Debug, Clone)]
pub struct FakeProcess {
    pub stdout: FakeStream,
    pub stderr: FakeStream,
    pub exit: FakeExit,
}

impl FakeProcess {
    /// No output, exit code 0.
    pub fn new() -> Self {
        Self {
            stdout: FakeStream::Bytes(Vec::new()),
            stderr: FakeStream::Bytes(Vec::new()),
            exit: FakeExit::Code(0),
        }
    }

    pub fn stdout(mut self, text: &str) -> Self {
        self.stdout = FakeStream::Bytes(text.as_bytes().to_vec());
        self
    }

    pub fn stderr(mut self, text: &str) -> Self {
        self.stderr = FakeStream::Bytes(text.as_bytes().to_vec());
        self
    }

    pub fn stdout_stream(mut self, stream: FakeStream) -> Self {
        self.stdout = stream;
        self
    }

    pub fn stderr_stream(mut self, stream: FakeStream) -> Self {
        self.stderr = stream;
        self
    }

    pub fn exit_code(mut self, code: i32) -> Self {
        self.exit = FakeExit::Code(code);
        self
    }

    pub fn until_killed(mut self) -> Self {
        self.exit = FakeExit::UntilKilled;
        self
    }

    pub fn wait_fails(mut self, kind: io::ErrorKind) -> Self {
        self.exit = FakeExit::WaitError(kind);
        self
    }
}

impl Default for FakeProcess {
    fn default() -> Self {
        Self::new()
    }
}

/// Launcher handing out scripted in-memory processes.
///
/// Clones share the recorded commands and kill counter.
#[derive(Debug, Clone)]
pub struct FakeLauncher {
    process: FakeProcess,
    launch_error: Option<io::ErrorKind>,
    launched: Arc<Mutex<Vec<CommandSpec>>>,
    kills: Arc<AtomicUsize>,
}

impl FakeLauncher {
    pub fn new(process: FakeProcess) -> Self {
        Self {
            process,
            launch_error: None,
            launched: Arc::new(Mutex::new(Vec::new())),
            kills: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every launch fails with `kind`.
    pub fn failing(kind: io::ErrorKind) -> Self {
        let mut launcher = Self::new(FakeProcess::new());
        launcher.launch_error = Some(kind);
        launcher
    }

    /// Commands passed to `launch`, in order (including failed launches).
    pub fn launched(&self) -> Vec<CommandSpec> {
        self.launched.lock().unwrap().clone()
    }

    /// How many times a launched process was killed.
    pub fn kill_count(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }
}

impl ProcessLauncher for FakeLauncher {
    fn launch(&self, command: &CommandSpec) -> std::result::Result<RunningProcess, LaunchError> {
        self.launched.lock().unwrap().push(command.clone());

        if let Some(kind) = self.launch_error {
            return Err(LaunchError::new(command, io::Error::from(kind)));
        }

        let mut held = Vec::new();
        let stdout = make_reader(&self.process.stdout, &mut held);
        let stderr = make_reader(&self.process.stderr, &mut held);

        Ok(RunningProcess {
            pid: None,
            stdout: Some(stdout),
            stderr: Some(stderr),
            handle: Box::new(FakeHandle {
                exit: self.process.exit,
                held,
                kills: Arc::clone(&self.kills),
            }),
        })
    }
}

fn make_reader(stream: &FakeStream, held: &mut Vec<DuplexStream>) -> BoxedReader {
    match stream {
        FakeStream::Bytes(bytes) => Box::pin(io::Cursor::new(bytes.clone())),
        FakeStream::FailAfter(bytes, kind) => Box::pin(FailingReader {
            prefix: io::Cursor::new(bytes.clone()),
            kind: *kind,
        }),
        FakeStream::Pending => {
            let (writer, reader) = tokio::io::duplex(64);
            held.push(writer);
            Box::pin(reader)
        }
    }
}

struct FakeHandle {
    exit: FakeExit,
    /// Write halves of pending pipes; dropping them closes the pipes.
    held: Vec<DuplexStream>,
    kills: Arc<AtomicUsize>,
}

impl ProcessHandle for FakeHandle {
    fn wait(&mut self) -> ProcessFuture<'_, i32> {
        let exit = self.exit;
        Box::pin(async move {
            match exit {
                FakeExit::Code(code) => Ok(code),
                FakeExit::WaitError(kind) => Err(io::Error::from(kind)),
                FakeExit::UntilKilled => std::future::pending().await,
            }
        })
    }

    fn kill(&mut self) -> ProcessFuture<'_, ()> {
        Box::pin(async move {
            self.kills.fetch_add(1, Ordering::SeqCst);
            self.held.clear();
            self.exit = FakeExit::Code(137);
            Ok(())
        })
    }
}

/// Reader that yields `prefix`, then fails every read with `kind`.
pub struct FailingReader {
    prefix: io::Cursor<Vec<u8>>,
    kind: io::ErrorKind,
}

impl AsyncRead for FailingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.prefix).poll_read(cx, buf);
        if buf.filled().len() > before {
            return poll;
        }
        Poll::Ready(Err(io::Error::from(self.kind)))
    }
}

/// `ScriptRunner` that builds sessions on a [`FakeLauncher`] without
/// touching the filesystem. The command is `fake-interpreter <content>`.
#[derive(Debug, Clone)]
pub struct FakeRunner {
    launcher: FakeLauncher,
    options: SessionOptions,
    scripts: Arc<Mutex<Vec<Script>>>,
    fail_prepare: bool,
}

impl FakeRunner {
    pub fn new(launcher: FakeLauncher) -> Self {
        Self {
            launcher,
            options: SessionOptions::default(),
            scripts: Arc::new(Mutex::new(Vec::new())),
            fail_prepare: false,
        }
    }

    /// Every `prepare_session` fails, as if the scratch file could not be written.
    pub fn failing_prepare(mut self) -> Self {
        self.fail_prepare = true;
        self
    }

    pub fn launcher(&self) -> &FakeLauncher {
        &self.launcher
    }

    pub fn scripts(&self) -> Vec<Script> {
        self.scripts.lock().unwrap().clone()
    }
}

impl ScriptRunner for FakeRunner {
    fn prepare_session(&self, script: Script) -> Result<ExecutionSession> {
        if self.fail_prepare {
            return Err(anyhow::anyhow!("scratch file could not be written").into());
        }

        let command = CommandSpec::new("fake-interpreter").arg(script.content());
        self.scripts.lock().unwrap().push(script);

        Ok(ExecutionSession::new(
            command,
            Arc::new(self.launcher.clone()),
            self.options.clone(),
        ))
    }
}
