// src/exec/launcher.rs

//! Process Launcher: turns a [`CommandSpec`] into a running OS process.
//!
//! The session talks to a `ProcessLauncher` instead of `tokio::process`
//! directly. Production code uses [`TokioLauncher`]; tests can provide their
//! own launcher that hands back scripted in-memory processes.

use std::ffi::OsString;
use std::fmt;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};

use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};
use tracing::debug;

use crate::types::SessionFailure;

/// Boxed byte stream from one of the child's output pipes.
pub type BoxedReader = Pin<Box<dyn AsyncRead + Send>>;

/// Future returned by [`ProcessHandle`] methods.
pub type ProcessFuture<'a, T> = Pin<Box<dyn Future<Output = io::Result<T>> + Send + 'a>>;

/// Executable plus argument list. No shell interpretation is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub working_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn program_lossy(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Control over a launched process: wait for its exit code, or kill it.
pub trait ProcessHandle: Send {
    /// Resolve with the exit code once the process has terminated.
    ///
    /// Must be cancel-safe: dropping the future before it resolves leaves the
    /// process running and `wait` can be called again.
    fn wait(&mut self) -> ProcessFuture<'_, i32>;

    /// Force-terminate the process and reap it.
    fn kill(&mut self) -> ProcessFuture<'_, ()>;
}

/// A freshly launched process with its output pipes detached.
pub struct RunningProcess {
    pub pid: Option<u32>,
    pub stdout: Option<BoxedReader>,
    pub stderr: Option<BoxedReader>,
    pub handle: Box<dyn ProcessHandle>,
}

impl fmt::Debug for RunningProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningProcess")
            .field("pid", &self.pid)
            .field("stdout", &self.stdout.is_some())
            .field("stderr", &self.stderr.is_some())
            .finish_non_exhaustive()
    }
}

/// The process could not be started. Terminal for the session; no retries.
#[derive(Error, Debug)]
#[error("spawning '{program}': {source}")]
pub struct LaunchError {
    pub program: String,
    #[source]
    pub source: io::Error,
}

impl LaunchError {
    pub fn new(command: &CommandSpec, source: io::Error) -> Self {
        Self {
            program: command.program_lossy(),
            source,
        }
    }
}

impl From<&LaunchError> for SessionFailure {
    fn from(err: &LaunchError) -> Self {
        SessionFailure::Launch {
            program: err.program.clone(),
            kind: err.source.kind(),
            message: err.source.to_string(),
        }
    }
}

/// Trait abstracting OS process creation.
pub trait ProcessLauncher: Send + Sync + fmt::Debug {
    fn launch(&self, command: &CommandSpec) -> Result<RunningProcess, LaunchError>;
}

/// Launcher backed by `tokio::process::Command`.
///
/// Stdin is closed, stdout/stderr are piped, and the child is killed if its
/// handle is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioLauncher;

impl ProcessLauncher for TokioLauncher {
    fn launch(&self, command: &CommandSpec) -> Result<RunningProcess, LaunchError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| LaunchError::new(command, e))?;
        let pid = child.id();
        debug!(?pid, %command, "process spawned");

        let stdout = child
            .stdout
            .take()
            .map(|s| Box::pin(s) as BoxedReader);
        let stderr = child
            .stderr
            .take()
            .map(|s| Box::pin(s) as BoxedReader);

        Ok(RunningProcess {
            pid,
            stdout,
            stderr,
            handle: Box::new(TokioProcessHandle { child }),
        })
    }
}

struct TokioProcessHandle {
    child: Child,
}

impl ProcessHandle for TokioProcessHandle {
    fn wait(&mut self) -> ProcessFuture<'_, i32> {
        Box::pin(async move {
            let status = self.child.wait().await?;
            Ok(exit_code(status))
        })
    }

    fn kill(&mut self) -> ProcessFuture<'_, ()> {
        Box::pin(async move { self.child.kill().await })
    }
}

/// Numeric exit code of a finished process.
///
/// Codes are passed through as reported. A Unix process ended by a signal
/// has no code; it is reported as `128 + signal` like a shell would.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    -1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_display_joins_arguments() {
        let cmd = CommandSpec::new("kotlinc")
            .arg("-script")
            .arg("/tmp/temp42.kts");
        assert_eq!(cmd.to_string(), "kotlinc -script /tmp/temp42.kts");
    }

    #[test]
    fn launch_error_converts_to_failure() {
        let cmd = CommandSpec::new("definitely-not-here");
        let err = LaunchError::new(&cmd, io::Error::from(io::ErrorKind::NotFound));
        let failure = SessionFailure::from(&err);
        assert_eq!(failure.kind(), io::ErrorKind::NotFound);
        assert!(matches!(failure, SessionFailure::Launch { ref program, .. } if program == "definitely-not-here"));
    }

    #[cfg(unix)]
    #[test]
    fn signal_exit_is_reported_shell_style() {
        use std::os::unix::process::ExitStatusExt;
        // Raw wait status for "killed by SIGKILL".
        let status = ExitStatus::from_raw(9);
        assert_eq!(exit_code(status), 137);

        let status = ExitStatus::from_raw(3 << 8);
        assert_eq!(exit_code(status), 3);
    }

    #[tokio::test]
    async fn missing_executable_is_a_launch_error() {
        let cmd = CommandSpec::new("/nonexistent/scriptrun-interpreter");
        let err = TokioLauncher.launch(&cmd).unwrap_err();
        assert_eq!(err.source.kind(), io::ErrorKind::NotFound);
        assert_eq!(err.program, "/nonexistent/scriptrun-interpreter");
    }
}
