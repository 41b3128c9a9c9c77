// src/exec/supervisor.rs

//! Session Supervisor: at most one current session.
//!
//! Starting a new run cancels the previous session before the new one is
//! installed. The old session's teardown may still be finishing in the
//! background; it is no longer current, so anything it still does is
//! orphaned.
//!
//! Methods that change the current session take `&mut self`: run requests
//! must come from a single writer.

use tokio::sync::watch;
use tracing::{debug, info};

use crate::errors::Result;
use crate::exec::runner::ScriptRunner;
use crate::exec::session::ExecutionSession;
use crate::types::Script;

pub struct SessionSupervisor<R: ScriptRunner> {
    runner: R,
    current: watch::Sender<Option<ExecutionSession>>,
}

impl<R: ScriptRunner> std::fmt::Debug for SessionSupervisor<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSupervisor")
            .field("current", &*self.current.borrow())
            .finish_non_exhaustive()
    }
}

impl<R: ScriptRunner> SessionSupervisor<R> {
    pub fn new(runner: R) -> Self {
        let (current, _) = watch::channel(None);
        Self { runner, current }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// The current session, if any.
    pub fn current(&self) -> Option<ExecutionSession> {
        self.current.borrow().clone()
    }

    /// Observe which session is current. The receiver sees the present value
    /// immediately and every later replacement.
    pub fn current_session(&self) -> watch::Receiver<Option<ExecutionSession>> {
        self.current.subscribe()
    }

    /// Cancel the current session (if any), then create, install and start a
    /// session for `script`.
    pub fn start_session(&mut self, script: Script) -> Result<ExecutionSession> {
        self.start_session_with(script, |_| {})
    }

    /// Like [`start_session`](Self::start_session), but runs `attach` on the
    /// new session after it became current and before its process starts,
    /// so subscriptions made there see every output line.
    ///
    /// If preparing the run fails, the previous session has already been
    /// cancelled and stays installed.
    pub fn start_session_with<F>(&mut self, script: Script, attach: F) -> Result<ExecutionSession>
    where
        F: FnOnce(&ExecutionSession),
    {
        if let Some(previous) = self.current() {
            debug!(session = %previous.id(), "superseding current session");
            previous.cancel();
        }

        let session = self.runner.prepare_session(script)?;
        self.current.send_replace(Some(session.clone()));
        info!(session = %session.id(), "session installed as current");

        attach(&session);
        session.start()?;

        Ok(session)
    }

    /// Cancel the current session. It stays installed so its final state can
    /// still be read.
    pub fn shutdown(&mut self) -> Option<ExecutionSession> {
        let current = self.current();
        if let Some(session) = &current {
            info!(session = %session.id(), "shutting down current session");
            session.cancel();
        }
        current
    }
}

impl<R: ScriptRunner> Drop for SessionSupervisor<R> {
    fn drop(&mut self) {
        if let Some(session) = self.current.borrow().as_ref() {
            session.cancel();
        }
    }
}
