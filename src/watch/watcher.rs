// src/watch/watcher.rs

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::engine::RuntimeEvent;
use crate::fs::FileSystem;
use crate::watch::event_handler::process_file_change;
use crate::watch::hash::ContentTracker;

/// Handle for the filesystem watcher.
///
/// Keeps the underlying `RecommendedWatcher` alive. Dropping this handle
/// stops watching.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// Watch `script` and send `RuntimeEvent::RunRequested` whenever its content
/// changes.
///
/// - The parent directory is watched non-recursively, so replace-by-rename
///   saves are seen too.
/// - `initial_content` is the content of the run already requested; saving
///   the same content again does not trigger.
pub fn spawn_script_watcher(
    script: impl Into<PathBuf>,
    initial_content: &str,
    fs: Arc<dyn FileSystem>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) -> Result<WatcherHandle> {
    let script = script.into();
    let script = std::path::absolute(&script)
        .with_context(|| format!("resolving script path {:?}", script))?;
    let dir = script
        .parent()
        .map(|p| p.to_path_buf())
        .context("script path has no parent directory")?;

    // Channel from the blocking notify callback into the async world.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if let Err(err) = event_tx.send(event) {
                    // tracing may already be torn down here; fall back to stderr.
                    eprintln!("scriptrun: failed to forward notify event: {err}");
                }
            }
            Err(err) => {
                eprintln!("scriptrun: file watch error: {err}");
            }
        },
        Config::default(),
    )?;

    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("watching {:?}", dir))?;

    info!(path = %script.display(), "watching script for changes");

    let mut tracker = ContentTracker::seeded(initial_content);

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if matches!(event.kind, EventKind::Access(_)) {
                continue;
            }
            debug!(?event, "received notify event");

            for path in &event.paths {
                process_file_change(fs.as_ref(), &script, path, &mut tracker, &runtime_tx).await;
            }
        }
        debug!("watcher event loop finished");
    });

    Ok(WatcherHandle { _inner: watcher })
}
