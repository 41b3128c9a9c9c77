// src/watch/event_handler.rs

//! Turning filesystem events into run requests.

use std::path::Path;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::engine::{RunReason, RuntimeEvent};
use crate::fs::FileSystem;
use crate::types::Script;
use crate::watch::hash::ContentTracker;

/// True if `event_path` names the watched script.
///
/// Only the parent directory is watched, so comparing file names is enough
/// and sidesteps differences in how the platform spells the directory.
pub fn is_script_path(script: &Path, event_path: &Path) -> bool {
    match (script.file_name(), event_path.file_name()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Handle one changed path: if it is the script and its content changed
/// since the last run, request a new run.
///
/// Returns whether a run was requested.
pub async fn process_file_change(
    fs: &dyn FileSystem,
    script: &Path,
    event_path: &Path,
    tracker: &mut ContentTracker,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
) -> bool {
    if !is_script_path(script, event_path) {
        return false;
    }

    // Editors often replace files in several steps; a missing or partial
    // file is picked up by the event that follows.
    let content = match fs.read_to_string(script) {
        Ok(content) => content,
        Err(err) => {
            debug!(path = %script.display(), error = %err, "script not readable; skipping event");
            return false;
        }
    };

    if !tracker.observe(&content) {
        debug!(path = %script.display(), "script content unchanged; skipping");
        return false;
    }

    info!(path = %script.display(), "script changed; requesting re-run");
    runtime_tx
        .send(RuntimeEvent::RunRequested {
            script: Script::new(content),
            reason: RunReason::FileChanged,
        })
        .await
        .is_ok()
}
