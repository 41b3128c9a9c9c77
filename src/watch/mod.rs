// src/watch/mod.rs

//! Re-running the script when its file changes (`--watch`).
//!
//! - [`watcher`] wires up `notify` on the script's directory.
//! - [`event_handler`] filters events down to the script and requests runs.
//! - [`hash`] skips events that leave the content unchanged.

pub mod event_handler;
pub mod hash;
pub mod watcher;

pub use hash::{content_hash, ContentTracker};
pub use watcher::{spawn_script_watcher, WatcherHandle};
