// src/watch/hash.rs

//! Content hashing used to skip file events that did not change the script.

use blake3::Hasher;

/// Hex-encoded blake3 hash of a script's text.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(content.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Remembers the hash of the last script content that was run.
#[derive(Debug, Clone, Default)]
pub struct ContentTracker {
    last: Option<String>,
}

impl ContentTracker {
    /// Start from content that has already been run.
    pub fn seeded(content: &str) -> Self {
        Self {
            last: Some(content_hash(content)),
        }
    }

    /// Record `content`; returns true if it differs from the last recorded
    /// content (i.e. a re-run is warranted).
    pub fn observe(&mut self, content: &str) -> bool {
        let hash = content_hash(content);
        if self.last.as_deref() == Some(hash.as_str()) {
            return false;
        }
        self.last = Some(hash);
        true
    }
}
