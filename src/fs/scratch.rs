// src/fs/scratch.rs

//! Temp-file protocol for submitted scripts.
//!
//! Every run gets its own file `<prefix><random>.<extension>` inside the
//! scratch directory. The random suffix is the only uniqueness guarantee;
//! collisions are not checked.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::fs::FileSystem;
use crate::types::Script;

#[derive(Clone)]
pub struct ScriptFileStore {
    fs: Arc<dyn FileSystem>,
    dir: PathBuf,
    prefix: String,
    extension: String,
}

impl fmt::Debug for ScriptFileStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptFileStore")
            .field("dir", &self.dir)
            .field("prefix", &self.prefix)
            .field("extension", &self.extension)
            .finish_non_exhaustive()
    }
}

impl ScriptFileStore {
    /// Create a store rooted at `dir`, made absolute against the current
    /// working directory so the interpreter gets an absolute script path.
    pub fn new(
        fs: Arc<dyn FileSystem>,
        dir: impl AsRef<Path>,
        prefix: impl Into<String>,
        extension: impl Into<String>,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        let dir = std::path::absolute(dir)
            .with_context(|| format!("resolving scratch dir {:?}", dir))?;

        Ok(Self {
            fs,
            dir,
            prefix: prefix.into(),
            extension: extension.into(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// A fresh, not yet written, path for the next script.
    pub fn next_path(&self) -> PathBuf {
        let suffix: u32 = rand::random();
        let name = if self.extension.is_empty() {
            format!("{}{}", self.prefix, suffix)
        } else {
            format!("{}{}.{}", self.prefix, suffix, self.extension)
        };
        self.dir.join(name)
    }

    /// Write the script text to a new file and return its absolute path.
    pub fn materialize(&self, script: &Script) -> Result<PathBuf> {
        let path = self.next_path();
        self.fs
            .write(&path, script.content().as_bytes())
            .with_context(|| format!("writing script to {:?}", path))?;
        debug!(path = %path.display(), bytes = script.content().len(), "script materialized");
        Ok(path)
    }

    /// Remove a file created by [`materialize`](Self::materialize).
    ///
    /// Failures are logged, not returned: cleanup runs detached from any
    /// caller that could act on them.
    pub fn discard(&self, path: &Path) {
        match self.fs.remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "script file removed"),
            Err(err) => warn!(path = %path.display(), error = %err, "failed to remove script file"),
        }
    }
}
