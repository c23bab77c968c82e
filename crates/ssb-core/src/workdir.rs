use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::{backend::BackendKind, domain::UserId, Result};

/// Isolated per-attempt working area handed to a backend client for its own
/// local state. Never shared across users or attempts.
///
/// Removal happens on explicit `close()` (idempotent) with Drop as the
/// backstop, so abandoned sessions cannot leak directories.
#[derive(Debug)]
pub struct Workdir {
    dir: Option<TempDir>,
}

impl Workdir {
    /// Create a fresh working area under `root`, named after the attempt.
    pub fn create(root: &Path, kind: BackendKind, user_id: UserId) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-{}-", kind.as_str(), user_id.0))
            .tempdir_in(root)?;
        Ok(Self { dir: Some(dir) })
    }

    pub fn path(&self) -> PathBuf {
        match &self.dir {
            Some(d) => d.path().to_path_buf(),
            None => PathBuf::new(),
        }
    }

    /// Remove the working area. Safe to call more than once; failures are
    /// logged and swallowed per the cleanup policy.
    pub fn close(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                eprintln!("[CLEANUP] could not remove workdir {}: {e}", path.display());
            }
        }
    }
}
