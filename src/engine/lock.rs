//! Store lock file
//!
//! One exclusive fs2 advisory lock on `<location>/LOCK` per open store.
//! The lock is released on Drop.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{EngineError, EngineResult};

const LOCK_FILENAME: &str = "LOCK";

/// Held exclusive lock on a store directory
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl LockGuard {
    /// Take the lock without blocking
    ///
    /// A held lock is reported in the engine's lock wording so the access
    /// layer can classify it.
    pub fn acquire(root: &Path) -> EngineResult<Self> {
        let path = root.join(LOCK_FILENAME);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;

        if file.try_lock_exclusive().is_err() {
            return Err(EngineError::Io(format!(
                "lock {}: already held by process",
                path.display()
            )));
        }

        tracing::trace!("acquired {}", path.display());
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // Unlock errors on drop are ignored; closing the file releases it anyway
        let _ = self.file.unlock();
    }
}
