//! Storage Handle Registry
//!
//! Shares one open engine instance per physical location between every
//! database opened on it with `multithreading` enabled.
//!
//! ## Responsibilities
//! - Map each [`StorageLocation`] to its open engine and an open-count
//! - Serialize open/close races behind one mutex
//! - Close the engine exactly once, when the last holder releases it
//!
//! The registry is a value: build one with [`HandleRegistry::new`] and hand
//! the same `Arc` to every environment that should share handles.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::OpenOptions;
use crate::engine::{EngineProvider, StorageEngine};
use crate::error::EngineResult;

/// Identifier of a physical store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageLocation(PathBuf);

impl StorageLocation {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl From<&Path> for StorageLocation {
    fn from(path: &Path) -> Self {
        Self::new(path)
    }
}

impl From<PathBuf> for StorageLocation {
    fn from(path: PathBuf) -> Self {
        Self(path)
    }
}

impl From<&str> for StorageLocation {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// One holder's reference to an open engine
pub struct StorageHandle {
    location: StorageLocation,
    engine: Arc<dyn StorageEngine>,

    /// Registered in the shared map (vs. a private open)
    shared: bool,
}

impl StorageHandle {
    pub fn engine(&self) -> &Arc<dyn StorageEngine> {
        &self.engine
    }

    pub fn location(&self) -> &StorageLocation {
        &self.location
    }

    pub fn is_shared(&self) -> bool {
        self.shared
    }
}

impl fmt::Debug for StorageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageHandle")
            .field("location", &self.location)
            .field("shared", &self.shared)
            .finish()
    }
}

struct SharedEntry {
    engine: Arc<dyn StorageEngine>,
    open_count: usize,
}

/// Map of shared open engines, keyed by location
#[derive(Default)]
pub struct HandleRegistry {
    handles: Mutex<HashMap<StorageLocation, SharedEntry>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a handle on the store at `location`
    ///
    /// With `multithreading` off the registry is bypassed and a private
    /// engine is opened. A failed open never leaves an entry behind.
    pub fn acquire(
        &self,
        location: &StorageLocation,
        options: &OpenOptions,
        provider: &dyn EngineProvider,
    ) -> EngineResult<StorageHandle> {
        if !options.multithreading {
            let engine = provider.open(location, options)?;
            tracing::debug!("opened private handle on {}", location);
            return Ok(StorageHandle {
                location: location.clone(),
                engine,
                shared: false,
            });
        }

        let mut handles = self.handles.lock();

        if let Some(entry) = handles.get_mut(location) {
            entry.open_count += 1;
            tracing::debug!(
                "reusing shared handle on {} (open_count={})",
                location,
                entry.open_count
            );
            return Ok(StorageHandle {
                location: location.clone(),
                engine: Arc::clone(&entry.engine),
                shared: true,
            });
        }

        // Open while holding the lock so concurrent acquires wait for it
        let engine = provider.open(location, options)?;
        handles.insert(
            location.clone(),
            SharedEntry {
                engine: Arc::clone(&engine),
                open_count: 1,
            },
        );
        tracing::debug!("opened shared handle on {} (open_count=1)", location);

        Ok(StorageHandle {
            location: location.clone(),
            engine,
            shared: true,
        })
    }

    /// Give a handle back; the engine closes when its last holder releases
    pub fn release(&self, handle: StorageHandle) -> EngineResult<()> {
        if !handle.shared {
            tracing::debug!("closing private handle on {}", handle.location);
            return handle.engine.close();
        }

        let mut handles = self.handles.lock();
        let Some(entry) = handles.get_mut(&handle.location) else {
            tracing::warn!("release of unregistered handle on {}", handle.location);
            return Ok(());
        };

        entry.open_count = entry.open_count.saturating_sub(1);
        tracing::debug!(
            "released shared handle on {} (open_count={})",
            handle.location,
            entry.open_count
        );

        if entry.open_count > 0 {
            return Ok(());
        }

        match handles.remove(&handle.location) {
            Some(entry) => entry.engine.close(),
            None => Ok(()),
        }
    }

    /// Current open-count of a shared location (`None` if not registered)
    pub fn open_count(&self, location: &StorageLocation) -> Option<usize> {
        self.handles.lock().get(location).map(|e| e.open_count)
    }

    /// Number of shared locations currently open
    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.lock().is_empty()
    }
}
