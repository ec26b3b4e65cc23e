//! Configuration for atlasgate
//!
//! Centralized configuration with sensible defaults.
//!
//! - [`OpenOptions`]: how a store is opened (passed to the engine)
//! - [`RangeOptions`]: bounds, direction and batching for iterators and `clear()`
//! - [`ReadOptions`] / [`WriteOptions`]: per-call read and write knobs
//! - [`EnvConfig`]: the calling-context environment (worker pool size)

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::db::Snapshot;

/// Options used when opening a store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenOptions {
    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------
    /// Create the store if it does not exist
    pub create_if_missing: bool,

    /// Fail the open if the store already exists
    pub error_if_exists: bool,

    /// Share one engine handle between every database opened on the same
    /// location with this flag set
    pub multithreading: bool,

    // -------------------------------------------------------------------------
    // Engine Tuning
    // -------------------------------------------------------------------------
    pub compression: bool,

    /// Block cache size (in bytes)
    pub cache_size: usize,

    /// Bytes buffered in memory before they are folded into a checkpoint
    pub write_buffer_size: usize,

    pub block_size: usize,

    pub max_open_files: usize,

    pub block_restart_interval: usize,

    pub max_file_size: usize,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: false,
            multithreading: false,
            compression: true,
            cache_size: 8 * 1024 * 1024,        // 8 MB
            write_buffer_size: 4 * 1024 * 1024, // 4 MB
            block_size: 4096,
            max_open_files: 1000,
            block_restart_interval: 16,
            max_file_size: 2 * 1024 * 1024, // 2 MB
        }
    }
}

impl OpenOptions {
    /// Create a new options builder
    pub fn builder() -> OpenOptionsBuilder {
        OpenOptionsBuilder::default()
    }
}

/// Builder for OpenOptions
#[derive(Default)]
pub struct OpenOptionsBuilder {
    options: OpenOptions,
}

impl OpenOptionsBuilder {
    pub fn create_if_missing(mut self, yes: bool) -> Self {
        self.options.create_if_missing = yes;
        self
    }

    pub fn error_if_exists(mut self, yes: bool) -> Self {
        self.options.error_if_exists = yes;
        self
    }

    /// Enable handle sharing across databases on the same location
    pub fn multithreading(mut self, yes: bool) -> Self {
        self.options.multithreading = yes;
        self
    }

    pub fn compression(mut self, yes: bool) -> Self {
        self.options.compression = yes;
        self
    }

    /// Set the block cache size (in bytes)
    pub fn cache_size(mut self, bytes: usize) -> Self {
        self.options.cache_size = bytes;
        self
    }

    /// Set the write buffer size (in bytes)
    pub fn write_buffer_size(mut self, bytes: usize) -> Self {
        self.options.write_buffer_size = bytes;
        self
    }

    pub fn block_size(mut self, bytes: usize) -> Self {
        self.options.block_size = bytes;
        self
    }

    pub fn max_open_files(mut self, count: usize) -> Self {
        self.options.max_open_files = count;
        self
    }

    pub fn block_restart_interval(mut self, interval: usize) -> Self {
        self.options.block_restart_interval = interval;
        self
    }

    pub fn max_file_size(mut self, bytes: usize) -> Self {
        self.options.max_file_size = bytes;
        self
    }

    pub fn build(self) -> OpenOptions {
        self.options
    }
}

/// Default byte budget for one iterator batch or one `clear()` round
pub const DEFAULT_HIGH_WATER_MARK: usize = 16 * 1024;

/// Range, direction and batching options for iterators and `clear()`
///
/// `lte` takes precedence over `lt` and `gte` over `gt`.
#[derive(Debug, Clone)]
pub struct RangeOptions {
    pub reverse: bool,
    /// Maximum number of entries to visit (`None` = unlimited)
    pub limit: Option<usize>,
    pub lt: Option<Bytes>,
    pub lte: Option<Bytes>,
    pub gt: Option<Bytes>,
    pub gte: Option<Bytes>,
    /// Include keys in iterator entries
    pub keys: bool,
    /// Include values in iterator entries
    pub values: bool,
    pub fill_cache: bool,
    /// Stop a batch once this many key/value bytes were collected
    pub high_water_mark_bytes: usize,
    /// Read from an explicit snapshot instead of an implicit one
    pub snapshot: Option<Snapshot>,
}

impl Default for RangeOptions {
    fn default() -> Self {
        Self {
            reverse: false,
            limit: None,
            lt: None,
            lte: None,
            gt: None,
            gte: None,
            keys: true,
            values: true,
            fill_cache: false,
            high_water_mark_bytes: DEFAULT_HIGH_WATER_MARK,
            snapshot: None,
        }
    }
}

impl RangeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reverse(mut self, yes: bool) -> Self {
        self.reverse = yes;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn lt(mut self, key: impl AsRef<[u8]>) -> Self {
        self.lt = Some(Bytes::copy_from_slice(key.as_ref()));
        self
    }

    pub fn lte(mut self, key: impl AsRef<[u8]>) -> Self {
        self.lte = Some(Bytes::copy_from_slice(key.as_ref()));
        self
    }

    pub fn gt(mut self, key: impl AsRef<[u8]>) -> Self {
        self.gt = Some(Bytes::copy_from_slice(key.as_ref()));
        self
    }

    pub fn gte(mut self, key: impl AsRef<[u8]>) -> Self {
        self.gte = Some(Bytes::copy_from_slice(key.as_ref()));
        self
    }

    pub fn keys(mut self, yes: bool) -> Self {
        self.keys = yes;
        self
    }

    pub fn values(mut self, yes: bool) -> Self {
        self.values = yes;
        self
    }

    pub fn fill_cache(mut self, yes: bool) -> Self {
        self.fill_cache = yes;
        self
    }

    pub fn high_water_mark_bytes(mut self, bytes: usize) -> Self {
        self.high_water_mark_bytes = bytes;
        self
    }

    pub fn snapshot(mut self, snapshot: &Snapshot) -> Self {
        self.snapshot = Some(snapshot.clone());
        self
    }
}

/// Options for point reads (`get`, `get_many`, `has`, `has_many`)
#[derive(Debug, Clone)]
pub struct ReadOptions {
    pub fill_cache: bool,
    pub snapshot: Option<Snapshot>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            fill_cache: true,
            snapshot: None,
        }
    }
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fill_cache(mut self, yes: bool) -> Self {
        self.fill_cache = yes;
        self
    }

    pub fn snapshot(mut self, snapshot: &Snapshot) -> Self {
        self.snapshot = Some(snapshot.clone());
        self
    }
}

/// Options for writes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// fsync the log before the write is acknowledged
    pub sync: bool,
}

impl WriteOptions {
    pub fn sync() -> Self {
        Self { sync: true }
    }
}

/// Configuration for an [`Environment`](crate::Environment)
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Number of background worker threads
    pub worker_threads: usize,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self { worker_threads: 4 }
    }
}

impl EnvConfig {
    /// Create a new config builder
    pub fn builder() -> EnvConfigBuilder {
        EnvConfigBuilder::default()
    }
}

/// Builder for EnvConfig
#[derive(Default)]
pub struct EnvConfigBuilder {
    config: EnvConfig,
}

impl EnvConfigBuilder {
    /// Set the number of worker threads (at least one is always started)
    pub fn worker_threads(mut self, count: usize) -> Self {
        self.config.worker_threads = count;
        self
    }

    pub fn build(self) -> EnvConfig {
        self.config
    }
}
