//! Engine Module
//!
//! The storage engine the access layer sits in front of.
//!
//! ## Responsibilities
//! - Define the interface the access layer consumes ([`StorageEngine`],
//!   [`EngineCursor`], [`EngineProvider`])
//! - Bundle one backend, [`LogEngine`], so the layer can be used and tested
//!
//! ## Contract
//! - Engines are shared across worker threads (`Send + Sync`); every method
//!   takes `&self`.
//! - Reads are consistent under a [`SnapshotToken`]: a cursor or read that
//!   names a snapshot never observes writes made after it was taken.
//! - `write()` applies a batch atomically; later ops on the same key win.
//! - Errors are reported as [`EngineError`](crate::error::EngineError) in the
//!   engine's own wording; the access layer converts them.

mod cursor;
mod lock;
mod log_engine;
pub mod memtable;
pub mod wal;

use std::sync::Arc;

use bytes::Bytes;

use crate::config::{OpenOptions, WriteOptions};
use crate::error::EngineResult;
use crate::registry::StorageLocation;

pub use cursor::TableCursor;
pub use lock::LockGuard;
pub use log_engine::{LogEngine, LogEngineProvider};

/// A pinned point-in-time view inside an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SnapshotToken {
    /// Engine-unique id of this pin
    pub id: u64,
    /// Sequence number the view is pinned at
    pub sequence: u64,
}

/// One buffered write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: Bytes, value: Bytes },
    Delete { key: Bytes },
}

impl BatchOp {
    pub fn put(key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Self {
        BatchOp::Put {
            key: Bytes::copy_from_slice(key.as_ref()),
            value: Bytes::copy_from_slice(value.as_ref()),
        }
    }

    pub fn delete(key: impl AsRef<[u8]>) -> Self {
        BatchOp::Delete {
            key: Bytes::copy_from_slice(key.as_ref()),
        }
    }

    pub fn key(&self) -> &Bytes {
        match self {
            BatchOp::Put { key, .. } | BatchOp::Delete { key } => key,
        }
    }
}

/// Read options as the engine sees them
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineReadOptions {
    pub fill_cache: bool,
    /// Read at this snapshot, or at the latest state if `None`
    pub snapshot: Option<SnapshotToken>,
}

/// An open engine instance
pub trait StorageEngine: Send + Sync {
    /// Point read; a missing key is `EngineError::NotFound`
    fn get(&self, options: &EngineReadOptions, key: &[u8]) -> EngineResult<Bytes>;

    fn put(&self, options: &WriteOptions, key: &[u8], value: &[u8]) -> EngineResult<()>;

    fn delete(&self, options: &WriteOptions, key: &[u8]) -> EngineResult<()>;

    /// Apply every op atomically
    fn write(&self, options: &WriteOptions, ops: &[BatchOp]) -> EngineResult<()>;

    fn new_cursor(&self, options: &EngineReadOptions) -> Box<dyn EngineCursor>;

    fn new_snapshot(&self) -> SnapshotToken;

    fn release_snapshot(&self, token: SnapshotToken);

    /// Approximate bytes used by keys in `[start, end)`
    fn approximate_size(&self, start: &[u8], end: &[u8]) -> u64;

    /// Compact the key range `[start, end]`; `None` means unbounded
    fn compact_range(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> EngineResult<()>;

    /// Engine property by name, `None` if unknown
    fn property(&self, name: &str) -> Option<String>;

    /// Flush and release the store. Called once, by the last holder.
    fn close(&self) -> EngineResult<()>;
}

/// Positioned cursor over an engine view
///
/// Movement on an invalid cursor leaves it invalid. `key()`/`value()` must
/// only be called while `valid()`.
pub trait EngineCursor: Send {
    fn valid(&self) -> bool;

    fn seek_to_first(&mut self);

    fn seek_to_last(&mut self);

    /// Position at the first key at or after `target`
    fn seek(&mut self, target: &[u8]);

    fn next(&mut self);

    fn prev(&mut self);

    fn key(&self) -> Bytes;

    fn value(&self) -> Bytes;

    fn status(&self) -> EngineResult<()>;
}

/// Opens, destroys and repairs stores at a location
pub trait EngineProvider: Send + Sync {
    fn open(
        &self,
        location: &StorageLocation,
        options: &OpenOptions,
    ) -> EngineResult<Arc<dyn StorageEngine>>;

    fn destroy(&self, location: &StorageLocation) -> EngineResult<()>;

    fn repair(&self, location: &StorageLocation) -> EngineResult<()>;
}
