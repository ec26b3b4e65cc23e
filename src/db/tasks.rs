//! Database Tasks
//!
//! The closed set of [`AsyncTask`] bodies behind the database operations.
//! Each task owns its inputs (keys, values, engine handle, cursor) so it can
//! run on a worker; conversion of the outcome happens in the database on
//! the calling context.

use std::sync::Arc;

use bytes::Bytes;

use super::range::{Entry, RangeCursor};
use crate::config::{OpenOptions, WriteOptions};
use crate::engine::{BatchOp, EngineProvider, EngineReadOptions, SnapshotToken, StorageEngine};
use crate::error::EngineResult;
use crate::registry::{HandleRegistry, StorageHandle, StorageLocation};
use crate::runtime::AsyncTask;

// =============================================================================
// Lifecycle
// =============================================================================

/// Acquire a handle through the registry
pub(crate) struct OpenTask {
    pub registry: Arc<HandleRegistry>,
    pub provider: Arc<dyn EngineProvider>,
    pub location: StorageLocation,
    pub options: OpenOptions,
}

impl AsyncTask for OpenTask {
    type Output = StorageHandle;

    fn execute(&mut self) -> EngineResult<StorageHandle> {
        self.registry
            .acquire(&self.location, &self.options, self.provider.as_ref())
    }
}

/// Give a handle back to the registry
pub(crate) struct CloseTask {
    pub registry: Arc<HandleRegistry>,
    pub handle: Option<StorageHandle>,
}

impl AsyncTask for CloseTask {
    type Output = ();

    fn execute(&mut self) -> EngineResult<()> {
        match self.handle.take() {
            Some(handle) => self.registry.release(handle),
            None => Ok(()),
        }
    }
}

enum LocationOp {
    Destroy,
    Repair,
}

/// Destroy or repair a store that is not open
pub(crate) struct LocationTask {
    provider: Arc<dyn EngineProvider>,
    location: StorageLocation,
    op: LocationOp,
}

impl LocationTask {
    pub fn destroy(provider: Arc<dyn EngineProvider>, location: StorageLocation) -> Self {
        Self {
            provider,
            location,
            op: LocationOp::Destroy,
        }
    }

    pub fn repair(provider: Arc<dyn EngineProvider>, location: StorageLocation) -> Self {
        Self {
            provider,
            location,
            op: LocationOp::Repair,
        }
    }
}

impl AsyncTask for LocationTask {
    type Output = ();

    fn execute(&mut self) -> EngineResult<()> {
        match self.op {
            LocationOp::Destroy => self.provider.destroy(&self.location),
            LocationOp::Repair => self.provider.repair(&self.location),
        }
    }
}

// =============================================================================
// Point Reads
// =============================================================================

/// Snapshot a point read resolves against
///
/// An implicit snapshot is taken when the task is built, on the calling
/// context, and released as soon as the body has run.
pub(crate) struct ReadView {
    engine: Arc<dyn StorageEngine>,
    fill_cache: bool,
    snapshot: SnapshotToken,
    implicit: bool,
}

impl ReadView {
    pub fn new(engine: Arc<dyn StorageEngine>, fill_cache: bool, explicit: Option<SnapshotToken>) -> Self {
        let (snapshot, implicit) = match explicit {
            Some(token) => (token, false),
            None => (engine.new_snapshot(), true),
        };
        Self {
            engine,
            fill_cache,
            snapshot,
            implicit,
        }
    }

    fn options(&self) -> EngineReadOptions {
        EngineReadOptions {
            fill_cache: self.fill_cache,
            snapshot: Some(self.snapshot),
        }
    }

    fn release(&mut self) {
        if self.implicit {
            self.implicit = false;
            self.engine.release_snapshot(self.snapshot);
        }
    }
}

impl Drop for ReadView {
    fn drop(&mut self) {
        self.release();
    }
}

pub(crate) struct GetTask {
    pub view: ReadView,
    pub key: Bytes,
}

impl AsyncTask for GetTask {
    type Output = Option<Bytes>;

    fn execute(&mut self) -> EngineResult<Option<Bytes>> {
        let result = self.view.engine.get(&self.view.options(), &self.key);
        self.view.release();
        result.map(Some)
    }

    fn absent(&self) -> Option<Option<Bytes>> {
        Some(None)
    }
}

pub(crate) struct GetManyTask {
    pub view: ReadView,
    pub keys: Vec<Bytes>,
}

impl AsyncTask for GetManyTask {
    type Output = Vec<Option<Bytes>>;

    fn execute(&mut self) -> EngineResult<Vec<Option<Bytes>>> {
        let options = self.view.options();
        let mut values = Vec::with_capacity(self.keys.len());

        for key in &self.keys {
            match self.view.engine.get(&options, key) {
                Ok(value) => values.push(Some(value)),
                Err(e) if e.is_not_found() => values.push(None),
                Err(e) => {
                    self.view.release();
                    return Err(e);
                }
            }
        }

        self.view.release();
        Ok(values)
    }
}

/// Existence checks through an exact cursor seek
pub(crate) struct HasManyTask {
    pub view: ReadView,
    pub keys: Vec<Bytes>,
}

impl AsyncTask for HasManyTask {
    type Output = Vec<bool>;

    fn execute(&mut self) -> EngineResult<Vec<bool>> {
        let mut cursor = self.view.engine.new_cursor(&self.view.options());
        let mut found = Vec::with_capacity(self.keys.len());

        for key in &self.keys {
            cursor.seek(key);
            found.push(cursor.valid() && cursor.key() == *key);
        }

        let status = cursor.status();
        drop(cursor);
        self.view.release();
        status.map(|_| found)
    }
}

// =============================================================================
// Writes
// =============================================================================

/// put, del, batch and chained batch writes
pub(crate) struct WriteTask {
    pub engine: Arc<dyn StorageEngine>,
    pub ops: Vec<BatchOp>,
    pub options: WriteOptions,
}

impl AsyncTask for WriteTask {
    type Output = ();

    fn execute(&mut self) -> EngineResult<()> {
        match self.ops.as_slice() {
            [] => Ok(()),
            [BatchOp::Put { key, value }] => self.engine.put(&self.options, key, value),
            [BatchOp::Delete { key }] => self.engine.delete(&self.options, key),
            ops => self.engine.write(&self.options, ops),
        }
    }
}

/// Delete every key of a range in rounds of at most a high-water-mark of
/// key bytes
pub(crate) struct ClearTask {
    pub engine: Arc<dyn StorageEngine>,
    pub cursor: RangeCursor,
}

impl AsyncTask for ClearTask {
    type Output = ();

    fn execute(&mut self) -> EngineResult<()> {
        let options = WriteOptions { sync: false };
        let high_water_mark = self.cursor.high_water_mark();
        let mut batch = Vec::new();

        self.cursor.seek_to_range();

        let result = loop {
            let mut bytes_read = 0usize;

            while bytes_read <= high_water_mark && self.cursor.valid() && self.cursor.increment() {
                let key = self.cursor.key();
                bytes_read += key.len();
                batch.push(BatchOp::Delete { key });
                self.cursor.advance();
            }

            if let Err(e) = self.cursor.status() {
                break Err(e);
            }
            if batch.is_empty() {
                break Ok(());
            }
            if let Err(e) = self.engine.write(&options, &batch) {
                break Err(e);
            }
            batch.clear();
        };

        self.cursor.close();
        result
    }
}

// =============================================================================
// Maintenance
// =============================================================================

pub(crate) struct ApproximateSizeTask {
    pub engine: Arc<dyn StorageEngine>,
    pub start: Bytes,
    pub end: Bytes,
}

impl AsyncTask for ApproximateSizeTask {
    type Output = u64;

    fn execute(&mut self) -> EngineResult<u64> {
        Ok(self.engine.approximate_size(&self.start, &self.end))
    }
}

pub(crate) struct CompactRangeTask {
    pub engine: Arc<dyn StorageEngine>,
    pub start: Option<Bytes>,
    pub end: Option<Bytes>,
}

impl AsyncTask for CompactRangeTask {
    type Output = ();

    fn execute(&mut self) -> EngineResult<()> {
        self.engine
            .compact_range(self.start.as_deref(), self.end.as_deref())
    }
}

// =============================================================================
// Iteration
// =============================================================================

/// One `next_batch` round of an iterator
pub(crate) struct NextTask {
    pub cursor: RangeCursor,
    pub size: usize,
}

impl AsyncTask for NextTask {
    type Output = Vec<Entry>;

    fn execute(&mut self) -> EngineResult<Vec<Entry>> {
        if !self.cursor.did_seek() {
            self.cursor.seek_to_range();
        }

        let (entries, more) = self.cursor.read_many(self.size);
        if !more {
            self.cursor.status()?;
        }
        Ok(entries)
    }
}
