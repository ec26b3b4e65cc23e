//! LogEngine
//!
//! The bundled storage backend: a multi-version [`MemTable`] made durable by
//! the WAL.
//!
//! ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
//!
//! - **Writes** (put/delete/write/compact/close): serialized by the `writer`
//!   mutex. Sequence assignment, WAL append and the MemTable insert all
//!   happen under it, so the log order is the visibility order.
//! - **Reads** (get/cursors): never touch the writer mutex. The MemTable's
//!   internal RwLock gives many concurrent readers.
//!
//! ## On-disk Layout
//! ```text
//! <location>/
//! ├── LOCK      fs2 advisory lock, held while open
//! └── wal.log   records since the last checkpoint
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use super::cursor::TableCursor;
use super::lock::LockGuard;
use super::memtable::{MemTable, MemTableEntry};
use super::wal::{Operation, WalEntry, WalRecovery, WalWriter, MAX_RECORD_LEN};
use super::{
    BatchOp, EngineCursor, EngineProvider, EngineReadOptions, SnapshotToken, StorageEngine,
};
use crate::config::{OpenOptions, WriteOptions};
use crate::error::{EngineError, EngineResult};
use crate::registry::StorageLocation;

const WAL_FILENAME: &str = "wal.log";
const WAL_TMP_FILENAME: &str = "wal.log.tmp";
const LOCK_FILENAME: &str = "LOCK";

/// Writer-side state; `None` fields mean the engine is closed
struct WriterState {
    wal: Option<WalWriter>,
    lock: Option<LockGuard>,
}

#[derive(Default)]
struct EngineStats {
    writes: AtomicU64,
    reads: AtomicU64,
    checkpoints: AtomicU64,
    compactions: AtomicU64,
    versions_pruned: AtomicU64,
}

/// Multi-version, log-backed storage engine
pub struct LogEngine {
    location: StorageLocation,
    options: OpenOptions,

    /// Shared with cursors, which outlive individual calls
    table: Arc<MemTable>,

    writer: Mutex<WriterState>,

    /// Live snapshot pins: id -> sequence
    snapshots: Mutex<HashMap<u64, u64>>,
    next_snapshot_id: AtomicU64,

    stats: EngineStats,
}

impl LogEngine {
    /// Open or create the store at `location`
    ///
    /// On startup:
    /// 1. Check / create the directory per `create_if_missing`
    /// 2. Take the LOCK file
    /// 3. Honor `error_if_exists`
    /// 4. Replay the WAL into a fresh MemTable
    pub fn open(location: &StorageLocation, options: &OpenOptions) -> EngineResult<Self> {
        let root = location.path();

        // Step 1: Directory
        if !root.exists() {
            if !options.create_if_missing {
                return Err(EngineError::InvalidArgument(format!(
                    "{}: does not exist (create_if_missing is false)",
                    location
                )));
            }
            fs::create_dir_all(root)?;
        }

        // Step 2: Lock
        let lock = LockGuard::acquire(root)?;

        // Step 3 + 4: Existing log
        let wal_path = root.join(WAL_FILENAME);
        let table = MemTable::new();

        if wal_path.exists() {
            if options.error_if_exists {
                return Err(EngineError::InvalidArgument(format!(
                    "{}: exists (error_if_exists is true)",
                    location
                )));
            }

            let (entries, result) = WalRecovery::recover(&wal_path)?;
            for entry in entries {
                let ops: Vec<BatchOp> = entry.operations.into_iter().map(BatchOp::from).collect();
                table.apply(entry.lsn, &ops);
            }
            table.advance_sequence(result.last_lsn);

            tracing::debug!(
                "recovered {}: {} records, last_lsn={}, truncated={}",
                location,
                result.entries_recovered,
                result.last_lsn,
                result.was_truncated
            );
        }

        let wal = WalWriter::open(&wal_path)?;

        Ok(Self {
            location: location.clone(),
            options: options.clone(),
            table: Arc::new(table),
            writer: Mutex::new(WriterState {
                wal: Some(wal),
                lock: Some(lock),
            }),
            snapshots: Mutex::new(HashMap::new()),
            next_snapshot_id: AtomicU64::new(1),
            stats: EngineStats::default(),
        })
    }

    /// Remove the store's files
    ///
    /// A missing location is not an error. A store that is open elsewhere
    /// is reported through the lock error.
    pub fn destroy(root: &Path) -> EngineResult<()> {
        if !root.exists() {
            return Ok(());
        }

        let lock = LockGuard::acquire(root)?;
        for name in [WAL_FILENAME, WAL_TMP_FILENAME] {
            let path = root.join(name);
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        drop(lock);

        let lock_path = root.join(LOCK_FILENAME);
        if lock_path.exists() {
            fs::remove_file(&lock_path)?;
        }

        // Leave directories holding foreign files alone
        if fs::remove_dir(root).is_err() {
            tracing::debug!("destroy {}: directory not empty, left in place", root.display());
        }
        Ok(())
    }

    /// Rewrite the log keeping the valid prefix before the first damaged record
    pub fn repair(root: &Path) -> EngineResult<()> {
        if !root.exists() {
            return Err(EngineError::Io(format!(
                "{}: no such file or directory",
                root.display()
            )));
        }

        let _lock = LockGuard::acquire(root)?;
        let wal_path = root.join(WAL_FILENAME);
        if !wal_path.exists() {
            return Ok(());
        }

        let result = WalRecovery::repair(&wal_path)?;
        tracing::info!(
            "repaired {}: kept {} records, last_lsn={}, dropped_corrupt={}",
            root.display(),
            result.entries_recovered,
            result.last_lsn,
            result.dropped_corrupt
        );
        Ok(())
    }

    // =========================================================================
    // Internal
    // =========================================================================

    /// Sequence a read without an explicit snapshot resolves at
    fn read_sequence(&self, options: &EngineReadOptions) -> u64 {
        options
            .snapshot
            .map_or_else(|| self.table.last_sequence(), |s| s.sequence)
    }

    /// Oldest sequence some reader may still observe
    fn oldest_pinned(&self) -> u64 {
        let snapshots = self.snapshots.lock();
        snapshots
            .values()
            .copied()
            .min()
            .unwrap_or_else(|| self.table.last_sequence())
    }

    /// Replace the log with the live state, split into records under the
    /// reader's size limit that all carry the current sequence
    fn checkpoint(&self, wal: &mut WalWriter) -> EngineResult<()> {
        let sequence = self.table.last_sequence();
        let operations = self
            .table
            .live_entries(sequence)
            .into_iter()
            .map(|(key, value)| Operation::Put {
                key: key.to_vec(),
                value: value.to_vec(),
            })
            .collect::<Vec<_>>();

        let live = operations.len();
        let records = WalEntry::split(sequence, operations, MAX_RECORD_LEN)?;
        wal.rewrite(&records)?;
        self.stats.checkpoints.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            "checkpoint {}: {} live keys in {} records at sequence {}, log now {} bytes",
            self.location,
            live,
            records.len(),
            sequence,
            wal.len()
        );
        Ok(())
    }

    fn closed_error(&self) -> EngineError {
        EngineError::Io(format!("{}: store is closed", self.location))
    }

    fn format_options(&self) -> String {
        let o = &self.options;
        format!(
            "create_if_missing: {}\nerror_if_exists: {}\nmultithreading: {}\ncompression: {}\n\
             cache_size: {}\nwrite_buffer_size: {}\nblock_size: {}\nmax_open_files: {}\n\
             block_restart_interval: {}\nmax_file_size: {}\n",
            o.create_if_missing,
            o.error_if_exists,
            o.multithreading,
            o.compression,
            o.cache_size,
            o.write_buffer_size,
            o.block_size,
            o.max_open_files,
            o.block_restart_interval,
            o.max_file_size
        )
    }

    fn format_stats(&self) -> String {
        let s = &self.stats;
        format!(
            "versions: {}\nsequence: {}\nsnapshots: {}\nwrites: {}\nreads: {}\n\
             checkpoints: {}\ncompactions: {}\nversions_pruned: {}\n",
            self.table.version_count(),
            self.table.last_sequence(),
            self.snapshots.lock().len(),
            s.writes.load(Ordering::Relaxed),
            s.reads.load(Ordering::Relaxed),
            s.checkpoints.load(Ordering::Relaxed),
            s.compactions.load(Ordering::Relaxed),
            s.versions_pruned.load(Ordering::Relaxed)
        )
    }

    pub fn location(&self) -> &StorageLocation {
        &self.location
    }
}

impl StorageEngine for LogEngine {
    fn get(&self, options: &EngineReadOptions, key: &[u8]) -> EngineResult<Bytes> {
        self.stats.reads.fetch_add(1, Ordering::Relaxed);

        // Unpinned point reads take whatever is committed when the table is read
        let sequence = options.snapshot.map_or(u64::MAX, |s| s.sequence);
        match self.table.get(key, sequence) {
            Some(MemTableEntry::Value(value)) => Ok(value),
            Some(MemTableEntry::Tombstone) | None => Err(EngineError::NotFound(String::new())),
        }
    }

    fn put(&self, options: &WriteOptions, key: &[u8], value: &[u8]) -> EngineResult<()> {
        self.write(options, &[BatchOp::put(key, value)])
    }

    fn delete(&self, options: &WriteOptions, key: &[u8]) -> EngineResult<()> {
        self.write(options, &[BatchOp::delete(key)])
    }

    /// Steps:
    /// 1. Acquire the writer mutex
    /// 2. Append the batch to the WAL under the next sequence (durability)
    /// 3. Apply it to the MemTable (visibility)
    /// 4. Checkpoint once the log grew by more than the write buffer since
    ///    the last checkpoint
    fn write(&self, options: &WriteOptions, ops: &[BatchOp]) -> EngineResult<()> {
        if ops.is_empty() {
            return Ok(());
        }

        let mut writer = self.writer.lock();
        let wal = writer.wal.as_mut().ok_or_else(|| self.closed_error())?;

        let sequence = self.table.last_sequence() + 1;
        let entry = WalEntry::new(sequence, ops.iter().map(Operation::from).collect());
        wal.append(&entry, options.sync)?;

        self.table.apply(sequence, ops);
        self.stats.writes.fetch_add(1, Ordering::Relaxed);

        // The batch is already durable and visible; a failed checkpoint
        // leaves the old log in place
        if wal.growth() > self.options.write_buffer_size as u64 {
            if let Err(e) = self.checkpoint(wal) {
                tracing::warn!("checkpoint of {} failed, keeping the log: {}", self.location, e);
            }
        }
        Ok(())
    }

    fn new_cursor(&self, options: &EngineReadOptions) -> Box<dyn EngineCursor> {
        Box::new(TableCursor::new(
            Arc::clone(&self.table),
            self.read_sequence(options),
        ))
    }

    fn new_snapshot(&self) -> SnapshotToken {
        let mut snapshots = self.snapshots.lock();
        let token = SnapshotToken {
            id: self.next_snapshot_id.fetch_add(1, Ordering::Relaxed),
            sequence: self.table.last_sequence(),
        };
        snapshots.insert(token.id, token.sequence);
        tracing::trace!("snapshot {} pinned at {}", token.id, token.sequence);
        token
    }

    fn release_snapshot(&self, token: SnapshotToken) {
        if self.snapshots.lock().remove(&token.id).is_none() {
            tracing::warn!("release of unknown snapshot {}", token.id);
        }
    }

    fn approximate_size(&self, start: &[u8], end: &[u8]) -> u64 {
        self.table.live_size(start, end, u64::MAX)
    }

    fn compact_range(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> EngineResult<()> {
        let mut writer = self.writer.lock();
        let wal = writer.wal.as_mut().ok_or_else(|| self.closed_error())?;

        let oldest = self.oldest_pinned();
        let pruned = self.table.prune(start, end, oldest);
        self.stats.compactions.fetch_add(1, Ordering::Relaxed);
        self.stats
            .versions_pruned
            .fetch_add(pruned as u64, Ordering::Relaxed);

        tracing::debug!(
            "compact {}: pruned {} versions below sequence {}",
            self.location,
            pruned,
            oldest
        );

        self.checkpoint(wal)
    }

    fn property(&self, name: &str) -> Option<String> {
        let value = match name {
            "atlas.num-entries" => self.table.live_entries(u64::MAX).len().to_string(),
            "atlas.sequence" => self.table.last_sequence().to_string(),
            "atlas.num-snapshots" => self.snapshots.lock().len().to_string(),
            "atlas.wal-bytes" => self
                .writer
                .lock()
                .wal
                .as_ref()
                .map_or(0, |w| w.len())
                .to_string(),
            "atlas.approximate-memory-usage" => self.table.size().to_string(),
            "atlas.options" => self.format_options(),
            "atlas.stats" => self.format_stats(),
            _ => return None,
        };
        Some(value)
    }

    fn close(&self) -> EngineResult<()> {
        let mut writer = self.writer.lock();
        let synced = match writer.wal.take() {
            Some(mut wal) => wal.sync(),
            None => Ok(()),
        };
        writer.lock = None;

        tracing::debug!("closed {}", self.location);
        synced
    }
}

/// Provider for [`LogEngine`] stores
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEngineProvider;

impl EngineProvider for LogEngineProvider {
    fn open(
        &self,
        location: &StorageLocation,
        options: &OpenOptions,
    ) -> EngineResult<Arc<dyn StorageEngine>> {
        Ok(Arc::new(LogEngine::open(location, options)?))
    }

    fn destroy(&self, location: &StorageLocation) -> EngineResult<()> {
        LogEngine::destroy(location.path())
    }

    fn repair(&self, location: &StorageLocation) -> EngineResult<()> {
        LogEngine::repair(location.path())
    }
}
