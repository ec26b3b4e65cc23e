//! Database Module
//!
//! The façade callers use, composed from the pieces below it.
//!
//! ## Responsibilities
//! - Acquire and release the storage handle (open / close)
//! - Route each operation to a background task, priority-gated where a
//!   close must wait for it, or answer synchronously
//! - Defer a close until in-flight priority work drains ([`PriorityGate`])
//! - Track iterators and snapshots so teardown can force-close them
//!
//! ## Operation Routing
//! | Operation | Runs | Gated |
//! |---|---|---|
//! | open, close | worker | no |
//! | get, get_many, has, has_many | worker | yes |
//! | put, del, batch, WriteBatch::write, clear | worker | yes |
//! | approximate_size, compact_range | worker | yes |
//! | iterator reads | worker | no |
//! | get_property, get_sync, iterator, snapshot | calling context | - |

mod batch;
mod gate;
mod iterator;
mod range;
mod resources;
mod snapshot;
pub(crate) mod tasks;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use bytes::Bytes;

use crate::config::{OpenOptions, RangeOptions, ReadOptions, WriteOptions};
use crate::engine::{BatchOp, EngineProvider, EngineReadOptions, StorageEngine};
use crate::error::{GateError, Result};
use crate::registry::{HandleRegistry, StorageHandle, StorageLocation};
use crate::runtime::{AsyncTask, EnvMember, Pending, PendingSlot, Runtime};

use resources::ResourceTracker;
use tasks::{
    ApproximateSizeTask, ClearTask, CloseTask, CompactRangeTask, GetManyTask, GetTask,
    HasManyTask, OpenTask, ReadView, WriteTask,
};

pub use batch::WriteBatch;
pub use gate::PriorityGate;
pub use iterator::RangeIterator;
pub use range::{Entry, KeyBounds};
pub use snapshot::Snapshot;

/// Resolve early with `Err` instead of submitting
macro_rules! try_pending {
    ($op:expr, $e:expr) => {
        match $e {
            Ok(value) => value,
            Err(e) => return Pending::resolved($op, Err(e)),
        }
    };
}

/// Lifecycle of a [`Database`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseStatus {
    New,
    Opening,
    Open,
    Closing,
    Closed,
}

impl fmt::Display for DatabaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DatabaseStatus::New => "new",
            DatabaseStatus::Opening => "opening",
            DatabaseStatus::Open => "open",
            DatabaseStatus::Closing => "closing",
            DatabaseStatus::Closed => "closed",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Shared State
// =============================================================================

pub(crate) struct DbState {
    location: StorageLocation,
    rt: Weak<Runtime>,
    registry: Arc<HandleRegistry>,
    provider: Arc<dyn EngineProvider>,

    status: Cell<DatabaseStatus>,
    handle: RefCell<Option<StorageHandle>>,
    gate: PriorityGate,
    resources: ResourceTracker,
    shared_buffer: RefCell<Option<Rc<RefCell<Vec<u8>>>>>,
}

impl DbState {
    /// The runtime, unless it is gone or torn down
    fn runtime(&self) -> Option<Rc<Runtime>> {
        self.rt.upgrade().filter(|rt| !rt.is_torn_down())
    }

    /// The open engine, or `NotOpen` naming `op`
    fn engine(&self, op: &'static str) -> Result<Arc<dyn StorageEngine>> {
        if self.status.get() != DatabaseStatus::Open {
            return Err(GateError::NotOpen(op));
        }
        self.handle
            .borrow()
            .as_ref()
            .map(|handle| Arc::clone(handle.engine()))
            .ok_or(GateError::NotOpen(op))
    }

    /// Hand the storage handle to a close task
    fn queue_close(self: &Rc<Self>, slot: PendingSlot<()>) {
        let Some(rt) = self.runtime() else {
            slot.fill(Err(GateError::NotOpen("close")));
            return;
        };

        let task = CloseTask {
            registry: Arc::clone(&self.registry),
            handle: self.handle.borrow_mut().take(),
        };
        tracing::debug!("queueing close of {}", self.location);

        let state = Rc::clone(self);
        let _ = rt.submit(
            "close",
            task,
            move |_, result| {
                state.status.set(DatabaseStatus::Closed);
                tracing::debug!("closed database {}", state.location);
                slot.fill(result);
                Ok(())
            },
            || {},
        );
    }

    /// Release the storage handle on the calling context
    fn release_now(&self) {
        if let Some(handle) = self.handle.borrow_mut().take() {
            if let Err(e) = self.registry.release(handle) {
                tracing::warn!("closing {} failed: {}", self.location, e);
            }
        }
        self.status.set(DatabaseStatus::Closed);
    }
}

impl EnvMember for DbState {
    fn teardown(&self) {
        // A parked close can no longer be scheduled; it resolves as NotOpen
        if let Some(close) = self.gate.take_parked_close() {
            close();
        }

        let forced = self.resources.force_close_all();
        if forced > 0 {
            tracing::warn!(
                "teardown force-closed {} iterators/snapshots of {}",
                forced,
                self.location
            );
        }

        if self.handle.borrow().is_some() {
            tracing::warn!("closing database {} at environment teardown", self.location);
            self.release_now();
        }
    }
}

impl Drop for DbState {
    fn drop(&mut self) {
        if self.handle.get_mut().is_some() {
            tracing::warn!("database {} dropped while open, releasing its handle", self.location);
            self.release_now();
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// Logical handle on one store
///
/// Cloning gives another reference to the same database. Every operation
/// returns immediately; background ones hand back a [`Pending`] outcome.
#[derive(Clone)]
pub struct Database {
    state: Rc<DbState>,
}

impl Database {
    pub(crate) fn new(rt: &Rc<Runtime>, location: StorageLocation) -> Self {
        let state = Rc::new(DbState {
            location,
            rt: Rc::downgrade(rt),
            registry: Arc::clone(rt.registry()),
            provider: Arc::clone(rt.provider()),
            status: Cell::new(DatabaseStatus::New),
            handle: RefCell::new(None),
            gate: PriorityGate::new(),
            resources: ResourceTracker::new(),
            shared_buffer: RefCell::new(None),
        });

        rt.register(Rc::downgrade(&state) as Weak<dyn EnvMember>);

        Self { state }
    }

    pub fn location(&self) -> &StorageLocation {
        &self.state.location
    }

    pub fn status(&self) -> DatabaseStatus {
        self.state.status.get()
    }

    pub fn is_open(&self) -> bool {
        self.status() == DatabaseStatus::Open
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Acquire the store through the registry
    ///
    /// With `multithreading` set, databases opening the same location share
    /// one engine instance. Opening an open database succeeds immediately.
    pub fn open(&self, options: OpenOptions) -> Pending<()> {
        match self.status() {
            DatabaseStatus::Open => return Pending::resolved("open", Ok(())),
            DatabaseStatus::Opening | DatabaseStatus::Closing => {
                let status = self.status();
                return Pending::resolved(
                    "open",
                    Err(GateError::Other(format!("Database is {}", status))),
                );
            }
            DatabaseStatus::New | DatabaseStatus::Closed => {}
        }

        let rt = try_pending!("open", self.state.runtime().ok_or(GateError::NotOpen("open")));
        self.state.status.set(DatabaseStatus::Opening);

        let task = OpenTask {
            registry: Arc::clone(&self.state.registry),
            provider: Arc::clone(&self.state.provider),
            location: self.state.location.clone(),
            options,
        };

        let state = Rc::clone(&self.state);
        rt.submit(
            "open",
            task,
            move |_, result| match result {
                Ok(handle) => {
                    *state.handle.borrow_mut() = Some(handle);
                    state.status.set(DatabaseStatus::Open);
                    tracing::debug!("opened database {}", state.location);
                    Ok(())
                }
                Err(e) => {
                    state.status.set(DatabaseStatus::Closed);
                    Err(e)
                }
            },
            || {},
        )
    }

    /// Release the store
    ///
    /// Runs right away if no priority work is in flight, otherwise parks
    /// until the last such operation completes. Closing a database that is
    /// not open succeeds immediately.
    ///
    /// # Panics
    /// If iterators or snapshots of this database are still open.
    pub fn close(&self) -> Pending<()> {
        match self.status() {
            DatabaseStatus::New | DatabaseStatus::Closed => return Pending::resolved("close", Ok(())),
            DatabaseStatus::Opening | DatabaseStatus::Closing => {
                let status = self.status();
                return Pending::resolved(
                    "close",
                    Err(GateError::Other(format!("Database is {}", status))),
                );
            }
            DatabaseStatus::Open => {}
        }

        let open = self.state.resources.len();
        assert!(
            open == 0,
            "close() called on {} with {} open iterators or snapshots",
            self.state.location,
            open
        );

        let rt = try_pending!("close", self.state.runtime().ok_or(GateError::NotOpen("close")));
        self.state.status.set(DatabaseStatus::Closing);
        let (pending, slot) = Pending::deferred("close", Rc::downgrade(&rt));

        if self.state.gate.has_pending() {
            tracing::debug!(
                "close of {} parked behind {} operations",
                self.state.location,
                self.state.gate.count()
            );
            let state = Rc::clone(&self.state);
            self.state
                .gate
                .park_close(Box::new(move || state.queue_close(slot)));
        } else {
            self.state.queue_close(slot);
        }

        pending
    }

    // =========================================================================
    // Point Reads
    // =========================================================================

    /// Value of `key`, `None` if absent
    pub fn get(&self, key: impl AsRef<[u8]>) -> Pending<Option<Bytes>> {
        self.get_with(key, &ReadOptions::default())
    }

    pub fn get_with(&self, key: impl AsRef<[u8]>, options: &ReadOptions) -> Pending<Option<Bytes>> {
        let view = try_pending!("get", self.read_view("get", options));
        let task = GetTask {
            view,
            key: Bytes::copy_from_slice(key.as_ref()),
        };
        self.submit_gated("get", task, |_, result| result)
    }

    /// Values of `keys`, in order; absent keys are `None`
    pub fn get_many<I, K>(&self, keys: I) -> Pending<Vec<Option<Bytes>>>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        self.get_many_with(keys, &ReadOptions::default())
    }

    pub fn get_many_with<I, K>(&self, keys: I, options: &ReadOptions) -> Pending<Vec<Option<Bytes>>>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        let view = try_pending!("get_many", self.read_view("get_many", options));
        let task = GetManyTask {
            view,
            keys: collect_keys(keys),
        };
        self.submit_gated("get_many", task, |_, result| result)
    }

    pub fn has(&self, key: impl AsRef<[u8]>) -> Pending<bool> {
        self.has_with(key, &ReadOptions::default())
    }

    pub fn has_with(&self, key: impl AsRef<[u8]>, options: &ReadOptions) -> Pending<bool> {
        let view = try_pending!("has", self.read_view("has", options));
        let task = HasManyTask {
            view,
            keys: vec![Bytes::copy_from_slice(key.as_ref())],
        };
        self.submit_gated("has", task, |_, result| {
            result.map(|found| found.first().copied().unwrap_or(false))
        })
    }

    pub fn has_many<I, K>(&self, keys: I) -> Pending<Vec<bool>>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        self.has_many_with(keys, &ReadOptions::default())
    }

    pub fn has_many_with<I, K>(&self, keys: I, options: &ReadOptions) -> Pending<Vec<bool>>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        let view = try_pending!("has_many", self.read_view("has_many", options));
        let task = HasManyTask {
            view,
            keys: collect_keys(keys),
        };
        self.submit_gated("has_many", task, |_, result| result)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    pub fn put(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Pending<()> {
        self.put_with(key, value, WriteOptions::default())
    }

    pub fn put_with(
        &self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
        options: WriteOptions,
    ) -> Pending<()> {
        self.write_ops("put", vec![BatchOp::put(key, value)], options)
    }

    pub fn del(&self, key: impl AsRef<[u8]>) -> Pending<()> {
        self.del_with(key, WriteOptions::default())
    }

    pub fn del_with(&self, key: impl AsRef<[u8]>, options: WriteOptions) -> Pending<()> {
        self.write_ops("del", vec![BatchOp::delete(key)], options)
    }

    /// Apply `ops` atomically
    pub fn batch(&self, ops: Vec<BatchOp>) -> Pending<()> {
        self.batch_with(ops, WriteOptions::default())
    }

    pub fn batch_with(&self, ops: Vec<BatchOp>, options: WriteOptions) -> Pending<()> {
        self.write_ops("batch", ops, options)
    }

    /// An empty chained batch on this database
    pub fn write_batch(&self) -> WriteBatch {
        WriteBatch::new(self.clone())
    }

    /// Delete every key in the range
    ///
    /// Keys are deleted in rounds of at most `high_water_mark_bytes` of key
    /// data, each round one atomic write. `reverse` and `limit` pick which
    /// keys go first and how many.
    pub fn clear(&self, options: RangeOptions) -> Pending<()> {
        let engine = try_pending!("clear", self.state.engine("clear"));
        let snapshot = try_pending!("clear", snapshot_token(&options.snapshot, &engine));

        let options = options.keys(true).values(false).fill_cache(false);
        let cursor = range::RangeCursor::new(
            Arc::clone(&engine),
            &options,
            snapshot,
            Arc::new(AtomicBool::new(false)),
        );

        self.submit_gated("clear", ClearTask { engine, cursor }, |_, result| result)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Approximate bytes used by keys in `[start, end)`
    pub fn approximate_size(&self, start: impl AsRef<[u8]>, end: impl AsRef<[u8]>) -> Pending<u64> {
        let engine = try_pending!("approximate_size", self.state.engine("approximate_size"));
        let task = ApproximateSizeTask {
            engine,
            start: Bytes::copy_from_slice(start.as_ref()),
            end: Bytes::copy_from_slice(end.as_ref()),
        };
        self.submit_gated("approximate_size", task, |_, result| result)
    }

    /// Compact `[start, end]`; `None` leaves that side unbounded
    pub fn compact_range(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> Pending<()> {
        let engine = try_pending!("compact_range", self.state.engine("compact_range"));
        let task = CompactRangeTask {
            engine,
            start: start.map(Bytes::copy_from_slice),
            end: end.map(Bytes::copy_from_slice),
        };
        self.submit_gated("compact_range", task, |_, result| result)
    }

    /// Engine property; unknown names read as an empty string
    pub fn get_property(&self, name: &str) -> Result<String> {
        let engine = self.state.engine("get_property")?;
        Ok(engine.property(name).unwrap_or_default())
    }

    // =========================================================================
    // Synchronous Reads
    // =========================================================================

    /// Point read on the calling context
    pub fn get_sync(&self, key: impl AsRef<[u8]>, options: &ReadOptions) -> Result<Option<Bytes>> {
        let engine = self.state.engine("get_sync")?;
        let read_options = EngineReadOptions {
            fill_cache: options.fill_cache,
            snapshot: snapshot_token(&options.snapshot, &engine)?,
        };

        match engine.get(&read_options, key.as_ref()) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Install the buffer [`get_sync_shared`](Self::get_sync_shared) reads
    /// keys from
    pub fn set_shared_buffer(&self, buffer: Rc<RefCell<Vec<u8>>>) {
        *self.state.shared_buffer.borrow_mut() = Some(buffer);
    }

    /// [`get_sync`](Self::get_sync) with the key taken from the first `len`
    /// bytes of the shared buffer
    pub fn get_sync_shared(&self, len: usize, options: &ReadOptions) -> Result<Option<Bytes>> {
        let buffer = self
            .state
            .shared_buffer
            .borrow()
            .clone()
            .ok_or_else(|| GateError::InvalidArgument("no shared buffer set".into()))?;
        let buffer = buffer.borrow();

        if len > buffer.len() {
            return Err(GateError::InvalidArgument(format!(
                "key length {} exceeds shared buffer of {} bytes",
                len,
                buffer.len()
            )));
        }
        self.get_sync(&buffer[..len], options)
    }

    // =========================================================================
    // Child Resources
    // =========================================================================

    /// Iterator over the range described by `options`
    pub fn iterator(&self, options: RangeOptions) -> Result<RangeIterator> {
        let engine = self.state.engine("iterator")?;
        let snapshot = snapshot_token(&options.snapshot, &engine)?;
        Ok(RangeIterator::create(&self.state, engine, &options, snapshot))
    }

    /// Pin the current state as an explicit snapshot
    pub fn snapshot(&self) -> Result<Snapshot> {
        let engine = self.state.engine("snapshot")?;
        Ok(Snapshot::create(&self.state, engine))
    }

    /// Open iterators and snapshots
    pub fn resource_count(&self) -> usize {
        self.state.resources.len()
    }

    /// In-flight priority operations
    pub fn priority_work(&self) -> usize {
        self.state.gate.count()
    }

    /// Whether a close is waiting for priority work to drain
    pub fn has_parked_close(&self) -> bool {
        self.state.gate.has_parked_close()
    }

    // =========================================================================
    // Internal
    // =========================================================================

    fn read_view(&self, op: &'static str, options: &ReadOptions) -> Result<ReadView> {
        let engine = self.state.engine(op)?;
        let snapshot = snapshot_token(&options.snapshot, &engine)?;
        Ok(ReadView::new(engine, options.fill_cache, snapshot))
    }

    fn write_ops(&self, op: &'static str, ops: Vec<BatchOp>, options: WriteOptions) -> Pending<()> {
        let engine = try_pending!(op, self.state.engine(op));
        let task = WriteTask {
            engine,
            ops,
            options,
        };
        self.submit_gated(op, task, |_, result| result)
    }

    /// Submit a task the close path must wait for
    fn submit_gated<T, O, C>(&self, op: &'static str, task: T, complete: C) -> Pending<O>
    where
        T: AsyncTask,
        O: 'static,
        C: FnOnce(T, Result<T::Output>) -> Result<O> + 'static,
    {
        let rt = try_pending!(op, self.state.runtime().ok_or(GateError::NotOpen(op)));

        self.state.gate.increment();
        let state = Rc::clone(&self.state);
        rt.submit(op, task, complete, move || state.gate.decrement())
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("location", &self.state.location)
            .field("status", &self.state.status.get())
            .field("gate", &self.state.gate)
            .field("resources", &self.state.resources.len())
            .finish()
    }
}

fn collect_keys<I, K>(keys: I) -> Vec<Bytes>
where
    I: IntoIterator<Item = K>,
    K: AsRef<[u8]>,
{
    keys.into_iter()
        .map(|k| Bytes::copy_from_slice(k.as_ref()))
        .collect()
}

fn snapshot_token(
    snapshot: &Option<Snapshot>,
    engine: &Arc<dyn StorageEngine>,
) -> Result<Option<crate::engine::SnapshotToken>> {
    snapshot.as_ref().map(|s| s.token_for(engine)).transpose()
}
