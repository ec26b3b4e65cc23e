//! Runtime Module
//!
//! The single-threaded calling context and its background worker pool.
//!
//! ## Responsibilities
//! - Hand [`AsyncTask`] bodies to the worker pool
//! - Deliver completions back on the calling context, one at a time
//! - Give callers a [`Pending`] outcome handle per operation
//! - Tear everything down once: join workers, force-close live databases
//!
//! ## Threading
//! [`Environment`] and everything created from it (databases, iterators,
//! snapshots, pending outcomes) are `!Send`: they live on the thread that
//! built the environment. Only task bodies cross to the workers.
//! Completions may arrive in any order.

mod pool;
mod task;

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};

use crate::config::EnvConfig;
use crate::db::tasks::LocationTask;
use crate::db::Database;
use crate::engine::{EngineProvider, LogEngineProvider};
use crate::error::{EngineError, EngineResult, GateError, Result};
use crate::registry::{HandleRegistry, StorageLocation};

use pool::WorkerPool;
pub(crate) use task::Completion;
pub use task::AsyncTask;

type Callback = Box<dyn FnOnce(Box<dyn Any + Send>)>;

/// Something owned by an environment that must be shut down with it
pub(crate) trait EnvMember {
    /// Synchronously force-close whatever is still open
    fn teardown(&self);
}

// =============================================================================
// Runtime
// =============================================================================

/// Shared state behind an [`Environment`]
pub(crate) struct Runtime {
    pool: RefCell<Option<WorkerPool>>,

    sender: Sender<Completion>,
    completions: Receiver<Completion>,

    /// Delivery callbacks of submitted, not yet completed tasks
    pending: RefCell<HashMap<u64, Callback>>,
    next_task_id: Cell<u64>,

    registry: Arc<HandleRegistry>,
    provider: Arc<dyn EngineProvider>,

    members: RefCell<Vec<Weak<dyn EnvMember>>>,
    torn_down: Cell<bool>,
}

impl Runtime {
    pub fn registry(&self) -> &Arc<HandleRegistry> {
        &self.registry
    }

    pub fn provider(&self) -> &Arc<dyn EngineProvider> {
        &self.provider
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.get()
    }

    pub fn register(&self, member: Weak<dyn EnvMember>) {
        let mut members = self.members.borrow_mut();
        members.retain(|m| m.strong_count() > 0);
        members.push(member);
    }

    /// Run `task` on a worker
    ///
    /// `complete` converts the outcome on the calling context and `finalize`
    /// runs right after it. If the environment is already torn down the
    /// task never runs: `finalize` runs immediately and the outcome is
    /// `NotOpen`.
    pub fn submit<T, O, C, F>(
        self: &Rc<Self>,
        op: &'static str,
        mut task: T,
        complete: C,
        finalize: F,
    ) -> Pending<O>
    where
        T: AsyncTask,
        O: 'static,
        C: FnOnce(T, Result<T::Output>) -> Result<O> + 'static,
        F: FnOnce() + 'static,
    {
        let slot = Rc::new(RefCell::new(None));
        let pending = Pending {
            op,
            slot: Rc::clone(&slot),
            rt: Rc::downgrade(self),
        };

        if self.torn_down.get() {
            finalize();
            *slot.borrow_mut() = Some(Err(GateError::NotOpen(op)));
            return pending;
        }

        let id = self.next_task_id.get();
        self.next_task_id.set(id + 1);

        let callback: Callback = Box::new(move |payload| {
            match payload.downcast::<(T, EngineResult<T::Output>)>() {
                Ok(boxed) => {
                    let (task, outcome) = *boxed;
                    let result = match outcome {
                        Ok(value) => Ok(value),
                        Err(e) if e.is_not_found() => task.absent().ok_or_else(|| e.into()),
                        Err(e) => Err(e.into()),
                    };
                    let delivered = complete(task, result);
                    *slot.borrow_mut() = Some(delivered);
                }
                Err(_) => tracing::warn!("{} task {} returned an unexpected payload", op, id),
            }
            finalize();
        });
        self.pending.borrow_mut().insert(id, callback);

        let sender = self.sender.clone();
        let job = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| task.execute()))
                .unwrap_or_else(|_| Err(EngineError::Other(format!("{} task panicked", op))));
            // The receiver is gone only after teardown, when nobody is waiting
            let _ = sender.send(Completion {
                id,
                payload: Box::new((task, outcome)),
            });
        });

        let submitted = self
            .pool
            .borrow()
            .as_ref()
            .map_or(false, |pool| pool.submit(job));
        if submitted {
            tracing::trace!("submitted {} task {}", op, id);
        } else {
            // Never delivered: waiting on it reports NotOpen
            self.pending.borrow_mut().remove(&id);
            tracing::warn!("worker pool unavailable, {} task {} dropped", op, id);
        }

        pending
    }

    /// Block for one completion and deliver it
    ///
    /// Returns false when nothing is in flight, so waiting would never end.
    fn turn(&self) -> bool {
        if self.pending.borrow().is_empty() {
            return false;
        }

        match self.completions.recv() {
            Ok(completion) => {
                self.dispatch(completion);
                true
            }
            Err(_) => false,
        }
    }

    /// Deliver every completion that has already arrived
    fn poll(&self) -> usize {
        let mut delivered = 0;
        while let Ok(completion) = self.completions.try_recv() {
            self.dispatch(completion);
            delivered += 1;
        }
        delivered
    }

    fn dispatch(&self, completion: Completion) {
        // Release the map before running the callback; it may submit more work
        let callback = self.pending.borrow_mut().remove(&completion.id);
        match callback {
            Some(callback) => {
                tracing::trace!("completing task {}", completion.id);
                callback(completion.payload);
            }
            None => tracing::trace!("dropping completion of unknown task {}", completion.id),
        }
    }

    fn in_flight(&self) -> usize {
        self.pending.borrow().len()
    }

    fn teardown(&self) {
        if self.torn_down.replace(true) {
            return;
        }

        // Step 1: Let running bodies finish, then stop the workers
        if let Some(mut pool) = self.pool.borrow_mut().take() {
            pool.shutdown();
        }

        // Step 2: Discard undelivered completions
        let undelivered = self.pending.borrow().len();
        while self.completions.try_recv().is_ok() {}
        let callbacks: Vec<Callback> = self.pending.borrow_mut().drain().map(|(_, cb)| cb).collect();
        drop(callbacks);
        if undelivered > 0 {
            tracing::warn!("teardown discarded {} undelivered completions", undelivered);
        }

        // Step 3: Force-close resources, then databases
        let members: Vec<_> = self.members.borrow_mut().drain(..).collect();
        for member in members.iter().filter_map(Weak::upgrade) {
            member.teardown();
        }

        tracing::debug!("environment torn down");
    }
}

// =============================================================================
// Pending
// =============================================================================

/// Outcome handle of an operation
///
/// Resolves once its task completes on the calling context. Waiting drives
/// the environment's completion loop, so other outcomes (and deferred
/// closes) are delivered along the way.
#[must_use = "a pending outcome does nothing unless waited on or polled"]
pub struct Pending<T> {
    op: &'static str,
    slot: Rc<RefCell<Option<Result<T>>>>,
    rt: Weak<Runtime>,
}

impl<T> Pending<T> {
    /// An outcome that is already known
    pub(crate) fn resolved(op: &'static str, value: Result<T>) -> Self {
        Self {
            op,
            slot: Rc::new(RefCell::new(Some(value))),
            rt: Weak::new(),
        }
    }

    /// An outcome filled in later through [`PendingSlot`]
    pub(crate) fn deferred(op: &'static str, rt: Weak<Runtime>) -> (Self, PendingSlot<T>) {
        let slot = Rc::new(RefCell::new(None));
        let pending = Self {
            op,
            slot: Rc::clone(&slot),
            rt,
        };
        (pending, PendingSlot { slot })
    }

    /// Whether the outcome has been delivered
    pub fn is_ready(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Take the outcome if it has been delivered
    pub fn try_take(&mut self) -> Option<Result<T>> {
        self.slot.borrow_mut().take()
    }

    /// Drive the environment until this outcome is delivered
    ///
    /// An outcome that can no longer be delivered (the environment was torn
    /// down first) reports `NotOpen`.
    pub fn wait(self) -> Result<T> {
        loop {
            if let Some(result) = self.slot.borrow_mut().take() {
                return result;
            }

            let Some(rt) = self.rt.upgrade() else {
                return Err(GateError::NotOpen(self.op));
            };
            if !rt.turn() {
                return Err(GateError::NotOpen(self.op));
            }
        }
    }
}

impl<T> fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending")
            .field("op", &self.op)
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Write side of a deferred [`Pending`]
pub(crate) struct PendingSlot<T> {
    slot: Rc<RefCell<Option<Result<T>>>>,
}

impl<T> PendingSlot<T> {
    pub fn fill(&self, value: Result<T>) {
        *self.slot.borrow_mut() = Some(value);
    }
}

// =============================================================================
// Environment
// =============================================================================

/// The calling context: a worker pool plus the databases opened through it
///
/// Dropping the environment tears it down (see [`Environment::teardown`]).
pub struct Environment {
    rt: Rc<Runtime>,
}

impl Environment {
    /// Environment with default config, its own registry and the bundled engine
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn builder() -> EnvironmentBuilder {
        EnvironmentBuilder::default()
    }

    /// A new, not yet opened database on `location`
    pub fn database(&self, location: impl Into<StorageLocation>) -> Database {
        Database::new(&self.rt, location.into())
    }

    /// Create a database on `location`, open it and wait for the open
    pub fn open(
        &self,
        location: impl Into<StorageLocation>,
        options: crate::config::OpenOptions,
    ) -> Result<Database> {
        let db = self.database(location);
        db.open(options).wait()?;
        Ok(db)
    }

    /// Remove the store at `location` (must not be open)
    pub fn destroy(&self, location: impl Into<StorageLocation>) -> Pending<()> {
        let task = LocationTask::destroy(Arc::clone(&self.rt.provider), location.into());
        self.rt.submit("destroy", task, |_, r| r, || {})
    }

    /// Salvage the store at `location` (must not be open)
    pub fn repair(&self, location: impl Into<StorageLocation>) -> Pending<()> {
        let task = LocationTask::repair(Arc::clone(&self.rt.provider), location.into());
        self.rt.submit("repair", task, |_, r| r, || {})
    }

    /// Deliver every completion that has already arrived, without blocking
    pub fn poll(&self) -> usize {
        self.rt.poll()
    }

    /// Deliver completions until nothing is in flight
    pub fn run_until_idle(&self) {
        while self.rt.turn() {}
    }

    /// Number of submitted tasks whose completion has not been delivered
    pub fn in_flight(&self) -> usize {
        self.rt.in_flight()
    }

    pub fn registry(&self) -> &Arc<HandleRegistry> {
        &self.rt.registry
    }

    /// Shut the environment down
    ///
    /// Joins the worker pool, discards completions not yet delivered,
    /// force-closes every tracked iterator and snapshot, then closes every
    /// database still open. Outcomes that never resolved report `NotOpen`.
    /// Runs once; later calls do nothing.
    pub fn teardown(&self) {
        self.rt.teardown();
    }

    pub fn is_torn_down(&self) -> bool {
        self.rt.is_torn_down()
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        self.rt.teardown();
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("in_flight", &self.rt.in_flight())
            .field("torn_down", &self.rt.is_torn_down())
            .finish()
    }
}

/// Builder for Environment
#[derive(Default)]
pub struct EnvironmentBuilder {
    config: EnvConfig,
    registry: Option<Arc<HandleRegistry>>,
    provider: Option<Arc<dyn EngineProvider>>,
}

impl EnvironmentBuilder {
    pub fn config(mut self, config: EnvConfig) -> Self {
        self.config = config;
        self
    }

    pub fn worker_threads(mut self, count: usize) -> Self {
        self.config.worker_threads = count;
        self
    }

    /// Share handles with every other environment built on `registry`
    pub fn registry(mut self, registry: Arc<HandleRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Use another storage engine than the bundled one
    pub fn provider(mut self, provider: Arc<dyn EngineProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn build(self) -> Result<Environment> {
        let pool = WorkerPool::new(self.config.worker_threads)
            .map_err(|e| GateError::from(EngineError::from(e)))?;
        let (sender, completions) = channel::unbounded();

        let rt = Runtime {
            pool: RefCell::new(Some(pool)),
            sender,
            completions,
            pending: RefCell::new(HashMap::new()),
            next_task_id: Cell::new(1),
            registry: self.registry.unwrap_or_default(),
            provider: self
                .provider
                .unwrap_or_else(|| Arc::new(LogEngineProvider)),
            members: RefCell::new(Vec::new()),
            torn_down: Cell::new(false),
        };

        Ok(Environment { rt: Rc::new(rt) })
    }
}
