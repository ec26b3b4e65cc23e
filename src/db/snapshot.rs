//! Explicit Snapshot
//!
//! A point-in-time view with its own lifecycle. The handle is cheap to
//! clone; every clone refers to the same engine pin, which is released
//! exactly once: by [`Snapshot::close`] or when the environment is torn
//! down.

use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use super::resources::Resource;
use super::DbState;
use crate::engine::{SnapshotToken, StorageEngine};
use crate::error::{GateError, Result};

pub(crate) struct SnapshotState {
    token: SnapshotToken,
    engine: Arc<dyn StorageEngine>,
    released: Cell<bool>,

    /// Attach id in the owning database's tracker
    resource_id: Cell<Option<u32>>,
    db: Weak<DbState>,
}

impl SnapshotState {
    fn release(&self) {
        if self.released.replace(true) {
            return;
        }
        self.engine.release_snapshot(self.token);
        tracing::trace!("released snapshot {}", self.token.id);
    }
}

impl Resource for SnapshotState {
    fn force_close(&self) {
        self.resource_id.set(None);
        self.release();
    }
}

impl Drop for SnapshotState {
    fn drop(&mut self) {
        self.release();
    }
}

/// Handle to an explicit snapshot of a database
#[derive(Clone)]
pub struct Snapshot {
    state: Rc<SnapshotState>,
}

impl Snapshot {
    /// Pin the engine's current state and attach to the owning database
    pub(crate) fn create(db: &Rc<DbState>, engine: Arc<dyn StorageEngine>) -> Self {
        let token = engine.new_snapshot();
        let state = Rc::new(SnapshotState {
            token,
            engine,
            released: Cell::new(false),
            resource_id: Cell::new(None),
            db: Rc::downgrade(db),
        });

        let id = db.resources.attach(Rc::clone(&state) as Rc<dyn Resource>);
        state.resource_id.set(Some(id));

        Self { state }
    }

    /// Release the snapshot; later calls do nothing
    pub fn close(&self) {
        if let Some(id) = self.state.resource_id.take() {
            if let Some(db) = self.state.db.upgrade() {
                db.resources.detach(id);
            }
        }
        self.state.release();
    }

    pub fn is_closed(&self) -> bool {
        self.state.released.get()
    }

    /// Sequence number the snapshot is pinned at
    pub fn sequence(&self) -> u64 {
        self.state.token.sequence
    }

    /// Engine token, if the snapshot is still open and was taken on `engine`
    pub(crate) fn token_for(&self, engine: &Arc<dyn StorageEngine>) -> Result<SnapshotToken> {
        if self.is_closed() {
            return Err(GateError::InvalidArgument("snapshot is closed".into()));
        }
        let ours = Arc::as_ptr(&self.state.engine) as *const ();
        if ours != Arc::as_ptr(engine) as *const () {
            return Err(GateError::InvalidArgument(
                "snapshot belongs to another store".into(),
            ));
        }
        Ok(self.state.token)
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("sequence", &self.state.token.sequence)
            .field("closed", &self.is_closed())
            .finish()
    }
}
