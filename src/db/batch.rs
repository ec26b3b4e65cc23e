//! Write Batch
//!
//! Ordered buffer of puts and deletes applied atomically by
//! [`WriteBatch::write`]. Within one write a later op on a key overrides an
//! earlier one.

use std::fmt;

use bytes::Bytes;

use super::tasks::WriteTask;
use super::Database;
use crate::config::WriteOptions;
use crate::engine::BatchOp;
use crate::runtime::Pending;

/// Chained batch of writes against one database
pub struct WriteBatch {
    db: Database,
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub(crate) fn new(db: Database) -> Self {
        Self {
            db,
            ops: Vec::new(),
        }
    }

    pub fn put(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> &mut Self {
        self.ops.push(BatchOp::put(key, value));
        self
    }

    pub fn delete(&mut self, key: impl AsRef<[u8]>) -> &mut Self {
        self.ops.push(BatchOp::Delete {
            key: Bytes::copy_from_slice(key.as_ref()),
        });
        self
    }

    /// Drop every buffered op
    pub fn clear(&mut self) -> &mut Self {
        self.ops.clear();
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Apply every buffered op atomically
    ///
    /// Priority work: a close requested meanwhile waits for it. Writing an
    /// empty batch succeeds without touching the engine.
    pub fn write(self, options: WriteOptions) -> Pending<()> {
        let engine = match self.db.state.engine("write") {
            Ok(engine) => engine,
            Err(e) => return Pending::resolved("write", Err(e)),
        };

        let task = WriteTask {
            engine,
            ops: self.ops,
            options,
        };
        self.db.submit_gated("write", task, |_, result| result)
    }
}

impl fmt::Debug for WriteBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteBatch")
            .field("location", self.db.location())
            .field("ops", &self.ops.len())
            .finish()
    }
}
