//! Cursor over a [`MemTable`] pinned at one sequence number

use std::ops::Bound::{Excluded, Included, Unbounded};
use std::sync::Arc;

use bytes::Bytes;

use super::memtable::MemTable;
use super::EngineCursor;
use crate::error::EngineResult;

/// Positioned cursor reading the table as of `sequence`
pub struct TableCursor {
    table: Arc<MemTable>,
    sequence: u64,
    current: Option<(Bytes, Bytes)>,
}

impl TableCursor {
    pub fn new(table: Arc<MemTable>, sequence: u64) -> Self {
        Self {
            table,
            sequence,
            current: None,
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl EngineCursor for TableCursor {
    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn seek_to_first(&mut self) {
        self.current = self.table.first_visible(Unbounded, self.sequence);
    }

    fn seek_to_last(&mut self) {
        self.current = self.table.last_visible(Unbounded, self.sequence);
    }

    fn seek(&mut self, target: &[u8]) {
        self.current = self.table.first_visible(Included(target), self.sequence);
    }

    fn next(&mut self) {
        if let Some((key, _)) = self.current.take() {
            self.current = self.table.first_visible(Excluded(key.as_ref()), self.sequence);
        }
    }

    fn prev(&mut self) {
        if let Some((key, _)) = self.current.take() {
            self.current = self.table.last_visible(Excluded(key.as_ref()), self.sequence);
        }
    }

    fn key(&self) -> Bytes {
        self.current.as_ref().map(|(k, _)| k.clone()).unwrap_or_default()
    }

    fn value(&self) -> Bytes {
        self.current.as_ref().map(|(_, v)| v.clone()).unwrap_or_default()
    }

    fn status(&self) -> EngineResult<()> {
        Ok(())
    }
}
