//! Range Iterator
//!
//! Calling-context handle over a [`RangeCursor`]. While a batch is being
//! read the cursor is moved into the worker task and comes back with the
//! completion; the handle tracks that with a `nexting` flag.
//!
//! ## Lifecycle
//! ```text
//! Created ──(first read: seek to range | seek())──► Iterating ──► Closed
//! ```
//! `abort()` raises a flag the worker checks between entries; the batch in
//! flight then resolves to `Aborted`.
//!
//! Dropping the handle closes the iterator. If a batch is in flight the
//! close happens when it returns.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::range::{Entry, RangeCursor};
use super::resources::Resource;
use super::tasks::NextTask;
use super::DbState;
use crate::config::RangeOptions;
use crate::engine::{SnapshotToken, StorageEngine};
use crate::error::{GateError, Result};
use crate::runtime::Pending;

/// Batch size of the first `next()` after creation or `seek()`
const FIRST_NEXT_SIZE: usize = 1;

/// Batch size of later `next()` refills
const NEXT_CACHE_SIZE: usize = 1000;

pub(crate) struct IteratorState {
    /// `None` while a batch is in flight or after close
    cursor: RefCell<Option<RangeCursor>>,
    cache: RefCell<VecDeque<Entry>>,

    nexting: Cell<bool>,
    closed: Cell<bool>,
    close_on_return: Cell<bool>,
    ended: Cell<bool>,
    aborted: Arc<AtomicBool>,

    resource_id: Cell<Option<u32>>,
    db: Weak<DbState>,
}

impl IteratorState {
    fn close_now(&self) {
        if self.closed.replace(true) {
            return;
        }
        if let Some(mut cursor) = self.cursor.borrow_mut().take() {
            cursor.close();
        }
        self.cache.borrow_mut().clear();

        if let Some(id) = self.resource_id.take() {
            if let Some(db) = self.db.upgrade() {
                db.resources.detach(id);
            }
        }
    }
}

impl Resource for IteratorState {
    fn force_close(&self) {
        self.resource_id.set(None);
        self.close_now();
    }
}

/// Bounded, directional, snapshot-isolated iterator over a database
pub struct RangeIterator {
    state: Rc<IteratorState>,
    next_size: usize,
}

impl RangeIterator {
    pub(crate) fn create(
        db: &Rc<DbState>,
        engine: Arc<dyn StorageEngine>,
        options: &RangeOptions,
        snapshot: Option<SnapshotToken>,
    ) -> Self {
        let aborted = Arc::new(AtomicBool::new(false));
        let cursor = RangeCursor::new(engine, options, snapshot, Arc::clone(&aborted));

        let state = Rc::new(IteratorState {
            cursor: RefCell::new(Some(cursor)),
            cache: RefCell::new(VecDeque::new()),
            nexting: Cell::new(false),
            closed: Cell::new(false),
            close_on_return: Cell::new(false),
            ended: Cell::new(false),
            aborted,
            resource_id: Cell::new(None),
            db: Rc::downgrade(db),
        });

        let id = db.resources.attach(Rc::clone(&state) as Rc<dyn Resource>);
        state.resource_id.set(Some(id));

        Self {
            state,
            next_size: FIRST_NEXT_SIZE,
        }
    }

    /// Read up to `size` entries (0 counts as 1)
    ///
    /// Resolves to an empty batch once the range is exhausted.
    ///
    /// # Panics
    /// If the iterator was closed or another read is still in flight.
    pub fn next_batch(&mut self, size: usize) -> Pending<Vec<Entry>> {
        self.assert_usable("next_batch");
        let size = size.max(1);

        {
            let mut cache = self.state.cache.borrow_mut();
            if !cache.is_empty() {
                let take = size.min(cache.len());
                return Pending::resolved("next", Ok(cache.drain(..take).collect()));
            }
        }

        self.fetch(size, |_, entries| entries)
    }

    /// Read the next entry, `None` once the range is exhausted
    ///
    /// Entries are fetched in batches and served from a local cache.
    ///
    /// # Panics
    /// If the iterator was closed or another read is still in flight.
    pub fn next(&mut self) -> Pending<Option<Entry>> {
        self.assert_usable("next");

        if let Some(entry) = self.state.cache.borrow_mut().pop_front() {
            return Pending::resolved("next", Ok(Some(entry)));
        }

        let size = self.next_size;
        self.next_size = NEXT_CACHE_SIZE;

        self.fetch(size, |state, entries| {
            let mut cache = state.cache.borrow_mut();
            cache.extend(entries);
            cache.pop_front()
        })
    }

    /// Collect every remaining entry, then close the iterator
    pub fn all(mut self) -> Result<Vec<Entry>> {
        let mut entries: Vec<Entry> = self.state.cache.borrow_mut().drain(..).collect();

        loop {
            let batch = self.next_batch(NEXT_CACHE_SIZE).wait()?;
            if batch.is_empty() {
                break;
            }
            entries.extend(batch);
        }

        Ok(entries)
    }

    /// Reposition at-or-after `target` (at-or-before when reversed)
    ///
    /// A target outside the range makes the next read report exhaustion.
    ///
    /// # Panics
    /// If the iterator was closed or a read is in flight.
    pub fn seek(&mut self, target: impl AsRef<[u8]>) {
        self.assert_usable("seek");

        if let Some(cursor) = self.state.cursor.borrow_mut().as_mut() {
            cursor.seek(target.as_ref());
        }
        self.state.cache.borrow_mut().clear();
        self.state.ended.set(false);
        self.next_size = FIRST_NEXT_SIZE;
    }

    /// Ask the read in flight (or the next one) to stop and reject with
    /// `Aborted`
    pub fn abort(&self) {
        self.state.aborted.store(true, Ordering::Release);
    }

    /// Close the iterator and release its implicit snapshot
    pub fn close(self) {
        drop(self);
    }

    /// Whether the range has been read to the end
    pub fn is_ended(&self) -> bool {
        self.state.ended.get() && self.state.cache.borrow().is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.get()
    }

    // =========================================================================
    // Internal
    // =========================================================================

    fn assert_usable(&self, op: &str) {
        assert!(!self.state.closed.get(), "{}() called on a closed iterator", op);
        assert!(
            !self.state.nexting.get(),
            "{}() called while a read is in flight",
            op
        );
    }

    /// Submit one batch read; `deliver` shapes the entries on completion
    fn fetch<O, D>(&mut self, size: usize, deliver: D) -> Pending<O>
    where
        O: 'static,
        D: FnOnce(&IteratorState, Vec<Entry>) -> O + 'static,
    {
        if self.state.ended.get() {
            return Pending::resolved("next", Ok(deliver(&*self.state, Vec::new())));
        }

        let Some(db) = self.state.db.upgrade() else {
            return Pending::resolved("next", Err(GateError::NotOpen("next")));
        };
        let Some(rt) = db.runtime() else {
            return Pending::resolved("next", Err(GateError::NotOpen("next")));
        };
        let Some(cursor) = self.state.cursor.borrow_mut().take() else {
            return Pending::resolved("next", Err(GateError::NotOpen("next")));
        };

        self.state.nexting.set(true);
        let on_complete = Rc::clone(&self.state);
        let on_finally = Rc::clone(&self.state);

        // Not priority-gated: close never waits on iterator reads
        rt.submit(
            "next",
            NextTask { cursor, size },
            move |task, result| {
                let NextTask { cursor, .. } = task;
                on_complete.ended.set(cursor.ended());
                *on_complete.cursor.borrow_mut() = Some(cursor);

                if on_complete.aborted.load(Ordering::Acquire) {
                    return Err(GateError::Aborted);
                }
                result.map(|entries| deliver(&*on_complete, entries))
            },
            move || {
                on_finally.nexting.set(false);
                if on_finally.close_on_return.get() {
                    on_finally.close_now();
                }
            },
        )
    }
}

impl Drop for RangeIterator {
    fn drop(&mut self) {
        if self.state.closed.get() {
            return;
        }
        if self.state.nexting.get() {
            self.state.close_on_return.set(true);
        } else {
            self.state.close_now();
        }
    }
}

impl fmt::Debug for RangeIterator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RangeIterator")
            .field("nexting", &self.state.nexting.get())
            .field("ended", &self.state.ended.get())
            .field("closed", &self.state.closed.get())
            .field("cached", &self.state.cache.borrow().len())
            .finish()
    }
}
