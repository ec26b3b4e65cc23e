//! Priority Gate
//!
//! Counts a database's in-flight priority work and holds at most one
//! deferred close until that count drains.
//!
//! ```text
//!        close()                      decrement() -> 0
//!  Open ─────────► PendingClose(task) ─────────────────► close task queued
//!    │  count == 0
//!    └───────────► close task queued
//! ```
//!
//! Only ever touched from the calling context.

use std::cell::{Cell, RefCell};
use std::fmt;

type CloseTask = Box<dyn FnOnce()>;

/// In-flight counter with a parked close slot
#[derive(Default)]
pub struct PriorityGate {
    count: Cell<usize>,
    pending_close: RefCell<Option<CloseTask>>,
}

impl PriorityGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self) {
        self.count.set(self.count.get() + 1);
    }

    /// Drop the count by one; reaching zero runs the parked close, once
    pub fn decrement(&self) {
        let count = self.count.get();
        assert!(count > 0, "priority gate decremented below zero");
        self.count.set(count - 1);

        if count == 1 {
            // Take it out first: the close may re-enter the gate
            let close = self.pending_close.borrow_mut().take();
            if let Some(close) = close {
                tracing::debug!("priority work drained, queueing deferred close");
                close();
            }
        }
    }

    /// Whether priority work is in flight (a close must wait)
    pub fn has_pending(&self) -> bool {
        self.count.get() > 0
    }

    pub fn count(&self) -> usize {
        self.count.get()
    }

    /// Whether a close is parked
    pub fn has_parked_close(&self) -> bool {
        self.pending_close.borrow().is_some()
    }

    /// Park `close` until the count reaches zero
    ///
    /// # Panics
    /// If a close is already parked.
    pub fn park_close(&self, close: CloseTask) {
        let mut slot = self.pending_close.borrow_mut();
        assert!(slot.is_none(), "a close is already pending on this database");
        *slot = Some(close);
    }

    /// Remove the parked close without running it
    pub fn take_parked_close(&self) -> Option<CloseTask> {
        self.pending_close.borrow_mut().take()
    }
}

impl fmt::Debug for PriorityGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorityGate")
            .field("count", &self.count.get())
            .field("parked_close", &self.has_parked_close())
            .finish()
    }
}
