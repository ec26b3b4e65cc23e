//! Resource Tracker
//!
//! Per-database registry of live child resources (iterators and explicit
//! snapshots). Resources attach when created and detach when closed; the
//! tracker force-closes whatever is left when the environment is torn down.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

/// A child resource that can be closed from the outside
pub(crate) trait Resource {
    /// Release everything the resource holds. Must tolerate being called on
    /// an already closed resource.
    fn force_close(&self);
}

/// Live child resources of one database, keyed by attach id
#[derive(Default)]
pub(crate) struct ResourceTracker {
    next_id: Cell<u32>,
    resources: RefCell<BTreeMap<u32, Rc<dyn Resource>>>,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, resource: Rc<dyn Resource>) -> u32 {
        let id = self.next_id.get();
        self.next_id.set(id.wrapping_add(1));
        self.resources.borrow_mut().insert(id, resource);
        id
    }

    /// Returns false if `id` was not attached
    pub fn detach(&self, id: u32) -> bool {
        self.resources.borrow_mut().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.resources.borrow().len()
    }

    /// Close and detach every remaining resource; returns how many
    pub fn force_close_all(&self) -> usize {
        let mut closed = 0;
        loop {
            // Closing detaches, so never hold the map across the call
            let next = self.resources.borrow_mut().pop_first();
            let Some((_, resource)) = next else { break };
            resource.force_close();
            closed += 1;
        }
        closed
    }
}
