//! Async Task Protocol
//!
//! One unit of background work moves through three phases:
//!
//! ```text
//!   calling context          worker thread            calling context
//!  ┌──────────────┐        ┌──────────────┐        ┌───────────────────────┐
//!  │ submit       │ ─────► │ execute()    │ ─────► │ complete → finalize   │
//!  │ (gate += 1)  │  job   │ EngineResult │ result │ (deliver, gate -= 1)  │
//!  └──────────────┘        └──────────────┘        └───────────────────────┘
//! ```
//!
//! - `execute()` runs exactly once, on a worker, and only sees what the task
//!   owns (it must be `Send`).
//! - complete converts the recorded outcome. A `NotFound` becomes the task's
//!   [`absent`](AsyncTask::absent) value when it has one; every other engine
//!   error becomes a [`GateError`](crate::GateError).
//! - finalize always runs after complete; for gated tasks it decrements the
//!   database's priority gate.

use std::any::Any;

use crate::error::EngineResult;

/// Background work with an execute/complete/finalize protocol
pub trait AsyncTask: Send + 'static {
    /// Success payload produced on the worker
    type Output: Send + 'static;

    /// Run the operation body on a worker thread
    fn execute(&mut self) -> EngineResult<Self::Output>;

    /// What a `NotFound` outcome resolves to, or `None` to report it as an error
    fn absent(&self) -> Option<Self::Output> {
        None
    }
}

/// A finished task travelling back to the calling context
pub(crate) struct Completion {
    pub id: u64,

    /// `(T, EngineResult<T::Output>)` for the task's concrete type
    pub payload: Box<dyn Any + Send>,
}
