//! # atlasgate
//!
//! A concurrency-safe access layer over an ordered key-value engine:
//! - Shared engine handles across databases on the same location
//! - Background execution of every engine call, delivered back on the
//!   single-threaded calling context
//! - Deferred close that waits for in-flight reads and writes
//! - Tracked iterators and snapshots, force-closed at teardown
//! - A bundled WAL-backed engine with crash recovery and repair
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Environment (calling context)                │
//! │        Database ── RangeIterator / Snapshot / WriteBatch     │
//! └─────────────────────┬───────────────────────▲───────────────┘
//!            AsyncTask  │                       │ Completion
//! ┌─────────────────────▼───────────────────────┴───────────────┐
//! │                      Worker Pool                             │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                   Handle Registry                            │
//! │           (one engine per location when shared)              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │     WAL     │          │  MemTable   │
//!   │  (Append)   │          │ (versioned) │
//!   └─────────────┘          └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use atlasgate::{Environment, OpenOptions};
//!
//! # fn main() -> atlasgate::Result<()> {
//! let env = Environment::new()?;
//! let db = env.open("/tmp/atlasgate-demo", OpenOptions::default())?;
//!
//! db.put("hello", "world").wait()?;
//! assert_eq!(db.get("hello").wait()?.as_deref(), Some(&b"world"[..]));
//!
//! db.close().wait()?;
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod engine;
pub mod registry;
pub mod runtime;
pub mod db;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{EngineError, GateError, Result};
pub use config::{EnvConfig, OpenOptions, RangeOptions, ReadOptions, WriteOptions};
pub use engine::BatchOp;
pub use registry::{HandleRegistry, StorageLocation};
pub use runtime::{AsyncTask, Environment, EnvironmentBuilder, Pending};
pub use db::{Database, DatabaseStatus, Entry, RangeIterator, Snapshot, WriteBatch};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of atlasgate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
