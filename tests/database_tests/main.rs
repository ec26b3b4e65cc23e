//! Tests for Database
//!
//! These tests verify:
//! - Open / close lifecycle and reopen durability
//! - Point reads and writes through background tasks
//! - Handle sharing through the registry
//! - Deferred close behind in-flight priority work
//! - Environment teardown and drop-while-open
//! - Maintenance: properties, sizes, compaction, destroy, repair
//! - Synchronous reads and explicit snapshots

mod maintenance;
mod point_ops;
mod teardown;

use std::path::PathBuf;

use atlasgate::{Database, Environment, OpenOptions};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

pub fn setup_env() -> Environment {
    Environment::builder().worker_threads(2).build().unwrap()
}

pub fn store_path(temp_dir: &TempDir) -> PathBuf {
    temp_dir.path().join("db")
}

pub fn setup_temp_db() -> (TempDir, Environment, Database) {
    let temp_dir = TempDir::new().unwrap();
    let env = setup_env();
    let db = env.open(store_path(&temp_dir), OpenOptions::default()).unwrap();
    (temp_dir, env, db)
}

pub fn shared_options() -> OpenOptions {
    OpenOptions::builder().multithreading(true).build()
}

pub fn value_of(db: &Database, key: &str) -> Option<String> {
    db.get(key)
        .wait()
        .unwrap()
        .map(|v| String::from_utf8(v.to_vec()).unwrap())
}
