use atlasgate::{DatabaseStatus, GateError, OpenOptions, RangeOptions};
use tempfile::TempDir;

use super::{setup_env, setup_temp_db, store_path};

#[test]
fn test_teardown_closes_open_databases() {
    let (temp_dir, env, db) = setup_temp_db();
    db.put("k", "v").wait().unwrap();

    env.teardown();

    assert!(env.is_torn_down());
    assert_eq!(db.status(), DatabaseStatus::Closed);

    // The lock is free again
    let env2 = setup_env();
    let reopened = env2.open(store_path(&temp_dir), OpenOptions::default()).unwrap();
    assert_eq!(reopened.get("k").wait().unwrap().as_deref(), Some(&b"v"[..]));
    reopened.close().wait().unwrap();
}

#[test]
fn test_teardown_force_closes_resources() {
    let (_temp, env, db) = setup_temp_db();
    let it = db.iterator(RangeOptions::default()).unwrap();
    let snapshot = db.snapshot().unwrap();
    assert_eq!(db.resource_count(), 2);

    env.teardown();

    assert!(it.is_closed());
    assert!(snapshot.is_closed());
    assert_eq!(db.resource_count(), 0);
}

#[test]
fn test_unresolved_outcomes_report_not_open() {
    let (_temp, env, db) = setup_temp_db();
    let read = db.get("k");

    env.teardown();

    assert_eq!(read.wait().unwrap_err(), GateError::NotOpen("get"));
}

#[test]
fn test_parked_close_resolves_at_teardown() {
    let (_temp, env, db) = setup_temp_db();
    let write = db.put("k", "v");
    let close = db.close();
    assert!(db.has_parked_close());

    env.teardown();

    assert_eq!(close.wait().unwrap_err(), GateError::NotOpen("close"));
    assert_eq!(write.wait().unwrap_err(), GateError::NotOpen("put"));
    assert_eq!(db.status(), DatabaseStatus::Closed);
}

#[test]
fn test_operations_after_teardown() {
    let temp_dir = TempDir::new().unwrap();
    let env = setup_env();
    let db = env.database(store_path(&temp_dir));

    env.teardown();

    assert_eq!(
        db.open(OpenOptions::default()).wait().unwrap_err(),
        GateError::NotOpen("open")
    );
    assert_eq!(env.destroy(store_path(&temp_dir)).wait().unwrap_err(), GateError::NotOpen("destroy"));
}

#[test]
fn test_teardown_is_idempotent() {
    let (_temp, env, _db) = setup_temp_db();

    env.teardown();
    env.teardown();

    assert!(env.is_torn_down());
}

#[test]
fn test_dropping_environment_releases_store() {
    let temp_dir = TempDir::new().unwrap();
    let path = store_path(&temp_dir);
    {
        let env = setup_env();
        let db = env.open(&*path, OpenOptions::default()).unwrap();
        db.put("k", "v").wait().unwrap();
        drop(env);
        assert_eq!(db.status(), DatabaseStatus::Closed);
    }

    let env = setup_env();
    let db = env.open(&*path, OpenOptions::default()).unwrap();
    assert!(db.has("k").wait().unwrap());
    db.close().wait().unwrap();
}

#[test]
fn test_dropping_open_database_releases_store() {
    let temp_dir = TempDir::new().unwrap();
    let env = setup_env();
    let path = store_path(&temp_dir);

    let db = env.open(&*path, OpenOptions::default()).unwrap();
    db.put("k", "v").wait().unwrap();
    drop(db);

    let again = env.open(&*path, OpenOptions::default()).unwrap();
    assert!(again.has("k").wait().unwrap());
    again.close().wait().unwrap();
}
