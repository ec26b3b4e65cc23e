use std::fs::{self, OpenOptions as FileOptions};
use std::io::Write;

use atlasgate::{BatchOp, OpenOptions};
use tempfile::TempDir;

use super::{setup_env, setup_temp_db, store_path, value_of};

// =============================================================================
// Properties
// =============================================================================

#[test]
fn test_get_property() {
    let (_temp, _env, db) = setup_temp_db();
    db.put("a", "1").wait().unwrap();
    db.put("b", "2").wait().unwrap();
    db.del("a").wait().unwrap();

    assert_eq!(db.get_property("atlas.num-entries").unwrap(), "1");
    assert_eq!(db.get_property("atlas.sequence").unwrap(), "3");
    assert!(db
        .get_property("atlas.options")
        .unwrap()
        .contains("write_buffer_size: 4194304"));
    assert!(db.get_property("atlas.stats").unwrap().contains("writes: 3"));
}

#[test]
fn test_unknown_property_is_empty() {
    let (_temp, _env, db) = setup_temp_db();

    assert_eq!(db.get_property("no.such.property").unwrap(), "");
}

// =============================================================================
// Size / Compaction
// =============================================================================

#[test]
fn test_approximate_size() {
    let (_temp, _env, db) = setup_temp_db();
    db.put("a", "1111").wait().unwrap();
    db.put("b", "2222").wait().unwrap();
    db.put("z", "9999").wait().unwrap();

    assert_eq!(db.approximate_size("a", "c").wait().unwrap(), 10);
    assert_eq!(db.approximate_size("c", "d").wait().unwrap(), 0);
    assert_eq!(db.approximate_size("z", "a").wait().unwrap(), 0);
}

#[test]
fn test_compact_range_prunes_history() {
    let (_temp, _env, db) = setup_temp_db();
    for i in 0..10 {
        db.put("k", format!("v{}", i)).wait().unwrap();
    }
    db.put("gone", "x").wait().unwrap();
    db.del("gone").wait().unwrap();

    db.compact_range(None, None).wait().unwrap();

    let stats = db.get_property("atlas.stats").unwrap();
    assert!(stats.contains("versions: 1\n"), "{}", stats);
    assert!(stats.contains("compactions: 1"));
    assert_eq!(value_of(&db, "k"), Some("v9".into()));
    assert_eq!(value_of(&db, "gone"), None);
}

#[test]
fn test_compact_range_keeps_snapshot_view() {
    let (_temp, _env, db) = setup_temp_db();
    db.put("k", "old").wait().unwrap();
    let snapshot = db.snapshot().unwrap();
    db.put("k", "new").wait().unwrap();

    db.compact_range(Some(&b"a"[..]), Some(&b"z"[..])).wait().unwrap();

    let options = atlasgate::ReadOptions::new().snapshot(&snapshot);
    assert_eq!(
        db.get_with("k", &options).wait().unwrap().as_deref(),
        Some(&b"old"[..])
    );
    assert_eq!(value_of(&db, "k"), Some("new".into()));
    snapshot.close();
}

#[test]
fn test_compacted_store_reopens() {
    let (_temp, _env, db) = setup_temp_db();
    db.batch((0..50).map(|i| BatchOp::put(format!("k{:02}", i), "v")).collect())
        .wait()
        .unwrap();
    db.del("k00").wait().unwrap();
    db.compact_range(None, None).wait().unwrap();
    db.close().wait().unwrap();

    db.open(OpenOptions::default()).wait().unwrap();

    assert_eq!(db.get_property("atlas.num-entries").unwrap(), "49");
    assert_eq!(db.get_property("atlas.sequence").unwrap(), "2");
    db.close().wait().unwrap();
}

#[test]
fn test_small_write_buffer_checkpoints_log() {
    let temp_dir = TempDir::new().unwrap();
    let env = setup_env();
    let path = store_path(&temp_dir);
    let options = OpenOptions::builder().write_buffer_size(256).build();
    let db = env.open(&*path, options.clone()).unwrap();

    for i in 0..100 {
        db.put("same-key", format!("value-{:04}", i)).wait().unwrap();
    }

    let wal_bytes: u64 = db.get_property("atlas.wal-bytes").unwrap().parse().unwrap();
    assert!(wal_bytes <= 512, "log not checkpointed: {} bytes", wal_bytes);
    db.close().wait().unwrap();

    db.open(options).wait().unwrap();
    assert_eq!(value_of(&db, "same-key"), Some("value-0099".into()));
    db.close().wait().unwrap();
}

// =============================================================================
// Destroy / Repair
// =============================================================================

#[test]
fn test_destroy_removes_store() {
    let (temp_dir, env, db) = setup_temp_db();
    db.put("k", "v").wait().unwrap();
    db.close().wait().unwrap();

    env.destroy(store_path(&temp_dir)).wait().unwrap();

    assert!(!store_path(&temp_dir).exists());
}

#[test]
fn test_destroy_missing_store_succeeds() {
    let temp_dir = TempDir::new().unwrap();
    let env = setup_env();

    env.destroy(store_path(&temp_dir)).wait().unwrap();
}

#[test]
fn test_destroy_open_store_is_locked() {
    let (temp_dir, env, db) = setup_temp_db();

    let err = env.destroy(store_path(&temp_dir)).wait().unwrap_err();

    assert_eq!(err.code(), Some("LOCKED"));
    db.close().wait().unwrap();
}

#[test]
fn test_repair_missing_store_is_io_error() {
    let temp_dir = TempDir::new().unwrap();
    let env = setup_env();

    let err = env.repair(store_path(&temp_dir)).wait().unwrap_err();

    assert_eq!(err.code(), Some("IO_ERROR"));
}

#[test]
fn test_corrupt_log_fails_open_until_repaired() {
    let (temp_dir, env, db) = setup_temp_db();
    db.put("a", "1").wait().unwrap();
    db.put("b", "2").wait().unwrap();
    db.put("c", "3").wait().unwrap();
    db.close().wait().unwrap();

    // Flip the last byte: the final record fails its checksum
    let wal = store_path(&temp_dir).join("wal.log");
    let mut bytes = fs::read(&wal).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&wal, &bytes).unwrap();

    let err = db.open(OpenOptions::default()).wait().unwrap_err();
    assert_eq!(err.code(), Some("CORRUPTION"));
    assert!(err.to_string().starts_with("Corruption: "));

    env.repair(store_path(&temp_dir)).wait().unwrap();
    db.open(OpenOptions::default()).wait().unwrap();

    assert_eq!(value_of(&db, "a"), Some("1".into()));
    assert_eq!(value_of(&db, "b"), Some("2".into()));
    assert_eq!(value_of(&db, "c"), None);
    db.close().wait().unwrap();
}

#[test]
fn test_torn_log_tail_is_dropped_on_open() {
    let (temp_dir, _env, db) = setup_temp_db();
    db.put("a", "1").wait().unwrap();
    db.close().wait().unwrap();

    let wal = store_path(&temp_dir).join("wal.log");
    let clean_len = fs::metadata(&wal).unwrap().len();
    let mut file = FileOptions::new().append(true).open(&wal).unwrap();
    file.write_all(&[1, 2, 3, 4, 5]).unwrap();
    drop(file);

    db.open(OpenOptions::default()).wait().unwrap();

    assert_eq!(value_of(&db, "a"), Some("1".into()));
    assert_eq!(fs::metadata(&wal).unwrap().len(), clean_len);
    db.put("b", "2").wait().unwrap();
    db.close().wait().unwrap();

    db.open(OpenOptions::default()).wait().unwrap();
    assert_eq!(value_of(&db, "b"), Some("2".into()));
    db.close().wait().unwrap();
}
