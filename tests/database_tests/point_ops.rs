use atlasgate::{BatchOp, WriteOptions};
use bytes::Bytes;

use super::{setup_temp_db, value_of};

#[test]
fn test_put_get() {
    let (_temp, _env, db) = setup_temp_db();

    db.put("hello", "world").wait().unwrap();

    assert_eq!(value_of(&db, "hello"), Some("world".into()));
}

#[test]
fn test_get_missing_key_is_none() {
    let (_temp, _env, db) = setup_temp_db();

    assert_eq!(db.get("missing").wait().unwrap(), None);
}

#[test]
fn test_put_overwrites() {
    let (_temp, _env, db) = setup_temp_db();

    db.put("k", "v1").wait().unwrap();
    db.put("k", "v2").wait().unwrap();

    assert_eq!(value_of(&db, "k"), Some("v2".into()));
}

#[test]
fn test_del() {
    let (_temp, _env, db) = setup_temp_db();
    db.put("k", "v").wait().unwrap();

    db.del("k").wait().unwrap();

    assert_eq!(db.get("k").wait().unwrap(), None);
}

#[test]
fn test_del_missing_key_succeeds() {
    let (_temp, _env, db) = setup_temp_db();

    db.del("never-written").wait().unwrap();
}

#[test]
fn test_binary_keys_and_values() {
    let (_temp, _env, db) = setup_temp_db();
    let key = [0u8, 255, 1, 254];
    let value = [9u8; 1024];

    db.put(key, value).wait().unwrap();

    assert_eq!(
        db.get(key).wait().unwrap(),
        Some(Bytes::copy_from_slice(&value))
    );
}

#[test]
fn test_empty_value() {
    let (_temp, _env, db) = setup_temp_db();

    db.put("k", "").wait().unwrap();

    assert_eq!(db.get("k").wait().unwrap(), Some(Bytes::new()));
    assert!(db.has("k").wait().unwrap());
}

#[test]
fn test_synced_put() {
    let (_temp, _env, db) = setup_temp_db();

    db.put_with("k", "v", WriteOptions::sync()).wait().unwrap();

    assert_eq!(value_of(&db, "k"), Some("v".into()));
}

// =============================================================================
// Multi-key Reads
// =============================================================================

#[test]
fn test_get_many_preserves_order() {
    let (_temp, _env, db) = setup_temp_db();
    db.put("a", "1").wait().unwrap();
    db.put("c", "3").wait().unwrap();

    let values = db.get_many(["c", "b", "a"]).wait().unwrap();

    assert_eq!(
        values,
        vec![Some(Bytes::from("3")), None, Some(Bytes::from("1"))]
    );
}

#[test]
fn test_get_many_empty() {
    let (_temp, _env, db) = setup_temp_db();

    let values = db.get_many(Vec::<&str>::new()).wait().unwrap();

    assert!(values.is_empty());
}

#[test]
fn test_has_and_has_many() {
    let (_temp, _env, db) = setup_temp_db();
    db.put("a", "1").wait().unwrap();
    db.put("b", "2").wait().unwrap();
    db.del("b").wait().unwrap();

    assert!(db.has("a").wait().unwrap());
    assert!(!db.has("b").wait().unwrap());
    assert_eq!(
        db.has_many(["b", "a", "z"]).wait().unwrap(),
        vec![false, true, false]
    );
}

#[test]
fn test_has_does_not_match_prefix() {
    let (_temp, _env, db) = setup_temp_db();
    db.put("abc", "1").wait().unwrap();

    assert!(!db.has("ab").wait().unwrap());
}

// =============================================================================
// Array Batch
// =============================================================================

#[test]
fn test_batch_applies_all_ops() {
    let (_temp, _env, db) = setup_temp_db();
    db.put("old", "x").wait().unwrap();

    db.batch(vec![
        BatchOp::put("a", "1"),
        BatchOp::put("b", "2"),
        BatchOp::delete("old"),
    ])
    .wait()
    .unwrap();

    assert_eq!(value_of(&db, "a"), Some("1".into()));
    assert_eq!(value_of(&db, "b"), Some("2".into()));
    assert_eq!(value_of(&db, "old"), None);
}

#[test]
fn test_batch_later_op_wins() {
    let (_temp, _env, db) = setup_temp_db();

    db.batch(vec![
        BatchOp::put("k", "first"),
        BatchOp::delete("k"),
        BatchOp::put("k", "last"),
        BatchOp::put("gone", "x"),
        BatchOp::delete("gone"),
    ])
    .wait()
    .unwrap();

    assert_eq!(value_of(&db, "k"), Some("last".into()));
    assert_eq!(value_of(&db, "gone"), None);
}

#[test]
fn test_empty_batch_succeeds() {
    let (_temp, _env, db) = setup_temp_db();

    db.batch(Vec::new()).wait().unwrap();

    assert_eq!(db.get_property("atlas.sequence").unwrap(), "0");
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_many_outstanding_operations() {
    let (_temp, env, db) = setup_temp_db();

    let writes: Vec<_> = (0..100)
        .map(|i| db.put(format!("key{:03}", i), format!("value{}", i)))
        .collect();
    assert_eq!(env.in_flight(), 100);
    env.run_until_idle();

    for write in writes {
        assert!(write.is_ready());
        write.wait().unwrap();
    }
    assert_eq!(db.get_property("atlas.num-entries").unwrap(), "100");
}
