use atlasgate::{BatchOp, RangeOptions};

use super::{keys_of, setup_abcde};

#[test]
fn test_clear_everything() {
    let (_temp, _env, db) = setup_abcde();

    db.clear(RangeOptions::new()).wait().unwrap();

    assert!(keys_of(&db, RangeOptions::new()).is_empty());
    assert_eq!(db.get_property("atlas.num-entries").unwrap(), "0");
}

#[test]
fn test_clear_range() {
    let (_temp, _env, db) = setup_abcde();

    db.clear(RangeOptions::new().gt("a").lte("c")).wait().unwrap();

    assert_eq!(keys_of(&db, RangeOptions::new()), ["a", "d", "e"]);
}

#[test]
fn test_clear_with_limit() {
    let (_temp, _env, db) = setup_abcde();

    db.clear(RangeOptions::new().limit(2)).wait().unwrap();

    assert_eq!(keys_of(&db, RangeOptions::new()), ["c", "d", "e"]);
}

#[test]
fn test_clear_reverse_with_limit() {
    let (_temp, _env, db) = setup_abcde();

    db.clear(RangeOptions::new().reverse(true).limit(2)).wait().unwrap();

    assert_eq!(keys_of(&db, RangeOptions::new()), ["a", "b", "c"]);
}

#[test]
fn test_clear_empty_range() {
    let (_temp, _env, db) = setup_abcde();
    let before = db.get_property("atlas.sequence").unwrap();

    db.clear(RangeOptions::new().gte("x")).wait().unwrap();
    assert_eq!(db.get_property("atlas.sequence").unwrap(), before);

    db.clear(RangeOptions::new().gte("x")).wait().unwrap();
    assert_eq!(db.get_property("atlas.sequence").unwrap(), before);

    assert_eq!(keys_of(&db, RangeOptions::new()).len(), 5);
}

#[test]
fn test_clear_in_rounds() {
    let (_temp, _env, db) = setup_abcde();
    db.batch(
        (0..300)
            .map(|i| BatchOp::put(format!("bulk{:04}", i), "v"))
            .collect(),
    )
    .wait()
    .unwrap();
    let before: u64 = db.get_property("atlas.sequence").unwrap().parse().unwrap();

    db.clear(RangeOptions::new().gte("bulk").lt("bulk~").high_water_mark_bytes(64))
        .wait()
        .unwrap();

    // Several atomic writes, one per round
    let after: u64 = db.get_property("atlas.sequence").unwrap().parse().unwrap();
    assert!(after - before > 1);
    assert_eq!(keys_of(&db, RangeOptions::new()), ["a", "b", "c", "d", "e"]);
}

#[test]
fn test_clear_does_not_leave_tracked_resources() {
    let (_temp, _env, db) = setup_abcde();

    db.clear(RangeOptions::new()).wait().unwrap();

    assert_eq!(db.resource_count(), 0);
    assert_eq!(db.get_property("atlas.num-snapshots").unwrap(), "0");
    db.close().wait().unwrap();
}
