use atlasgate::{BatchOp, RangeOptions};

use super::{key_str, keys_of, setup_abcde};

#[test]
fn test_next_batch_sizes() {
    let (_temp, _env, db) = setup_abcde();
    let mut it = db.iterator(RangeOptions::new()).unwrap();

    let first = it.next_batch(2).wait().unwrap();
    let second = it.next_batch(2).wait().unwrap();
    let third = it.next_batch(2).wait().unwrap();
    let done = it.next_batch(2).wait().unwrap();

    assert_eq!(first.iter().map(key_str).collect::<Vec<_>>(), ["a", "b"]);
    assert_eq!(second.iter().map(key_str).collect::<Vec<_>>(), ["c", "d"]);
    assert_eq!(third.iter().map(key_str).collect::<Vec<_>>(), ["e"]);
    assert!(done.is_empty());
    assert!(it.is_ended());
}

#[test]
fn test_next_batch_zero_reads_one() {
    let (_temp, _env, db) = setup_abcde();
    let mut it = db.iterator(RangeOptions::new()).unwrap();

    assert_eq!(it.next_batch(0).wait().unwrap().len(), 1);
}

#[test]
fn test_high_water_mark_cuts_batches() {
    let (_temp, _env, db) = setup_abcde();
    let mut it = db
        .iterator(RangeOptions::new().high_water_mark_bytes(1))
        .unwrap();

    // Each entry is two bytes, already over the mark
    assert_eq!(it.next_batch(100).wait().unwrap().len(), 1);
    assert_eq!(it.next_batch(100).wait().unwrap().len(), 1);
    assert!(!it.is_ended());
}

#[test]
fn test_next_walks_the_range() {
    let (_temp, _env, db) = setup_abcde();
    let mut it = db.iterator(RangeOptions::new().reverse(true)).unwrap();

    let mut keys = Vec::new();
    while let Some(entry) = it.next().wait().unwrap() {
        keys.push(key_str(&entry));
    }

    assert_eq!(keys, ["e", "d", "c", "b", "a"]);
    assert!(it.is_ended());
    assert_eq!(it.next().wait().unwrap(), None);
}

#[test]
fn test_next_serves_from_cache() {
    let (_temp, env, db) = setup_abcde();
    let mut it = db.iterator(RangeOptions::new()).unwrap();

    // First read fetches one entry, the second fills the cache
    assert_eq!(key_str(&it.next().wait().unwrap().unwrap()), "a");
    assert_eq!(key_str(&it.next().wait().unwrap().unwrap()), "b");

    let cached = it.next();
    assert!(cached.is_ready());
    assert_eq!(env.in_flight(), 0);
    assert_eq!(key_str(&cached.wait().unwrap().unwrap()), "c");
}

#[test]
fn test_mixed_next_and_next_batch() {
    let (_temp, _env, db) = setup_abcde();
    let mut it = db.iterator(RangeOptions::new()).unwrap();

    it.next().wait().unwrap();
    it.next().wait().unwrap();
    let rest = it.next_batch(10).wait().unwrap();

    assert_eq!(rest.iter().map(key_str).collect::<Vec<_>>(), ["c", "d", "e"]);
}

#[test]
fn test_large_range() {
    let (_temp, _env, db) = setup_abcde();
    db.clear(RangeOptions::new()).wait().unwrap();
    db.batch(
        (0..2500)
            .map(|i| BatchOp::put(format!("key{:05}", i), "v"))
            .collect(),
    )
    .wait()
    .unwrap();

    let mut it = db.iterator(RangeOptions::new()).unwrap();
    let mut count = 0;
    let mut last = String::new();
    while let Some(entry) = it.next().wait().unwrap() {
        let key = key_str(&entry);
        assert!(key > last);
        last = key;
        count += 1;
    }

    assert_eq!(count, 2500);
    assert_eq!(last, "key02499");
}

#[test]
fn test_iterator_reads_implicit_snapshot() {
    let (_temp, _env, db) = setup_abcde();
    let it = db.iterator(RangeOptions::new()).unwrap();

    db.put("f", "6").wait().unwrap();
    db.del("a").wait().unwrap();

    let keys: Vec<String> = it.all().unwrap().iter().map(key_str).collect();
    assert_eq!(keys, ["a", "b", "c", "d", "e"]);
    assert_eq!(keys_of(&db, RangeOptions::new()), ["b", "c", "d", "e", "f"]);
}

#[test]
fn test_implicit_snapshot_released_on_close() {
    let (_temp, _env, db) = setup_abcde();

    let it = db.iterator(RangeOptions::new()).unwrap();
    assert_eq!(db.get_property("atlas.num-snapshots").unwrap(), "1");

    it.close();
    assert_eq!(db.get_property("atlas.num-snapshots").unwrap(), "0");
}
