use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use atlasgate::engine::wal::{
    Operation, ReadOutcome, WalEntry, WalReader, WalRecovery, WalWriter, HEADER_SIZE,
};
use atlasgate::error::EngineError;

use super::setup_temp_wal;

fn put(i: usize) -> Operation {
    Operation::Put {
        key: format!("key{}", i).into_bytes(),
        value: format!("value{}", i).into_bytes(),
    }
}

/// Write `count` records with lsn 1..=count through WalWriter
fn write_entries(path: &Path, count: usize) {
    let mut writer = WalWriter::open(path).unwrap();
    for i in 1..=count {
        writer.append(&WalEntry::new(i as u64, vec![put(i)]), true).unwrap();
    }
}

// =============================================================================
// Entry Tests
// =============================================================================

#[test]
fn test_entry_framing() {
    let entry = WalEntry::new(7, vec![put(1), Operation::Delete { key: b"gone".to_vec() }]);

    let bytes = entry.serialize().unwrap();

    assert_eq!(&bytes[..8], &7u64.to_le_bytes());
    let len = u32::from_le_bytes(bytes[12..16].try_into().unwrap()) as usize;
    assert_eq!(bytes.len(), HEADER_SIZE + len);
    assert_eq!(WalEntry::deserialize(&bytes).unwrap(), entry);
}

#[test]
fn test_entry_checksum_mismatch() {
    let mut bytes = WalEntry::new(1, vec![put(1)]).serialize().unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;

    let err = WalEntry::deserialize(&bytes).unwrap_err();

    assert!(matches!(err, EngineError::Corruption(_)));
    assert!(err.to_string().contains("checksum mismatch"));
}

#[test]
fn test_entry_short_header() {
    let err = WalEntry::deserialize(&[0u8; 4]).unwrap_err();

    assert!(matches!(err, EngineError::Corruption(_)));
}

#[test]
fn test_entry_over_limit_is_rejected() {
    let entry = WalEntry::new(
        1,
        vec![Operation::Put {
            key: b"k".to_vec(),
            value: vec![0u8; 100],
        }],
    );

    let err = entry.serialize_within(50).unwrap_err();

    assert!(matches!(err, EngineError::InvalidArgument(_)));
    assert!(entry.serialize_within(1024).is_ok());
}

#[test]
fn test_split_keeps_records_under_limit() {
    let operations: Vec<_> = (0..40).map(put).collect();

    let records = WalEntry::split(9, operations.clone(), 200).unwrap();

    assert!(records.len() > 1);
    assert!(records.iter().all(|r| r.lsn == 9));
    for record in &records {
        record.serialize_within(200).unwrap();
    }
    let rejoined: Vec<_> = records.into_iter().flat_map(|r| r.operations).collect();
    assert_eq!(rejoined, operations);
}

#[test]
fn test_split_empty_state_is_one_record() {
    let records = WalEntry::split(3, Vec::new(), 200).unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].lsn, 3);
    assert!(records[0].operations.is_empty());
}

// =============================================================================
// Reader / Writer Tests
// =============================================================================

#[test]
fn test_reader_reads_in_order() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries(&wal_path, 3);

    let mut reader = WalReader::open(&wal_path).unwrap();
    let mut lsns = Vec::new();
    while let ReadOutcome::Entry(entry) = reader.next_record().unwrap() {
        lsns.push(entry.lsn);
    }

    assert_eq!(lsns, vec![1, 2, 3]);
    assert_eq!(reader.position(), fs::metadata(&wal_path).unwrap().len());
}

#[test]
fn test_writer_tracks_length_and_reopens() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries(&wal_path, 2);
    let on_disk = fs::metadata(&wal_path).unwrap().len();

    let mut writer = WalWriter::open(&wal_path).unwrap();
    assert_eq!(writer.len(), on_disk);
    writer.append(&WalEntry::new(3, vec![put(3)]), false).unwrap();
    writer.sync().unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(result.last_lsn, 3);
}

#[test]
fn test_writer_rewrite_replaces_log() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = WalWriter::open(&wal_path).unwrap();
    for i in 1..=10 {
        writer.append(&WalEntry::new(i, vec![put(i as usize)]), false).unwrap();
    }

    writer.rewrite(&[WalEntry::new(10, vec![put(10)])]).unwrap();
    writer.append(&WalEntry::new(11, vec![put(11)]), false).unwrap();

    let (entries, _) = WalRecovery::recover(&wal_path).unwrap();
    assert_eq!(entries.iter().map(|e| e.lsn).collect::<Vec<_>>(), vec![10, 11]);
    assert!(!wal_path.with_extension("log.tmp").exists());
}

#[test]
fn test_rewrite_split_records_recover() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = WalWriter::open(&wal_path).unwrap();
    for i in 1..=40 {
        writer.append(&WalEntry::new(i, vec![put(i as usize)]), false).unwrap();
    }

    let records = WalEntry::split(40, (1..=40).map(put).collect(), 200).unwrap();
    writer.rewrite(&records).unwrap();
    assert_eq!(writer.growth(), 0);
    writer.append(&WalEntry::new(41, vec![put(41)]), true).unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();
    assert_eq!(entries.len(), records.len() + 1);
    assert_eq!(result.last_lsn, 41);
    let total: usize = entries.iter().map(|e| e.operations.len()).sum();
    assert_eq!(total, 41);
}

#[test]
fn test_failed_rewrite_keeps_appending_to_old_log() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = WalWriter::open(&wal_path).unwrap();
    writer.append(&WalEntry::new(1, vec![put(1)]), true).unwrap();

    // A directory where the temporary log goes
    let tmp_path = wal_path.with_extension("log.tmp");
    fs::create_dir(&tmp_path).unwrap();
    assert!(writer.rewrite(&[WalEntry::new(1, vec![put(1)])]).is_err());
    writer.append(&WalEntry::new(2, vec![put(2)]), true).unwrap();

    let (entries, _) = WalRecovery::recover(&wal_path).unwrap();
    assert_eq!(entries.iter().map(|e| e.lsn).collect::<Vec<_>>(), vec![1, 2]);
    assert!(tmp_path.is_dir());
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[test]
fn test_recover_empty_file() {
    let (_temp, wal_path) = setup_temp_wal();
    File::create(&wal_path).unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert!(entries.is_empty());
    assert_eq!(result.entries_recovered, 0);
    assert_eq!(result.last_lsn, 0);
    assert!(!result.was_truncated);
}

#[test]
fn test_recover_truncates_torn_tail() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries(&wal_path, 3);
    let clean_len = fs::metadata(&wal_path).unwrap().len();

    // Half of a fourth record
    let partial = WalEntry::new(4, vec![put(4)]).serialize().unwrap();
    let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
    file.write_all(&partial[..partial.len() / 2]).unwrap();
    drop(file);

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 3);
    assert!(result.was_truncated);
    assert!(!result.dropped_corrupt);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), clean_len);
}

#[test]
fn test_recover_fails_on_corrupt_record() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries(&wal_path, 3);

    // Damage the payload of the second record
    let mut bytes = fs::read(&wal_path).unwrap();
    let first_len = bytes.len() / 3;
    bytes[first_len + HEADER_SIZE + 2] ^= 0xFF;
    fs::write(&wal_path, &bytes).unwrap();

    let err = WalRecovery::recover(&wal_path).unwrap_err();

    assert!(matches!(err, EngineError::Corruption(_)));
}

#[test]
fn test_repair_keeps_valid_prefix() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries(&wal_path, 3);

    let mut bytes = fs::read(&wal_path).unwrap();
    let first_len = bytes.len() / 3;
    bytes[first_len + HEADER_SIZE + 2] ^= 0xFF;
    fs::write(&wal_path, &bytes).unwrap();

    let result = WalRecovery::repair(&wal_path).unwrap();

    assert_eq!(result.entries_recovered, 1);
    assert_eq!(result.last_lsn, 1);
    assert!(result.dropped_corrupt);
    assert_eq!(fs::metadata(&wal_path).unwrap().len() as usize, first_len);

    let (entries, _) = WalRecovery::recover(&wal_path).unwrap();
    assert_eq!(entries.len(), 1);
}

#[test]
fn test_repair_clean_log_is_untouched() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries(&wal_path, 2);
    let before = fs::read(&wal_path).unwrap();

    let result = WalRecovery::repair(&wal_path).unwrap();

    assert_eq!(result.entries_recovered, 2);
    assert!(!result.was_truncated);
    assert_eq!(fs::read(&wal_path).unwrap(), before);
}
