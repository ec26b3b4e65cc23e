//! WAL Recovery
//!
//! Replays the log on open and repairs damaged logs.
//!
//! - A torn tail (file ends inside a record) is the signature of a crash
//!   mid-append: the partial record is cut off and the open proceeds.
//! - A complete record with a bad checksum is corruption: the open fails
//!   and only [`WalRecovery::repair`] will discard it.

use std::fs::OpenOptions;
use std::path::Path;

use super::{ReadOutcome, WalEntry, WalReader};
use crate::error::{EngineError, EngineResult};

/// Replays and repairs WAL files
pub struct WalRecovery;

/// Result of a recovery or repair pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of records successfully recovered
    pub entries_recovered: u64,

    /// Last valid LSN
    pub last_lsn: u64,

    /// Whether bytes after the last valid record were cut off
    pub was_truncated: bool,

    /// Whether a damaged record (and everything after it) was dropped
    pub dropped_corrupt: bool,
}

impl WalRecovery {
    /// Recover records from a WAL file
    ///
    /// Returns every valid record in order. A torn tail is truncated; a
    /// damaged record is reported as `Corruption`.
    pub fn recover(path: &Path) -> EngineResult<(Vec<WalEntry>, RecoveryResult)> {
        let (entries, valid_bytes, stop) = Self::scan(path)?;
        let mut result = Self::summarize(&entries);

        match stop {
            ReadOutcome::Corrupt(reason) => {
                return Err(EngineError::Corruption(format!("{}: {}", path.display(), reason)));
            }
            ReadOutcome::Truncated => {
                tracing::warn!(
                    "WAL {}: torn record after lsn {}, truncating to {} bytes",
                    path.display(),
                    result.last_lsn,
                    valid_bytes
                );
                Self::truncate(path, valid_bytes)?;
                result.was_truncated = true;
            }
            _ => {}
        }

        Ok((entries, result))
    }

    /// Keep the valid prefix of a WAL file, dropping the first damaged or
    /// torn record and everything after it
    pub fn repair(path: &Path) -> EngineResult<RecoveryResult> {
        let (entries, valid_bytes, stop) = Self::scan(path)?;
        let mut result = Self::summarize(&entries);

        match stop {
            ReadOutcome::Corrupt(reason) => {
                tracing::warn!("WAL {}: dropping damaged tail ({})", path.display(), reason);
                Self::truncate(path, valid_bytes)?;
                result.was_truncated = true;
                result.dropped_corrupt = true;
            }
            ReadOutcome::Truncated => {
                Self::truncate(path, valid_bytes)?;
                result.was_truncated = true;
            }
            _ => {}
        }

        Ok(result)
    }

    /// Read records until the first non-record outcome
    fn scan(path: &Path) -> EngineResult<(Vec<WalEntry>, u64, ReadOutcome)> {
        let mut reader = WalReader::open(path)?;
        let mut entries = Vec::new();

        loop {
            match reader.next_record()? {
                ReadOutcome::Entry(entry) => entries.push(entry),
                stop => return Ok((entries, reader.position(), stop)),
            }
        }
    }

    fn summarize(entries: &[WalEntry]) -> RecoveryResult {
        RecoveryResult {
            entries_recovered: entries.len() as u64,
            last_lsn: entries.last().map_or(0, |e| e.lsn),
            ..Default::default()
        }
    }

    fn truncate(path: &Path, len: u64) -> EngineResult<()> {
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(len)?;
        file.sync_all()?;
        Ok(())
    }
}
