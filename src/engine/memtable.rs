//! MemTable
//!
//! In-memory, multi-version ordered table backing [`LogEngine`](super::LogEngine).
//!
//! ## Data Structure Choice
//! `BTreeMap<(key, Reverse(sequence)), MemTableEntry>` wrapped in a RwLock:
//! - Ordered user keys (cursors walk the map directly)
//! - Versions of one key sit next to each other, newest first
//! - A read at sequence `s` resolves to the first version with `seq <= s`

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::ops::Bound::{self, Excluded, Included, Unbounded};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use bytes::Bytes;
use parking_lot::RwLock;

use super::BatchOp;

/// Per-version bookkeeping overhead used in size accounting
const VERSION_OVERHEAD: usize = 8;

/// Entry stored in the MemTable
#[derive(Debug, Clone, PartialEq)]
pub enum MemTableEntry {
    /// A live value
    Value(Bytes),

    /// A tombstone (deleted key)
    Tombstone,
}

type VersionKey = (Bytes, Reverse<u64>);

/// Multi-version in-memory table
pub struct MemTable {
    data: RwLock<BTreeMap<VersionKey, MemTableEntry>>,

    /// Sequence of the last applied write
    last_sequence: AtomicU64,

    /// Approximate size of all versions in bytes
    size: AtomicUsize,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            last_sequence: AtomicU64::new(0),
            size: AtomicUsize::new(0),
        }
    }

    /// Apply a batch under one sequence number
    ///
    /// All ops become visible together once `last_sequence` moves. Within the
    /// batch a later op on the same key replaces an earlier one.
    pub fn apply(&self, sequence: u64, ops: &[BatchOp]) {
        let mut data = self.data.write();
        let mut added = 0usize;
        let mut removed = 0usize;

        for op in ops {
            let (key, entry) = match op {
                BatchOp::Put { key, value } => (key.clone(), MemTableEntry::Value(value.clone())),
                BatchOp::Delete { key } => (key.clone(), MemTableEntry::Tombstone),
            };
            added += version_size(&key, &entry);
            if let Some(old) = data.insert((key.clone(), Reverse(sequence)), entry) {
                removed += version_size(&key, &old);
            }
        }

        self.size.fetch_add(added, Ordering::Relaxed);
        self.size.fetch_sub(removed, Ordering::Relaxed);
        self.last_sequence.fetch_max(sequence, Ordering::AcqRel);
    }

    /// Sequence of the last applied write
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence.load(Ordering::Acquire)
    }

    /// Raise the sequence counter without writing (used after recovery)
    pub fn advance_sequence(&self, sequence: u64) {
        self.last_sequence.fetch_max(sequence, Ordering::AcqRel);
    }

    /// Newest version of `key` visible at `sequence`
    pub fn get(&self, key: &[u8], sequence: u64) -> Option<MemTableEntry> {
        let data = self.data.read();
        let start = (Bytes::copy_from_slice(key), Reverse(sequence));

        data.range((Included(start), Unbounded))
            .next()
            .filter(|((k, _), _)| k.as_ref() == key)
            .map(|(_, entry)| entry.clone())
    }

    /// First live entry at or after `from` (per bound) visible at `sequence`
    pub fn first_visible(&self, from: Bound<&[u8]>, sequence: u64) -> Option<(Bytes, Bytes)> {
        let lower = match from {
            Unbounded => Unbounded,
            Included(k) => Included((Bytes::copy_from_slice(k), Reverse(u64::MAX))),
            Excluded(k) => Excluded((Bytes::copy_from_slice(k), Reverse(0))),
        };

        let data = self.data.read();
        let mut decided: Option<&Bytes> = None;

        for ((key, Reverse(seq)), entry) in data.range((lower, Unbounded)) {
            if decided == Some(key) || *seq > sequence {
                continue;
            }
            match entry {
                MemTableEntry::Value(value) => return Some((key.clone(), value.clone())),
                MemTableEntry::Tombstone => decided = Some(key),
            }
        }

        None
    }

    /// Last live entry at or before `to` (per bound) visible at `sequence`
    pub fn last_visible(&self, to: Bound<&[u8]>, sequence: u64) -> Option<(Bytes, Bytes)> {
        let upper = match to {
            Unbounded => Unbounded,
            Included(k) => Included((Bytes::copy_from_slice(k), Reverse(0))),
            Excluded(k) => Excluded((Bytes::copy_from_slice(k), Reverse(u64::MAX))),
        };

        let data = self.data.read();
        let mut current: Option<&Bytes> = None;
        let mut visible: Option<&MemTableEntry> = None;

        // Walking backwards, versions of one key arrive oldest first
        for ((key, Reverse(seq)), entry) in data.range((Unbounded, upper)).rev() {
            if current != Some(key) {
                if let (Some(k), Some(MemTableEntry::Value(v))) = (current, visible) {
                    return Some((k.clone(), v.clone()));
                }
                current = Some(key);
                visible = None;
            }
            if *seq <= sequence {
                visible = Some(entry);
            }
        }

        match (current, visible) {
            (Some(k), Some(MemTableEntry::Value(v))) => Some((k.clone(), v.clone())),
            _ => None,
        }
    }

    /// Every live entry visible at `sequence`, in key order
    pub fn live_entries(&self, sequence: u64) -> Vec<(Bytes, Bytes)> {
        let mut out = Vec::new();
        self.visit_live(Unbounded, Unbounded, sequence, |k, v| {
            out.push((k.clone(), v.clone()));
        });
        out
    }

    /// Sum of key and value bytes of live entries in `[start, end)`
    pub fn live_size(&self, start: &[u8], end: &[u8], sequence: u64) -> u64 {
        if start >= end {
            return 0;
        }

        let lower = Included((Bytes::copy_from_slice(start), Reverse(u64::MAX)));
        let upper = Excluded((Bytes::copy_from_slice(end), Reverse(u64::MAX)));
        let mut total = 0u64;
        self.visit_live(lower, upper, sequence, |k, v| {
            total += (k.len() + v.len()) as u64;
        });
        total
    }

    /// Drop versions in `[start, end]` that no reader at or above `oldest`
    /// can observe. Returns the number of versions removed.
    pub fn prune(&self, start: Option<&[u8]>, end: Option<&[u8]>, oldest: u64) -> usize {
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return 0;
            }
        }

        let lower = start.map_or(Unbounded, |k| {
            Included((Bytes::copy_from_slice(k), Reverse(u64::MAX)))
        });
        let upper = end.map_or(Unbounded, |k| Included((Bytes::copy_from_slice(k), Reverse(0))));

        let mut data = self.data.write();
        let mut doomed = Vec::new();
        {
            let mut current: Option<&Bytes> = None;
            let mut settled = false;

            for (version, entry) in data.range((lower, upper)) {
                let (key, Reverse(seq)) = version;
                if current != Some(key) {
                    current = Some(key);
                    settled = false;
                }
                if *seq > oldest {
                    continue;
                }
                // The newest version at or below `oldest` stays unless it is a
                // tombstone with nothing left beneath it
                if settled || *entry == MemTableEntry::Tombstone {
                    doomed.push(version.clone());
                }
                settled = true;
            }
        }

        let mut freed = 0usize;
        for version in &doomed {
            if let Some(entry) = data.remove(version) {
                freed += version_size(&version.0, &entry);
            }
        }
        self.size.fetch_sub(freed, Ordering::Relaxed);

        doomed.len()
    }

    /// Number of stored versions (including tombstones)
    pub fn version_count(&self) -> usize {
        self.data.read().len()
    }

    /// Approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Check if the table holds no versions
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    fn visit_live<F>(
        &self,
        lower: Bound<VersionKey>,
        upper: Bound<VersionKey>,
        sequence: u64,
        mut visit: F,
    ) where
        F: FnMut(&Bytes, &Bytes),
    {
        let data = self.data.read();
        let mut decided: Option<&Bytes> = None;

        for ((key, Reverse(seq)), entry) in data.range((lower, upper)) {
            if decided == Some(key) || *seq > sequence {
                continue;
            }
            decided = Some(key);
            if let MemTableEntry::Value(value) = entry {
                visit(key, value);
            }
        }
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

fn version_size(key: &Bytes, entry: &MemTableEntry) -> usize {
    let value_len = match entry {
        MemTableEntry::Value(v) => v.len(),
        MemTableEntry::Tombstone => 0,
    };
    key.len() + value_len + VERSION_OVERHEAD
}
