//! Range Cursor
//!
//! Bounded, directional view over an engine cursor. This is the part of an
//! iterator that travels to the worker threads, so it is `Send` and owns
//! everything it touches.
//!
//! ## Bounds
//! `lte` takes precedence over `lt` and `gte` over `gt`. A key failing
//! either side is out of range.
//!
//! ## Snapshot
//! Without an explicit snapshot the cursor pins an implicit one when it is
//! created and releases it on [`close`](RangeCursor::close) (or drop).

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use crate::config::RangeOptions;
use crate::engine::{EngineCursor, EngineReadOptions, SnapshotToken, StorageEngine};
use crate::error::EngineResult;

/// One iterator result; `None` fields were projected away
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
}

/// Immutable range predicates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyBounds {
    pub lt: Option<Bytes>,
    pub lte: Option<Bytes>,
    pub gt: Option<Bytes>,
    pub gte: Option<Bytes>,
}

impl KeyBounds {
    pub fn from_options(options: &RangeOptions) -> Self {
        Self {
            lt: options.lt.clone(),
            lte: options.lte.clone(),
            gt: options.gt.clone(),
            gte: options.gte.clone(),
        }
    }

    pub fn out_of_range(&self, key: &[u8]) -> bool {
        if let Some(lte) = &self.lte {
            if key > lte.as_ref() {
                return true;
            }
        } else if let Some(lt) = &self.lt {
            if key >= lt.as_ref() {
                return true;
            }
        }

        if let Some(gte) = &self.gte {
            if key < gte.as_ref() {
                return true;
            }
        } else if let Some(gt) = &self.gt {
            if key <= gt.as_ref() {
                return true;
            }
        }

        false
    }
}

/// Bounded cursor with limit, projection and batching state
pub(crate) struct RangeCursor {
    engine: Arc<dyn StorageEngine>,
    cursor: Box<dyn EngineCursor>,
    bounds: KeyBounds,
    reverse: bool,

    /// Remaining-limit bookkeeping (`None` = unlimited)
    limit: Option<usize>,
    count: usize,

    keys: bool,
    values: bool,
    high_water_mark: usize,

    implicit_snapshot: Option<SnapshotToken>,
    did_seek: bool,
    first: bool,
    ended: bool,
    closed: bool,

    aborted: Arc<AtomicBool>,
}

impl RangeCursor {
    /// Build a cursor reading at `snapshot`, or at an implicit snapshot
    /// taken now
    pub fn new(
        engine: Arc<dyn StorageEngine>,
        options: &RangeOptions,
        snapshot: Option<SnapshotToken>,
        aborted: Arc<AtomicBool>,
    ) -> Self {
        let implicit_snapshot = match snapshot {
            Some(_) => None,
            None => Some(engine.new_snapshot()),
        };
        let read_options = EngineReadOptions {
            fill_cache: options.fill_cache,
            snapshot: snapshot.or(implicit_snapshot),
        };
        let cursor = engine.new_cursor(&read_options);

        Self {
            engine,
            cursor,
            bounds: KeyBounds::from_options(options),
            reverse: options.reverse,
            limit: options.limit,
            count: 0,
            keys: options.keys,
            values: options.values,
            high_water_mark: options.high_water_mark_bytes,
            implicit_snapshot,
            did_seek: false,
            first: true,
            ended: false,
            closed: false,
            aborted,
        }
    }

    pub fn did_seek(&self) -> bool {
        self.did_seek
    }

    pub fn ended(&self) -> bool {
        self.ended
    }

    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    // =========================================================================
    // Positioning
    // =========================================================================

    /// Position on the first key of the range in iteration order
    pub fn seek_to_range(&mut self) {
        self.did_seek = true;
        let cursor = &mut self.cursor;

        if !self.reverse {
            if let Some(gte) = &self.bounds.gte {
                cursor.seek(gte);
            } else if let Some(gt) = &self.bounds.gt {
                cursor.seek(gt);
                if cursor.valid() && cursor.key() == *gt {
                    cursor.next();
                }
            } else {
                cursor.seek_to_first();
            }
        } else if let Some(lte) = &self.bounds.lte {
            cursor.seek(lte);
            if !cursor.valid() {
                cursor.seek_to_last();
            } else if cursor.key().as_ref() > lte.as_ref() {
                cursor.prev();
            }
        } else if let Some(lt) = &self.bounds.lt {
            cursor.seek(lt);
            if !cursor.valid() {
                cursor.seek_to_last();
            } else if cursor.key().as_ref() >= lt.as_ref() {
                cursor.prev();
            }
        } else {
            cursor.seek_to_last();
        }
    }

    /// Reposition at-or-after `target` (at-or-before when reversed)
    ///
    /// A target outside the bounds parks the cursor past the end so the
    /// next read reports exhaustion.
    pub fn seek(&mut self, target: &[u8]) {
        self.did_seek = true;
        self.first = true;
        self.ended = false;

        if self.bounds.out_of_range(target) {
            self.seek_to_end();
            return;
        }

        self.cursor.seek(target);

        if self.cursor.valid() {
            if self.behind(target) {
                self.advance();
            }
        } else {
            self.seek_to_first();
            if self.cursor.valid() && self.behind(target) {
                self.seek_to_end();
            }
        }
    }

    /// Whether the current key lies before `target` in iteration order
    fn behind(&self, target: &[u8]) -> bool {
        let cmp = self.cursor.key().as_ref().cmp(target);
        if self.reverse {
            cmp == CmpOrdering::Greater
        } else {
            cmp == CmpOrdering::Less
        }
    }

    /// Step once in iteration order
    pub fn advance(&mut self) {
        if self.reverse {
            self.cursor.prev();
        } else {
            self.cursor.next();
        }
    }

    fn seek_to_first(&mut self) {
        if self.reverse {
            self.cursor.seek_to_last();
        } else {
            self.cursor.seek_to_first();
        }
    }

    fn seek_to_last(&mut self) {
        if self.reverse {
            self.cursor.seek_to_first();
        } else {
            self.cursor.seek_to_last();
        }
    }

    fn seek_to_end(&mut self) {
        self.seek_to_last();
        self.advance();
    }

    // =========================================================================
    // Reading
    // =========================================================================

    /// On a key that is inside the bounds
    pub fn valid(&self) -> bool {
        self.cursor.valid() && !self.bounds.out_of_range(&self.cursor.key())
    }

    /// Count one more visited entry against the limit
    pub fn increment(&mut self) -> bool {
        match self.limit {
            None => true,
            Some(limit) => {
                self.count += 1;
                self.count <= limit
            }
        }
    }

    pub fn key(&self) -> Bytes {
        self.cursor.key()
    }

    pub fn status(&self) -> EngineResult<()> {
        self.cursor.status()
    }

    /// Collect up to `max` entries
    ///
    /// Stops early once more than the high-water-mark worth of bytes was
    /// collected or the abort flag is raised. The flag is `true` while more
    /// entries may follow; on `false` the range is exhausted and `ended()`
    /// is set.
    pub fn read_many(&mut self, max: usize) -> (Vec<Entry>, bool) {
        let mut entries = Vec::with_capacity(max.min(1024));
        let mut bytes_read = 0usize;

        while !self.aborted.load(Ordering::Acquire) {
            if self.first {
                self.first = false;
            } else {
                self.advance();
            }

            if !self.valid() || !self.increment() {
                break;
            }

            let key = self.keys.then(|| self.cursor.key());
            let value = self.values.then(|| self.cursor.value());
            bytes_read += key.as_ref().map_or(0, Bytes::len);
            bytes_read += value.as_ref().map_or(0, Bytes::len);
            entries.push(Entry { key, value });

            if bytes_read > self.high_water_mark || entries.len() >= max {
                return (entries, true);
            }
        }

        self.ended = true;
        (entries, false)
    }

    /// Release the implicit snapshot; later calls do nothing
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(token) = self.implicit_snapshot.take() {
            self.engine.release_snapshot(token);
        }
    }
}

impl Drop for RangeCursor {
    fn drop(&mut self) {
        self.close();
    }
}
