//! WAL Writer
//!
//! Appends records to the WAL file and rewrites it on checkpoint.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::WalEntry;
use crate::error::EngineResult;

/// Writes records to the WAL file
pub struct WalWriter {
    path: PathBuf,
    file: BufWriter<File>,

    /// Current file length in bytes
    len: u64,

    /// File length right after the last rewrite (or at open)
    base_len: u64,
}

impl WalWriter {
    /// Open or create a WAL file, appending after existing records
    pub fn open(path: &Path) -> EngineResult<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file: BufWriter::new(file),
            len,
            base_len: len,
        })
    }

    /// Append a record; with `sync` the data is on disk before returning
    pub fn append(&mut self, entry: &WalEntry, sync: bool) -> EngineResult<()> {
        let bytes = entry.serialize()?;
        self.file.write_all(&bytes)?;
        self.file.flush()?;
        if sync {
            self.file.get_ref().sync_data()?;
        }
        self.len += bytes.len() as u64;
        Ok(())
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> EngineResult<()> {
        self.file.flush()?;
        self.file.get_ref().sync_all()?;
        Ok(())
    }

    /// Replace the whole log with `entries`
    ///
    /// The new log is written beside the old one and renamed over it, so a
    /// crash leaves either the old or the new log intact. Appends continue
    /// on the handle the new log was written through; on any failure the
    /// writer keeps appending to the old log.
    pub fn rewrite(&mut self, entries: &[WalEntry]) -> EngineResult<()> {
        let tmp_path = self.path.with_extension("log.tmp");

        let mut bytes = Vec::new();
        for entry in entries {
            bytes.extend_from_slice(&entry.serialize()?);
        }

        let mut tmp = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        let written = tmp
            .write_all(&bytes)
            .and_then(|_| tmp.sync_all())
            .and_then(|_| self.file.flush())
            .and_then(|_| fs::rename(&tmp_path, &self.path));

        if let Err(e) = written {
            drop(tmp);
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        self.file = BufWriter::new(tmp);
        self.len = bytes.len() as u64;
        self.base_len = self.len;
        Ok(())
    }

    /// Current log size in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes appended since the last rewrite (or since open)
    pub fn growth(&self) -> u64 {
        self.len - self.base_len
    }
}
