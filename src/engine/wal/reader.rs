//! WAL Reader
//!
//! Sequential record reader that tells a clean end, a torn tail and a
//! damaged record apart.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use super::entry::{RecordHeader, HEADER_SIZE, MAX_RECORD_LEN};
use super::WalEntry;
use crate::error::{EngineError, EngineResult};

/// What the reader found at the current position
#[derive(Debug)]
pub enum ReadOutcome {
    /// A complete, checksummed record
    Entry(WalEntry),

    /// End of file exactly on a record boundary
    End,

    /// The file ends partway through a record (a torn write)
    Truncated,

    /// A complete record whose checksum or encoding is wrong
    Corrupt(String),
}

/// Reads records from a WAL file
pub struct WalReader {
    reader: BufReader<File>,

    /// Byte offset just past the last complete record
    position: u64,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> EngineResult<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(file),
            position: 0,
        })
    }

    /// Read the next record
    pub fn next_record(&mut self) -> EngineResult<ReadOutcome> {
        let mut header_buf = [0u8; HEADER_SIZE];
        match self.read_full(&mut header_buf)? {
            0 => return Ok(ReadOutcome::End),
            n if n < HEADER_SIZE => return Ok(ReadOutcome::Truncated),
            _ => {}
        }

        let header = RecordHeader::parse(&header_buf);
        if header.len as usize > MAX_RECORD_LEN {
            return Ok(ReadOutcome::Corrupt(format!(
                "record {} claims {} bytes",
                header.lsn, header.len
            )));
        }

        let mut data = vec![0u8; header.len as usize];
        if self.read_full(&mut data)? < data.len() {
            return Ok(ReadOutcome::Truncated);
        }

        match WalEntry::decode_payload(&header, &data) {
            Ok(entry) => {
                self.position += (HEADER_SIZE + data.len()) as u64;
                Ok(ReadOutcome::Entry(entry))
            }
            Err(EngineError::Corruption(reason)) => Ok(ReadOutcome::Corrupt(reason)),
            Err(e) => Err(e),
        }
    }

    /// Byte offset just past the last complete record read
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Fill `buf` as far as the file allows; returns the bytes read
    fn read_full(&mut self, buf: &mut [u8]) -> EngineResult<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }
}
