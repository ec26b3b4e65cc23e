//! WAL Entry definitions
//!
//! One record per applied batch. A checkpoint is a single record holding
//! every live key as a put.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::engine::BatchOp;
use crate::error::{EngineError, EngineResult};

/// Size of the fixed record header: LSN (8) + CRC (4) + LEN (4)
pub const HEADER_SIZE: usize = 16;

/// Upper bound on a single record payload, enforced by writer and reader
pub const MAX_RECORD_LEN: usize = 256 * 1024 * 1024;

/// bincode overhead of a record around its operations: lsn, vec length, timestamp
const ENTRY_OVERHEAD: u64 = 24;

/// A single record in the WAL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Log Sequence Number, also the sequence the batch was applied at
    pub lsn: u64,

    /// The operations of the batch, in order
    pub operations: Vec<Operation>,

    /// Timestamp (unix millis) when the record was created
    pub timestamp: u64,
}

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Put a key-value pair
    Put { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key
    Delete { key: Vec<u8> },
}

impl From<&BatchOp> for Operation {
    fn from(op: &BatchOp) -> Self {
        match op {
            BatchOp::Put { key, value } => Operation::Put {
                key: key.to_vec(),
                value: value.to_vec(),
            },
            BatchOp::Delete { key } => Operation::Delete { key: key.to_vec() },
        }
    }
}

impl From<Operation> for BatchOp {
    fn from(op: Operation) -> Self {
        match op {
            Operation::Put { key, value } => BatchOp::Put {
                key: Bytes::from(key),
                value: Bytes::from(value),
            },
            Operation::Delete { key } => BatchOp::Delete { key: Bytes::from(key) },
        }
    }
}

impl WalEntry {
    pub fn new(lsn: u64, operations: Vec<Operation>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            lsn,
            operations,
            timestamp,
        }
    }

    /// Split `operations` into records sharing `lsn`, each with a payload
    /// of at most `max_len` bytes
    ///
    /// Replaying the records in order applies the operations in order. A
    /// single operation larger than `max_len` still gets its own record,
    /// which [`serialize_within`](Self::serialize_within) then rejects.
    pub fn split(lsn: u64, operations: Vec<Operation>, max_len: usize) -> EngineResult<Vec<Self>> {
        let mut records = Vec::new();
        let mut current = Vec::new();
        let mut current_len = ENTRY_OVERHEAD;

        for op in operations {
            let op_len = bincode::serialized_size(&op)?;
            if !current.is_empty() && current_len + op_len > max_len as u64 {
                records.push(Self::new(lsn, std::mem::take(&mut current)));
                current_len = ENTRY_OVERHEAD;
            }
            current_len += op_len;
            current.push(op);
        }

        if !current.is_empty() || records.is_empty() {
            records.push(Self::new(lsn, current));
        }
        Ok(records)
    }

    /// Encode as a framed record (header + payload)
    pub fn serialize(&self) -> EngineResult<Vec<u8>> {
        self.serialize_within(MAX_RECORD_LEN)
    }

    /// Encode as a framed record whose payload is at most `max_len` bytes
    pub fn serialize_within(&self, max_len: usize) -> EngineResult<Vec<u8>> {
        let data = bincode::serialize(self)?;
        if data.len() > max_len {
            return Err(EngineError::InvalidArgument(format!(
                "record {} is {} bytes, limit is {}",
                self.lsn,
                data.len(),
                max_len
            )));
        }
        let len = u32::try_from(data.len())
            .map_err(|_| EngineError::InvalidArgument("record too large".into()))?;

        let mut buf = Vec::with_capacity(HEADER_SIZE + data.len());
        buf.extend_from_slice(&self.lsn.to_le_bytes());
        buf.extend_from_slice(&crc32fast::hash(&data).to_le_bytes());
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(&data);
        Ok(buf)
    }

    /// Decode one complete framed record
    pub fn deserialize(bytes: &[u8]) -> EngineResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(EngineError::Corruption("truncated record header".into()));
        }

        let header = RecordHeader::parse(&bytes[..HEADER_SIZE]);
        let data = &bytes[HEADER_SIZE..];
        if data.len() != header.len as usize {
            return Err(EngineError::Corruption(format!(
                "record length mismatch: header says {}, found {}",
                header.len,
                data.len()
            )));
        }

        Self::decode_payload(&header, data)
    }

    pub(crate) fn decode_payload(header: &RecordHeader, data: &[u8]) -> EngineResult<Self> {
        let actual = crc32fast::hash(data);
        if actual != header.crc {
            return Err(EngineError::Corruption(format!(
                "checksum mismatch in record {}: expected {:08x}, got {:08x}",
                header.lsn, header.crc, actual
            )));
        }

        let entry: WalEntry = bincode::deserialize(data)?;
        if entry.lsn != header.lsn {
            return Err(EngineError::Corruption(format!(
                "record lsn mismatch: header {}, payload {}",
                header.lsn, entry.lsn
            )));
        }
        Ok(entry)
    }
}

/// Parsed fixed-size record header
#[derive(Debug, Clone, Copy)]
pub(crate) struct RecordHeader {
    pub lsn: u64,
    pub crc: u32,
    pub len: u32,
}

impl RecordHeader {
    pub fn parse(buf: &[u8]) -> Self {
        let mut lsn = [0u8; 8];
        let mut crc = [0u8; 4];
        let mut len = [0u8; 4];
        lsn.copy_from_slice(&buf[0..8]);
        crc.copy_from_slice(&buf[8..12]);
        len.copy_from_slice(&buf[12..16]);

        Self {
            lsn: u64::from_le_bytes(lsn),
            crc: u32::from_le_bytes(crc),
            len: u32::from_le_bytes(len),
        }
    }
}
