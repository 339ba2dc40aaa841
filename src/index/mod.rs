//! Key Index Module
//!
//! In-memory `key → offset` map of one record type, backed by an append-only
//! index file.
//!
//! ## Responsibilities
//! - Rebuild the map from the index file at open (last entry wins)
//! - Track every write and delete
//! - Enumerate live offsets for scans and compaction
//!
//! ## File Format
//! ```text
//! ┌──────────────┬──────────────────┐
//! │ Key (i32, 4) │ Offset (i64, 8)  │   entry 1
//! ├──────────────┼──────────────────┤
//! │ Key (i32, 4) │ Offset (i64, 8)  │   entry 2
//! └──────────────┴──────────────────┘
//! ... big-endian, 12 bytes per entry, no header, no padding
//! (Offset = -1 marks a deleted key)
//! ```

mod key_index;

pub use key_index::{KeyIndex, LoadSummary};

use bytes::{Buf, BufMut};

/// Offset marking a key as deleted
pub const TOMBSTONE: i64 = -1;

/// Size of one serialized entry: Key (4) + Offset (8)
pub const ENTRY_SIZE: usize = 12;

/// One `(key, offset)` pair as stored in the index file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub key: i32,
    pub offset: i64,
}

impl IndexEntry {
    pub fn new(key: i32, offset: i64) -> Self {
        Self { key, offset }
    }

    pub fn tombstone(key: i32) -> Self {
        Self::new(key, TOMBSTONE)
    }

    /// Any negative offset is treated as a deletion
    pub fn is_tombstone(&self) -> bool {
        self.offset < 0
    }

    pub fn to_bytes(&self) -> [u8; ENTRY_SIZE] {
        let mut bytes = [0u8; ENTRY_SIZE];
        let mut buf = &mut bytes[..];
        buf.put_i32(self.key);
        buf.put_i64(self.offset);
        bytes
    }

    /// Read one entry from the front of `buf`; `None` if fewer than
    /// `ENTRY_SIZE` bytes remain
    pub fn read_from<B: Buf>(buf: &mut B) -> Option<Self> {
        if buf.remaining() < ENTRY_SIZE {
            return None;
        }
        let key = buf.get_i32();
        let offset = buf.get_i64();
        Some(Self { key, offset })
    }
}
