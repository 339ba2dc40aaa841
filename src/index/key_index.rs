//! Key index implementation
//!
//! HashMap-based index; iteration order is unspecified.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::warn;

use crate::error::{KvError, Result};

use super::{IndexEntry, ENTRY_SIZE, TOMBSTONE};

/// What `load` found in an index file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Complete entries read, duplicates included
    pub entries_read: usize,

    /// Bytes of a partial entry at the end of the file (ignored)
    pub trailing_bytes: usize,
}

/// In-memory `key → offset` map of one record type
#[derive(Debug, Clone, Default)]
pub struct KeyIndex {
    offsets: HashMap<i32, i64>,
}

impl KeyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load an index file from disk
    pub fn load(path: &Path) -> Result<(Self, LoadSummary)> {
        let mut file = File::open(path).map_err(|e| KvError::unavailable(path, e))?;
        let (index, summary) = Self::load_from(&mut file)?;
        if summary.trailing_bytes > 0 {
            warn!(
                path = %path.display(),
                trailing_bytes = summary.trailing_bytes,
                "Ignoring partial entry at end of index file"
            );
        }
        Ok((index, summary))
    }

    /// Rebuild an index from a stream of 12-byte entries
    ///
    /// Later entries for a key replace earlier ones.
    pub fn load_from<R: Read>(reader: &mut R) -> Result<(Self, LoadSummary)> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;

        let mut index = Self::new();
        let mut summary = LoadSummary::default();
        let mut buf = &data[..];

        while let Some(entry) = IndexEntry::read_from(&mut buf) {
            index.apply(entry);
            summary.entries_read += 1;
        }
        summary.trailing_bytes = buf.len();
        debug_assert!(summary.trailing_bytes < ENTRY_SIZE);

        Ok((index, summary))
    }

    /// Apply one entry as read from (or written to) the index file
    pub fn apply(&mut self, entry: IndexEntry) {
        self.put(entry.key, entry.offset);
    }

    pub fn put(&mut self, key: i32, offset: i64) {
        self.offsets.insert(key, offset);
    }

    /// Mark `key` deleted, keeping it known to the index
    pub fn tombstone(&mut self, key: i32) {
        self.put(key, TOMBSTONE);
    }

    /// Raw stored offset, tombstone included; `None` for unknown keys
    pub fn lookup(&self, key: i32) -> Option<i64> {
        self.offsets.get(&key).copied()
    }

    /// Offset of a live record, `None` if the key is unknown or deleted
    pub fn live_offset(&self, key: i32) -> Option<u64> {
        self.lookup(key)
            .filter(|&offset| offset >= 0)
            .map(|offset| offset as u64)
    }

    /// Forget `key` entirely, returning what was stored
    pub fn remove(&mut self, key: i32) -> Option<i64> {
        self.offsets.remove(&key)
    }

    /// Known keys, tombstones included
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn live_count(&self) -> usize {
        self.offsets.values().filter(|&&o| o >= 0).count()
    }

    pub fn tombstone_count(&self) -> usize {
        self.len() - self.live_count()
    }

    /// `(key, offset)` of every live record, in no particular order
    pub fn live_entries(&self) -> impl Iterator<Item = (i32, u64)> + '_ {
        self.offsets
            .iter()
            .filter(|(_, &o)| o >= 0)
            .map(|(&k, &o)| (k, o as u64))
    }

    /// Live keys in ascending order
    pub fn live_keys_sorted(&self) -> Vec<i32> {
        let mut keys: Vec<i32> = self.live_entries().map(|(k, _)| k).collect();
        keys.sort_unstable();
        keys
    }
}
