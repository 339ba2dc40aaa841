//! Type Descriptor
//!
//! Everything the engine holds open for one record type.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use crate::codec;
use crate::error::{KvError, Result};
use crate::index::{IndexEntry, KeyIndex, ENTRY_SIZE};
use crate::schema::{FieldDef, FieldKind, Value};

use super::pool::{PooledReader, ReaderPool};
use super::{data_file_path, index_file_path};

/// Files, schema, key index and readers of one record type
///
/// ## Concurrency:
/// - Mutating methods take `&mut self`; the engine only reaches them under
///   the exclusive side of its lock
/// - Reads go through `readers`, which works from `&self`
pub struct TypeDescriptor {
    name: String,
    data_path: PathBuf,
    index_path: PathBuf,

    /// Persisted fields only, in on-disk order
    fields: Vec<FieldDef>,
    kinds: Vec<FieldKind>,

    /// Writer handles, opened in append mode
    data_file: File,
    index_file: File,

    index: KeyIndex,
    readers: ReaderPool,

    /// Set once the data file holds unreachable records
    dirty: bool,
    sync_writes: bool,
}

impl TypeDescriptor {
    /// Open or create the files of `name` under `dir` and load its index
    pub fn open(
        dir: &Path,
        name: &str,
        fields: Vec<FieldDef>,
        pool_size: usize,
        sync_writes: bool,
    ) -> Result<Self> {
        let index_path = index_file_path(dir, name);
        let index_file = open_for_append(&index_path)?;
        let (index, summary) = KeyIndex::load(&index_path)?;

        if summary.trailing_bytes > 0 {
            // Appends must stay aligned to whole entries
            let aligned = (summary.entries_read * ENTRY_SIZE) as u64;
            warn!(
                type_name = name,
                aligned_len = aligned,
                "Truncating partial entry from index file"
            );
            index_file.set_len(aligned)?;
        }
        drop(index_file);

        let mut descriptor = Self::with_index(dir, name, fields, pool_size, sync_writes, index)?;
        descriptor.dirty = summary.entries_read > descriptor.index.live_count();

        debug!(
            type_name = name,
            keys = descriptor.index.len(),
            live = descriptor.index.live_count(),
            "Opened type descriptor"
        );
        Ok(descriptor)
    }

    /// Open handles on existing files, installing `index` as-is
    pub fn with_index(
        dir: &Path,
        name: &str,
        fields: Vec<FieldDef>,
        pool_size: usize,
        sync_writes: bool,
        index: KeyIndex,
    ) -> Result<Self> {
        let data_path = data_file_path(dir, name);
        let index_path = index_file_path(dir, name);

        let data_file = open_for_append(&data_path)?;
        let index_file = open_for_append(&index_path)?;
        let readers = ReaderPool::open(&data_path, pool_size)?;
        let kinds = fields.iter().map(|f| f.kind).collect();

        Ok(Self {
            name: name.to_string(),
            data_path,
            index_path,
            fields,
            kinds,
            data_file,
            index_file,
            index,
            readers,
            dirty: false,
            sync_writes,
        })
    }

    // =========================================================================
    // Write Path
    // =========================================================================

    /// Append an encoded record for `key` and point the index at it
    ///
    /// Writing a key that is already live leaves the old copy behind as
    /// garbage. Returns the offset the record was written at. A failed
    /// append cuts both files back to their previous length.
    pub fn append(&mut self, key: i32, record: &[u8]) -> Result<u64> {
        // Append mode: every write lands at the end regardless of position
        let offset = self.data_file.seek(SeekFrom::End(0))?;
        write_whole(&mut self.data_file, offset, record)?;

        let entry = IndexEntry::new(key, offset as i64);
        let index_len = self.index_file.metadata()?.len();
        if let Err(e) = write_whole(&mut self.index_file, index_len, &entry.to_bytes()) {
            roll_back(&mut self.data_file, offset);
            return Err(e);
        }

        if self.sync_writes {
            self.data_file.sync_data()?;
            self.index_file.sync_data()?;
        }

        if self.index.live_offset(key).is_some() {
            self.dirty = true;
        }
        self.index.apply(entry);
        Ok(offset)
    }

    /// Mark `key` deleted; the data file is not touched
    ///
    /// Returns false (and writes nothing) if the key was not live.
    pub fn tombstone(&mut self, key: i32) -> Result<bool> {
        if self.index.live_offset(key).is_none() {
            return Ok(false);
        }

        let index_len = self.index_file.metadata()?.len();
        write_whole(
            &mut self.index_file,
            index_len,
            &IndexEntry::tombstone(key).to_bytes(),
        )?;
        if self.sync_writes {
            self.index_file.sync_data()?;
        }

        self.index.tombstone(key);
        self.dirty = true;
        Ok(true)
    }

    // =========================================================================
    // Read Path
    // =========================================================================

    /// Decode the record at `offset` through a checked-out reader
    pub fn read_record(&self, reader: &mut PooledReader, offset: u64) -> Result<Vec<Value>> {
        reader
            .read_at(offset, |r| codec::decode(&self.kinds, r))
            .map_err(|e| {
                if e.is_truncated() {
                    warn!(type_name = %self.name, offset, error = %e, "Unreadable record");
                }
                e
            })
    }

    /// Persisted values of `key`, `None` if unknown or deleted
    pub fn read_key(&self, key: i32) -> Result<Option<Vec<Value>>> {
        let Some(offset) = self.index.live_offset(key) else {
            return Ok(None);
        };
        let mut reader = self.readers.acquire()?;
        self.read_record(&mut reader, offset).map(Some)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn kinds(&self) -> &[FieldKind] {
        &self.kinds
    }

    /// True if `fields` is the persisted list this descriptor was opened with
    pub fn matches(&self, fields: &[FieldDef]) -> bool {
        self.fields == fields
    }

    pub fn index(&self) -> &KeyIndex {
        &self.index
    }

    pub fn readers(&self) -> &ReaderPool {
        &self.readers
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Current size of the data file in bytes
    pub fn data_len(&self) -> Result<u64> {
        Ok(self.data_file.metadata()?.len())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Flag the type for the next `compact_dirty`
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn sync_writes(&self) -> bool {
        self.sync_writes
    }

    pub fn pool_size(&self) -> usize {
        self.readers.capacity()
    }

    /// Flush both files to disk
    pub fn sync(&mut self) -> Result<()> {
        self.data_file.sync_all()?;
        self.index_file.sync_all()?;
        Ok(())
    }
}

/// A file that can be cut back to an earlier length
pub trait Truncate: Write {
    fn truncate_to(&mut self, len: u64) -> std::io::Result<()>;
}

impl Truncate for File {
    fn truncate_to(&mut self, len: u64) -> std::io::Result<()> {
        self.set_len(len)
    }
}

/// Write all of `bytes` at the end of `file`, which is `start` bytes long
///
/// On failure the file is cut back to `start`, so a torn write never leaves
/// the next append misaligned.
pub fn write_whole<F: Truncate>(file: &mut F, start: u64, bytes: &[u8]) -> Result<()> {
    if let Err(e) = file.write_all(bytes) {
        roll_back(file, start);
        return Err(e.into());
    }
    Ok(())
}

fn roll_back<F: Truncate>(file: &mut F, len: u64) {
    if let Err(e) = file.truncate_to(len) {
        error!(len, error = %e, "Failed to roll back partial append");
    }
}

/// Read/append handle; created if missing
fn open_for_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)
        .map_err(|e| KvError::unavailable(path, e))
}
