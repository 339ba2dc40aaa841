//! Compaction
//!
//! Rewrites a type's data and index files with only its live records.
//!
//! ## States
//! ```text
//! idle ──► exclusive-rewrite ──► swap ──► idle
//!            │                     │
//!            │ write *.compact     │ close handles
//!            │ build new index     │ rename *.compact over originals
//!            │ fsync               │ reopen, install new index
//! ```
//!
//! The caller holds the engine's exclusive lock for the whole sequence.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::{error, info};

use crate::codec;
use crate::error::{KvError, Result};
use crate::index::{IndexEntry, KeyIndex};

use super::compact_path;
use super::descriptor::TypeDescriptor;
use super::registry::DescriptorRegistry;

/// Outcome of compacting one type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionStats {
    pub type_name: String,
    /// Records carried over
    pub live_records: usize,
    /// Keys dropped from the index (tombstones)
    pub dropped_entries: usize,
    pub data_bytes_before: u64,
    pub data_bytes_after: u64,
}

/// Compact the resolved type `name`
pub(crate) fn compact(registry: &mut DescriptorRegistry, name: &str) -> Result<CompactionStats> {
    registry.ensure_usable(name)?;
    let descriptor = registry
        .get(name)
        .ok_or_else(|| KvError::InvalidTypeName(name.to_string()))?;

    let data_tmp = compact_path(descriptor.data_path());
    let index_tmp = compact_path(descriptor.index_path());
    let data_bytes_before = descriptor.data_len()?;
    let dropped_entries = descriptor.index().tombstone_count();

    // -------------------------------------------------------------------------
    // Exclusive rewrite
    // -------------------------------------------------------------------------
    let new_index = match rewrite(descriptor, &data_tmp, &index_tmp) {
        Ok(index) => index,
        Err(e) => {
            remove_temporaries(&data_tmp, &index_tmp);
            return Err(e);
        }
    };
    let live_records = new_index.len();

    // -------------------------------------------------------------------------
    // Swap
    // -------------------------------------------------------------------------
    let Some(old) = registry.detach(name) else {
        remove_temporaries(&data_tmp, &index_tmp);
        return Err(KvError::InvalidTypeName(name.to_string()));
    };
    let dir = registry.dir().to_path_buf();
    let fields = old.fields().to_vec();
    let pool_size = old.pool_size();
    let sync_writes = old.sync_writes();
    let data_path = old.data_path().to_path_buf();
    let index_path = old.index_path().to_path_buf();

    // Close the writers and every pooled reader before touching the files
    drop(old);

    if let Err(e) = fs::rename(&data_tmp, &data_path) {
        // Originals untouched: reopen them and report the failure
        remove_temporaries(&data_tmp, &index_tmp);
        let reopened = TypeDescriptor::open(&dir, name, fields, pool_size, sync_writes)?;
        registry.attach(reopened);
        return Err(KvError::Io(e));
    }

    if let Err(e) = fs::rename(&index_tmp, &index_path) {
        let detail = format!(
            "data file replaced but index rename failed: {}; {} and {} disagree",
            e,
            data_path.display(),
            index_path.display()
        );
        registry.mark_corrupted(name, &detail);
        return Err(KvError::CompactionCorruption {
            type_name: name.to_string(),
            detail,
        });
    }

    let descriptor =
        TypeDescriptor::with_index(&dir, name, fields, pool_size, sync_writes, new_index)?;
    let data_bytes_after = descriptor.data_len()?;
    registry.attach(descriptor);

    let stats = CompactionStats {
        type_name: name.to_string(),
        live_records,
        dropped_entries,
        data_bytes_before,
        data_bytes_after,
    };
    info!(
        type_name = name,
        live_records,
        dropped_entries,
        data_bytes_before,
        data_bytes_after,
        "Compaction complete"
    );
    Ok(stats)
}

/// Copy every live record into fresh temporary files
fn rewrite(descriptor: &TypeDescriptor, data_tmp: &Path, index_tmp: &Path) -> Result<KeyIndex> {
    let mut data_out = BufWriter::new(create_temporary(data_tmp)?);
    let mut index_out = BufWriter::new(create_temporary(index_tmp)?);
    let mut reader = descriptor.readers().acquire()?;

    let mut new_index = KeyIndex::new();
    let mut offset: u64 = 0;

    for key in descriptor.index().live_keys_sorted() {
        let Some(old_offset) = descriptor.index().live_offset(key) else {
            continue;
        };
        let values = descriptor.read_record(&mut reader, old_offset)?;
        let record = codec::encode(descriptor.kinds(), &values)?;

        data_out.write_all(&record)?;
        let entry = IndexEntry::new(key, offset as i64);
        index_out.write_all(&entry.to_bytes())?;
        new_index.apply(entry);

        offset += record.len() as u64;
    }

    finish(data_out)?;
    finish(index_out)?;
    Ok(new_index)
}

fn create_temporary(path: &Path) -> Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|e| KvError::unavailable(path, e))
}

fn finish(writer: BufWriter<File>) -> Result<()> {
    let file = writer
        .into_inner()
        .map_err(|e| KvError::Io(e.into_error()))?;
    file.sync_all()?;
    Ok(())
}

fn remove_temporaries(data_tmp: &Path, index_tmp: &Path) {
    for path in [data_tmp, index_tmp] {
        if let Err(e) = fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                error!(path = %path.display(), error = %e, "Failed to remove compaction file");
            }
        }
    }
}
