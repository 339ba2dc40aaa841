//! Storage Module
//!
//! Per-type append-only files and the handles that read and write them.
//!
//! ## Responsibilities
//! - Resolve one descriptor per record type (files, schema, index, readers)
//! - Append records and index entries
//! - Bound concurrent disk reads with a fixed reader pool
//! - Rewrite a type's files to drop garbage (compaction)
//! - Remember which record types the directory holds (`Types.db`)
//!
//! ## Directory Layout
//! ```text
//! {data_dir}/
//!   ├── Types.db          short name → full name pairs
//!   ├── Person.db         encoded Person records, back to back
//!   ├── Person.idx        (key, offset) entries for Person
//!   └── ...
//! ```

mod compaction;
mod descriptor;
mod pool;
mod registry;
mod types;

use std::io;
use std::path::{Path, PathBuf};

use crate::error::{KvError, Result};

pub use compaction::CompactionStats;
pub use descriptor::{write_whole, Truncate, TypeDescriptor};
pub use pool::{Permit, PooledReader, ReadPermits, ReaderPool};
pub use registry::DescriptorRegistry;
pub use types::TypeRegistry;

pub(crate) use compaction::compact;

// =============================================================================
// File Naming
// =============================================================================

/// Stem of the type registry file; not usable as a record type name
pub const TYPES_FILE_STEM: &str = "Types";

/// Extension of record data files (and of the type registry)
pub const DATA_EXTENSION: &str = "db";

/// Extension of key index files
pub const INDEX_EXTENSION: &str = "idx";

/// Suffix of the temporary files written by compaction
pub const COMPACT_SUFFIX: &str = "compact";

/// `{dir}/{type}.db`
pub fn data_file_path(dir: &Path, type_name: &str) -> PathBuf {
    dir.join(format!("{}.{}", type_name, DATA_EXTENSION))
}

/// `{dir}/{type}.idx`
pub fn index_file_path(dir: &Path, type_name: &str) -> PathBuf {
    dir.join(format!("{}.{}", type_name, INDEX_EXTENSION))
}

/// `{dir}/Types.db`
pub fn types_file_path(dir: &Path) -> PathBuf {
    dir.join(format!("{}.{}", TYPES_FILE_STEM, DATA_EXTENSION))
}

/// `{path}.compact`
pub fn compact_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(COMPACT_SUFFIX);
    PathBuf::from(name)
}

/// Length of the file at `path`, or 0 if it does not exist
///
/// Any other failure to stat the file is an error.
pub fn len_if_exists(path: &Path) -> Result<u64> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(KvError::unavailable(path, e)),
    }
}
