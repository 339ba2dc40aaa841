//! Type Registry
//!
//! Append-only `Types.db` file mapping a record type's short name to its
//! fully qualified name.
//!
//! ## Entry Format (big-endian)
//! ```text
//! ┌──────────────┬────────────┬──────────────────┬────────────────┐
//! │ NameLen (4)  │ Name       │ FullNameLen (4)  │ FullName       │
//! └──────────────┴────────────┴──────────────────┴────────────────┘
//! ```

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut, BytesMut};
use tracing::{debug, warn};

use crate::error::{KvError, Result};

/// Short name → full name, mirrored in `Types.db`
pub struct TypeRegistry {
    path: PathBuf,
    file: File,
    /// Insertion order, for listing
    entries: Vec<(String, String)>,
    by_short_name: HashMap<String, usize>,
    sync_writes: bool,
}

impl TypeRegistry {
    /// Open (or create) the registry file and read every entry
    pub fn open(path: &Path, sync_writes: bool) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)
            .map_err(|e| KvError::unavailable(path, e))?;

        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        let (entries, consumed) = Self::parse(path, &data)?;

        // New entries must start on an entry boundary
        if consumed < data.len() {
            file.set_len(consumed as u64)?;
        }

        let mut registry = Self {
            path: path.to_path_buf(),
            file,
            entries: Vec::with_capacity(entries.len()),
            by_short_name: HashMap::new(),
            sync_writes,
        };
        for (short, full) in entries {
            registry.insert(short, full);
        }
        Ok(registry)
    }

    /// Read the entries of a registry file without opening it for writing
    pub fn read_entries(path: &Path) -> Result<Vec<(String, String)>> {
        let mut data = Vec::new();
        File::open(path)
            .map_err(|e| KvError::unavailable(path, e))?
            .read_to_end(&mut data)?;
        Ok(Self::parse(path, &data)?.0)
    }

    /// Complete entries and the number of bytes they span
    fn parse(path: &Path, data: &[u8]) -> Result<(Vec<(String, String)>, usize)> {
        let mut buf = data;
        let mut entries = Vec::new();
        let mut consumed = 0;

        while buf.has_remaining() {
            let trailing_bytes = buf.remaining();
            let Some(short) = read_name(&mut buf)? else {
                warn_partial(path, trailing_bytes);
                break;
            };
            let Some(full) = read_name(&mut buf)? else {
                warn_partial(path, trailing_bytes);
                break;
            };
            entries.push((short, full));
            consumed = data.len() - buf.remaining();
        }
        Ok((entries, consumed))
    }

    /// Record a type the first time one of its instances is written
    ///
    /// Returns true if the entry was new. A short name already bound to a
    /// different full name is a schema mismatch.
    pub fn record(&mut self, short: &str, full: &str) -> Result<bool> {
        if let Some(existing) = self.full_name(short) {
            if existing != full {
                return Err(KvError::SchemaMismatch(format!(
                    "type {:?} is registered as {:?}, not {:?}",
                    short, existing, full
                )));
            }
            return Ok(false);
        }

        let mut buf = BytesMut::with_capacity(8 + short.len() + full.len());
        put_name(&mut buf, short)?;
        put_name(&mut buf, full)?;
        self.file.write_all(&buf)?;
        if self.sync_writes {
            self.file.sync_data()?;
        }

        debug!(short, full, "Registered record type");
        self.insert(short.to_string(), full.to_string());
        Ok(true)
    }

    fn insert(&mut self, short: String, full: String) {
        match self.by_short_name.get(&short) {
            // Later entries win, as in the index file
            Some(&pos) => self.entries[pos].1 = full,
            None => {
                self.by_short_name.insert(short.clone(), self.entries.len());
                self.entries.push((short, full));
            }
        }
    }

    pub fn full_name(&self, short: &str) -> Option<&str> {
        self.by_short_name
            .get(short)
            .map(|&pos| self.entries[pos].1.as_str())
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn warn_partial(path: &Path, trailing_bytes: usize) {
    warn!(
        path = %path.display(),
        trailing_bytes,
        "Ignoring partial entry at end of type registry"
    );
}

fn put_name(buf: &mut BytesMut, name: &str) -> Result<()> {
    let len = i32::try_from(name.len())
        .map_err(|_| KvError::InvalidTypeName(name.to_string()))?;
    buf.put_i32(len);
    buf.put_slice(name.as_bytes());
    Ok(())
}

/// `Ok(None)` when the buffer ends inside the name
fn read_name(buf: &mut &[u8]) -> Result<Option<String>> {
    if buf.remaining() < 4 {
        return Ok(None);
    }
    let len = buf.get_i32();
    if len < 0 {
        return Err(KvError::SchemaMismatch(format!(
            "negative name length {} in type registry",
            len
        )));
    }
    let len = len as usize;
    if buf.remaining() < len {
        return Ok(None);
    }
    let name = String::from_utf8(buf[..len].to_vec()).map_err(|e| {
        KvError::SchemaMismatch(format!("type registry name is not UTF-8: {}", e))
    })?;
    buf.advance(len);
    Ok(Some(name))
}
