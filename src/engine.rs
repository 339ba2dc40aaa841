//! Engine Module
//!
//! The storage engine that coordinates descriptors, readers and compaction.
//!
//! ## Responsibilities
//! - Resolve record types to descriptors on first use
//! - Serialize writes, admit concurrent reads
//! - Bound concurrent disk reads to the reader pool size
//! - Run compaction exclusively

use std::marker::PhantomData;
use std::path::Path;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{info, warn};

use crate::codec;
use crate::config::Config;
use crate::error::{KvError, Result};
use crate::schema::{FieldDef, FieldKind, FieldValues, Record};
use crate::storage::{
    self, CompactionStats, DescriptorRegistry, Permit, PooledReader, ReadPermits,
};

/// The main storage engine
///
/// ## Concurrency Model: Readers/Writer lock + read permits
///
/// - **Writes** (add/update/remove/compact): exclusive side of `registry`
///   - One mutation at a time, so index appends are totally ordered
///
/// - **Reads** (get_by_key/find_first/find_all): shared side of `registry`
///   - A permit from `permits` is taken first; at most `reader_pool_size`
///     readers hold a pooled handle at once
///   - A [`Scan`] keeps its permit and shared guard until dropped
///   - Shared guards are taken with `read_recursive`, so a thread inside a
///     scan can read again while a writer is queued
///
/// Share an engine between threads with `Arc<Engine>`.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Descriptors and type registry (engine-wide RwLock)
    registry: RwLock<DescriptorRegistry>,

    /// Caps concurrent pooled reads
    permits: ReadPermits,
}

impl Engine {
    /// Open an engine over an existing directory
    ///
    /// On startup:
    /// 1. Check (or create, if configured) the data directory
    /// 2. Read the type registry
    /// 3. Ready to serve requests; descriptors open lazily
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        if config.create_if_missing {
            std::fs::create_dir_all(&config.data_dir)
                .map_err(|e| KvError::unavailable(&config.data_dir, e))?;
        }
        if !config.data_dir.is_dir() {
            return Err(KvError::unavailable(
                &config.data_dir,
                std::io::Error::new(std::io::ErrorKind::NotFound, "data directory does not exist"),
            ));
        }

        let registry = DescriptorRegistry::open(&config)?;
        info!(
            data_dir = %config.data_dir.display(),
            types = registry.types().entries().len(),
            reader_pool_size = config.reader_pool_size,
            "Engine opened"
        );

        Ok(Self {
            permits: ReadPermits::new(config.reader_pool_size),
            registry: RwLock::new(registry),
            config,
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        let config = Config::builder().data_dir(path).build();
        Self::open(config)
    }

    /// Close the engine, syncing every open file
    pub fn close(self) -> Result<()> {
        let mut registry = self.registry.write();
        registry.sync_all()?;
        info!(data_dir = %self.config.data_dir.display(), "Engine closed");
        Ok(())
    }

    /// Resolve `R` now instead of on its first read or write
    pub fn register<R: Record>(&self) -> Result<()> {
        let fields = R::schema().persisted();
        self.registry.write().resolve(R::TYPE_NAME, &fields)?;
        Ok(())
    }

    // =========================================================================
    // Write Path
    // =========================================================================

    /// Store `record` under `key`
    ///
    /// An existing record for `key` is superseded: the new copy is appended
    /// and the old one becomes garbage for compaction.
    pub fn add<R: Record>(&self, key: i32, record: &R) -> Result<()> {
        let mut registry = self.registry.write();
        self.write_locked(&mut registry, key, record)
    }

    /// Write `record` under `key` and flag the type for compaction
    ///
    /// Behaves as an upsert: a key with no live record is simply written.
    pub fn update<R: Record>(&self, key: i32, record: &R) -> Result<()> {
        let mut registry = self.registry.write();
        self.write_locked(&mut registry, key, record)?;
        if let Some(descriptor) = registry.get_mut(R::TYPE_NAME) {
            descriptor.mark_dirty();
        }
        Ok(())
    }

    /// Delete the record under `key`
    ///
    /// Returns false if there was no live record.
    pub fn remove<R: Record>(&self, key: i32) -> Result<bool> {
        let mut registry = self.registry.write();
        let fields = R::schema().persisted();
        registry.resolve(R::TYPE_NAME, &fields)?.tombstone(key)
    }

    fn write_locked<R: Record>(
        &self,
        registry: &mut DescriptorRegistry,
        key: i32,
        record: &R,
    ) -> Result<()> {
        let schema = R::schema();
        let fields = schema.persisted();
        let values = schema.persisted_values(record.values())?;

        registry.resolve(R::TYPE_NAME, &fields)?;
        // A short name claimed by another type fails before any bytes land
        registry.record_type(R::TYPE_NAME, R::full_name())?;

        let descriptor = registry.resolve(R::TYPE_NAME, &fields)?;
        let encoded = codec::encode(descriptor.kinds(), &values)?;
        descriptor.append(key, &encoded)?;
        Ok(())
    }

    // =========================================================================
    // Read Path
    // =========================================================================

    /// Point lookup; `None` if the key is unknown or deleted
    pub fn get_by_key<R: Record>(&self, key: i32) -> Result<Option<R>> {
        let _permit = self.permits.acquire()?;
        let fields = R::schema().persisted();
        let registry = self.read_resolved(R::TYPE_NAME, &fields)?;
        let descriptor = resolved(&registry, R::TYPE_NAME)?;

        match descriptor.read_key(key)? {
            Some(values) => R::from_values(FieldValues::new(descriptor.fields(), values)?).map(Some),
            None => Ok(None),
        }
    }

    /// True if `key` has a live record of type `R`
    pub fn contains_key<R: Record>(&self, key: i32) -> Result<bool> {
        let fields = R::schema().persisted();
        let registry = self.read_resolved(R::TYPE_NAME, &fields)?;
        Ok(resolved(&registry, R::TYPE_NAME)?
            .index()
            .live_offset(key)
            .is_some())
    }

    /// Number of live records of type `R`
    pub fn count<R: Record>(&self) -> Result<usize> {
        let fields = R::schema().persisted();
        let registry = self.read_resolved(R::TYPE_NAME, &fields)?;
        Ok(resolved(&registry, R::TYPE_NAME)?.index().live_count())
    }

    /// First record (in index order) matching `predicate`
    pub fn find_first<R, P>(&self, predicate: P) -> Result<Option<R>>
    where
        R: Record,
        P: FnMut(&R) -> bool,
    {
        self.find_all(predicate)?.next().transpose()
    }

    /// Lazily scan every live record of `R`, yielding those matching
    /// `predicate`
    ///
    /// The scan holds a read permit, a pooled reader and the shared side of
    /// the engine lock until dropped; drop it before writing to the same
    /// engine from the same thread. A record that fails to decode is yielded
    /// as an error and ends the scan.
    ///
    /// Reads nested inside a live scan on the same thread (a `get_by_key`
    /// per scanned record, say) take the shared lock recursively, so a
    /// queued writer cannot wedge them. They need a permit of their own and
    /// fail with [`KvError::ReaderPoolExhausted`] rather than wait when
    /// none is free.
    /// A type first opened inside a scan needs the exclusive lock, so
    /// `register` the types a scan body reads before starting it.
    pub fn find_all<R, P>(&self, predicate: P) -> Result<Scan<'_, R, P>>
    where
        R: Record,
        P: FnMut(&R) -> bool,
    {
        let permit = self.permits.acquire()?;
        let fields = R::schema().persisted();
        let guard = self.read_resolved(R::TYPE_NAME, &fields)?;

        let descriptor = resolved(&guard, R::TYPE_NAME)?;
        let reader = descriptor.readers().acquire()?;
        let offsets: Vec<u64> = descriptor.index().live_entries().map(|(_, o)| o).collect();
        let kinds = descriptor.kinds().to_vec();

        Ok(Scan {
            reader,
            offsets: offsets.into_iter(),
            kinds,
            fields,
            predicate,
            finished: false,
            _permit: permit,
            _guard: guard,
            _record: PhantomData,
        })
    }

    // =========================================================================
    // Compaction
    // =========================================================================

    /// Rewrite `R`'s files without deleted and superseded records
    pub fn compact<R: Record>(&self) -> Result<CompactionStats> {
        let mut registry = self.registry.write();
        let fields = R::schema().persisted();
        registry.resolve(R::TYPE_NAME, &fields)?;
        storage::compact(&mut registry, R::TYPE_NAME)
    }

    /// Compact every resolved type that has accumulated garbage
    pub fn compact_dirty(&self) -> Result<Vec<CompactionStats>> {
        let mut registry = self.registry.write();
        let mut stats = Vec::new();
        for name in registry.dirty_types() {
            stats.push(storage::compact(&mut registry, &name)?);
        }
        Ok(stats)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// `(short name, full name)` of every type ever written to this directory
    pub fn stored_types(&self) -> Vec<(String, String)> {
        self.registry.read_recursive().types().entries().to_vec()
    }

    /// Full name a short type name was registered under
    pub fn full_type_name(&self, short: &str) -> Option<String> {
        self.registry
            .read_recursive()
            .types()
            .full_name(short)
            .map(str::to_string)
    }

    /// `(in use, peak in use, capacity)` of `R`'s reader pool
    pub fn reader_pool_stats<R: Record>(&self) -> Option<(usize, usize, usize)> {
        self.registry.read_recursive().get(R::TYPE_NAME).map(|d| {
            let pool = d.readers();
            (pool.in_use(), pool.peak_in_use(), pool.capacity())
        })
    }

    /// Flush every open file to disk
    pub fn sync(&self) -> Result<()> {
        self.registry.write().sync_all()
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Shared guard with `name` resolved
    ///
    /// Resolution needs the exclusive side, so an unresolved type takes the
    /// write lock once and downgrades it.
    fn read_resolved(
        &self,
        name: &str,
        fields: &[FieldDef],
    ) -> Result<RwLockReadGuard<'_, DescriptorRegistry>> {
        {
            // Recursive: the thread may already hold a shared guard in a Scan
            let registry = self.registry.read_recursive();
            if let Some(descriptor) = registry.get(name) {
                registry.ensure_usable(name)?;
                if !descriptor.matches(fields) {
                    return Err(KvError::SchemaMismatch(format!(
                        "type {:?} was opened with a different field list",
                        name
                    )));
                }
                return Ok(registry);
            }
        }

        let mut registry = self.registry.write();
        registry.resolve(name, fields)?;
        Ok(RwLockWriteGuard::downgrade(registry))
    }
}

fn resolved<'a>(
    registry: &'a DescriptorRegistry,
    name: &str,
) -> Result<&'a storage::TypeDescriptor> {
    registry
        .get(name)
        .ok_or_else(|| KvError::InvalidTypeName(name.to_string()))
}

// =============================================================================
// Scan
// =============================================================================

/// Lazy full scan of one record type, see [`Engine::find_all`]
///
/// Iteration order follows the key index and is not key order.
pub struct Scan<'a, R, P> {
    // Field order is drop order: the reader returns to its pool before the
    // permit and the shared guard are released
    reader: PooledReader,
    offsets: std::vec::IntoIter<u64>,
    kinds: Vec<FieldKind>,
    fields: Vec<FieldDef>,
    predicate: P,
    finished: bool,
    _permit: Permit<'a>,
    _guard: RwLockReadGuard<'a, DescriptorRegistry>,
    _record: PhantomData<fn() -> R>,
}

impl<R, P> Scan<'_, R, P>
where
    R: Record,
    P: FnMut(&R) -> bool,
{
    fn decode_next(&mut self, offset: u64) -> Result<R> {
        let kinds = &self.kinds;
        let values = self
            .reader
            .read_at(offset, |r| codec::decode(kinds, r))
            .map_err(|e| {
                if e.is_truncated() {
                    warn!(type_name = R::TYPE_NAME, offset, error = %e, "Scan hit unreadable record");
                }
                e
            })?;
        R::from_values(FieldValues::new(&self.fields, values)?)
    }
}

impl<R, P> Iterator for Scan<'_, R, P>
where
    R: Record,
    P: FnMut(&R) -> bool,
{
    type Item = Result<R>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        while let Some(offset) = self.offsets.next() {
            match self.decode_next(offset) {
                Ok(record) => {
                    if (self.predicate)(&record) {
                        return Some(Ok(record));
                    }
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }

        self.finished = true;
        None
    }
}
