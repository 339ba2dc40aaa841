//! Descriptor Registry
//!
//! Lazily opened type descriptors of one database directory, plus its
//! type registry file.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, error};

use crate::config::Config;
use crate::error::{KvError, Result};
use crate::schema::{validate_type_name, FieldDef};

use super::descriptor::TypeDescriptor;
use super::types::TypeRegistry;
use super::types_file_path;

/// All per-type state of an open directory
///
/// The engine keeps this behind its RwLock: resolution and mutation need
/// `&mut self`, lookups and reads only `&self`.
pub struct DescriptorRegistry {
    dir: PathBuf,
    pool_size: usize,
    sync_writes: bool,

    descriptors: HashMap<String, TypeDescriptor>,
    types: TypeRegistry,

    /// Types left half-swapped by a failed compaction
    corrupted: HashSet<String>,
}

impl DescriptorRegistry {
    /// Open the registry of `config.data_dir`, reading `Types.db`
    ///
    /// The directory must already exist.
    pub fn open(config: &Config) -> Result<Self> {
        let dir = config.data_dir.clone();
        let types = TypeRegistry::open(&types_file_path(&dir), config.sync_writes)?;

        Ok(Self {
            dir,
            pool_size: config.reader_pool_size,
            sync_writes: config.sync_writes,
            descriptors: HashMap::new(),
            types,
            corrupted: HashSet::new(),
        })
    }

    /// Descriptor of `name`, opening it on first use
    ///
    /// `fields` is the persisted field list; a cached descriptor opened with
    /// a different list is a schema mismatch.
    pub fn resolve(&mut self, name: &str, fields: &[FieldDef]) -> Result<&mut TypeDescriptor> {
        self.ensure_usable(name)?;

        if !self.descriptors.contains_key(name) {
            validate_type_name(name)?;
            let descriptor = TypeDescriptor::open(
                &self.dir,
                name,
                fields.to_vec(),
                self.pool_size,
                self.sync_writes,
            )?;
            debug!(type_name = name, fields = fields.len(), "Resolved descriptor");
            self.descriptors.insert(name.to_string(), descriptor);
        }

        let descriptor = self
            .descriptors
            .get_mut(name)
            .ok_or_else(|| KvError::InvalidTypeName(name.to_string()))?;
        if !descriptor.matches(fields) {
            return Err(KvError::SchemaMismatch(format!(
                "type {:?} was opened with a different field list",
                name
            )));
        }
        Ok(descriptor)
    }

    /// Cached descriptor, if `name` was resolved this session
    pub fn get(&self, name: &str) -> Option<&TypeDescriptor> {
        self.descriptors.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut TypeDescriptor> {
        self.descriptors.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.descriptors.contains_key(name)
    }

    /// Fail if compaction left `name` in an unknown state
    pub fn ensure_usable(&self, name: &str) -> Result<()> {
        if self.corrupted.contains(name) {
            return Err(KvError::CompactionCorruption {
                type_name: name.to_string(),
                detail: "type is unusable until its files are repaired".to_string(),
            });
        }
        Ok(())
    }

    /// Take a descriptor out, closing its handles once dropped
    pub(crate) fn detach(&mut self, name: &str) -> Option<TypeDescriptor> {
        self.descriptors.remove(name)
    }

    pub(crate) fn attach(&mut self, descriptor: TypeDescriptor) {
        self.descriptors
            .insert(descriptor.name().to_string(), descriptor);
    }

    pub(crate) fn mark_corrupted(&mut self, name: &str, detail: &str) {
        error!(type_name = name, detail, "Type marked corrupted");
        self.corrupted.insert(name.to_string());
    }

    pub fn is_corrupted(&self, name: &str) -> bool {
        self.corrupted.contains(name)
    }

    // =========================================================================
    // Type Registry
    // =========================================================================

    pub fn record_type(&mut self, short: &str, full: &str) -> Result<bool> {
        self.types.record(short, full)
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Names of every resolved type with unreachable records
    pub fn dirty_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .descriptors
            .values()
            .filter(|d| d.is_dirty())
            .map(|d| d.name().to_string())
            .collect();
        names.sort();
        names
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.descriptors.values()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Sync every open file
    pub fn sync_all(&mut self) -> Result<()> {
        for descriptor in self.descriptors.values_mut() {
            descriptor.sync()?;
        }
        self.types.sync()
    }
}
