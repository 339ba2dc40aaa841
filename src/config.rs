//! Configuration for recordkv
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{KvError, Result};

/// Default number of pooled read handles per record type
pub const DEFAULT_READER_POOL_SIZE: usize = 10;

/// Main configuration for an engine instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding every file of the database
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── Types.db        (short name → full name registry)
    ///     ├── {Type}.db       (records, append-only)
    ///     └── {Type}.idx      (key → offset entries, append-only)
    pub data_dir: PathBuf,

    /// Create `data_dir` on open instead of failing when it is missing
    pub create_if_missing: bool,

    /// fsync the data and index files after every append
    pub sync_writes: bool,

    // -------------------------------------------------------------------------
    // Read Configuration
    // -------------------------------------------------------------------------
    /// Read handles opened per record type; also the engine-wide cap on
    /// concurrent readers
    pub reader_pool_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./recordkv_data"),
            create_if_missing: false,
            sync_writes: false,
            reader_pool_size: DEFAULT_READER_POOL_SIZE,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.reader_pool_size == 0 {
            return Err(KvError::Config(
                "reader_pool_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Create the data directory on open if it does not exist
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.config.create_if_missing = create;
        self
    }

    /// fsync after every append
    pub fn sync_writes(mut self, sync: bool) -> Self {
        self.config.sync_writes = sync;
        self
    }

    /// Set the number of pooled readers per type
    pub fn reader_pool_size(mut self, size: usize) -> Self {
        self.config.reader_pool_size = size;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
