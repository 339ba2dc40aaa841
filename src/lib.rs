//! # recordkv
//!
//! An embedded key-value store for typed records with:
//! - Per-type append-only data and key-index files
//! - A schema-driven binary record codec
//! - In-memory key indexes rebuilt from disk at open
//! - Bounded pools of concurrent readers under a readers/writer lock
//! - On-demand compaction of deleted and superseded records
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Engine                              │
//! │       add / update / remove / get_by_key / find_all         │
//! │          (RwLock: writers exclusive, readers shared)        │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                 Descriptor Registry                         │
//! │          (one TypeDescriptor per record type)               │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┼─────────────┬──────────────┐
//!          │            │             │              │
//!          ▼            ▼             ▼              ▼
//!   ┌───────────┐ ┌───────────┐ ┌───────────┐ ┌─────────────┐
//!   │  Codec    │ │ Key Index │ │  Reader   │ │ Compaction  │
//!   │ (fields)  │ │ (HashMap) │ │   Pool    │ │  (rewrite)  │
//!   └─────┬─────┘ └─────┬─────┘ └─────┬─────┘ └──────┬──────┘
//!         │             │             │              │
//!         ▼             ▼             ▼              ▼
//!      {Type}.db     {Type}.idx    {Type}.db     *.compact → swap
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use recordkv::{Config, Engine, FieldKind, FieldValues, Record, Result, Schema, Value};
//!
//! #[derive(Debug, PartialEq)]
//! struct Person {
//!     name: String,
//!     age: i32,
//! }
//!
//! impl Record for Person {
//!     const TYPE_NAME: &'static str = "Person";
//!
//!     fn schema() -> Schema {
//!         Schema::new()
//!             .field("name", FieldKind::Str)
//!             .field("age", FieldKind::Int32)
//!     }
//!
//!     fn values(&self) -> Vec<Value> {
//!         vec![Value::Str(self.name.clone()), Value::Int32(self.age)]
//!     }
//!
//!     fn from_values(mut fields: FieldValues) -> Result<Self> {
//!         Ok(Person {
//!             name: fields.take_string("name")?,
//!             age: fields.get_i32("age")?,
//!         })
//!     }
//! }
//!
//! fn main() -> Result<()> {
//!     let config = Config::builder()
//!         .data_dir("./people")
//!         .create_if_missing(true)
//!         .build();
//!     let engine = Engine::open(config)?;
//!
//!     engine.add(1, &Person { name: "Ann".into(), age: 30 })?;
//!     let ann: Option<Person> = engine.get_by_key(1)?;
//!     assert_eq!(ann.map(|p| p.age), Some(30));
//!
//!     engine.remove::<Person>(1)?;
//!     engine.compact::<Person>()?;
//!     engine.close()
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod schema;
pub mod codec;
pub mod index;
pub mod storage;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{KvError, Result};
pub use config::Config;
pub use engine::{Engine, Scan};
pub use schema::{FieldDef, FieldKind, FieldValues, Record, Schema, Value};
pub use storage::CompactionStats;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of recordkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
