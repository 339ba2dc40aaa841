//! Tests for TypeRegistry and DescriptorRegistry
//!
//! These tests verify:
//! - Types.db entries survive reopen
//! - Conflicting full names are rejected
//! - Partial trailing entries are cut off on open
//! - Descriptor resolution is idempotent and checks field lists
//! - Reserved and malformed type names are rejected
//! - Failed appends leave no partial bytes behind
//! - File length lookups tell missing files from unreadable ones

use std::fs::{self, OpenOptions};
use std::io::{self, Write};

use recordkv::storage::{self, write_whole, DescriptorRegistry, Truncate, TypeRegistry};
use recordkv::{Config, FieldDef, FieldKind, KvError, Schema};
use tempfile::TempDir;

fn person_fields() -> Vec<FieldDef> {
    Schema::new()
        .field("name", FieldKind::Str)
        .field("age", FieldKind::Int32)
        .persisted()
}

fn open_registry(temp: &TempDir) -> DescriptorRegistry {
    let config = Config::builder()
        .data_dir(temp.path())
        .reader_pool_size(2)
        .build();
    DescriptorRegistry::open(&config).unwrap()
}

// =============================================================================
// Type Registry Tests
// =============================================================================

#[test]
fn test_record_and_reopen() {
    let temp = TempDir::new().unwrap();
    let path = storage::types_file_path(temp.path());

    {
        let mut types = TypeRegistry::open(&path, false).unwrap();
        assert!(types.record("Person", "app::model::Person").unwrap());
        assert!(types.record("Order", "app::model::Order").unwrap());
        assert!(!types.record("Person", "app::model::Person").unwrap());
    }

    let types = TypeRegistry::open(&path, false).unwrap();
    assert_eq!(
        types.entries(),
        &[
            ("Person".to_string(), "app::model::Person".to_string()),
            ("Order".to_string(), "app::model::Order".to_string()),
        ]
    );
    assert_eq!(types.full_name("Order"), Some("app::model::Order"));
    assert_eq!(types.full_name("Missing"), None);
}

#[test]
fn test_record_writes_each_type_once() {
    let temp = TempDir::new().unwrap();
    let path = storage::types_file_path(temp.path());

    let mut types = TypeRegistry::open(&path, false).unwrap();
    types.record("A", "x::A").unwrap();
    types.record("A", "x::A").unwrap();

    // 4 + 1 + 4 + 4
    assert_eq!(fs::metadata(&path).unwrap().len(), 13);
}

#[test]
fn test_conflicting_full_name() {
    let temp = TempDir::new().unwrap();
    let mut types = TypeRegistry::open(&storage::types_file_path(temp.path()), false).unwrap();

    types.record("Person", "a::Person").unwrap();
    let err = types.record("Person", "b::Person").unwrap_err();

    assert!(matches!(err, KvError::SchemaMismatch(_)));
    assert_eq!(types.full_name("Person"), Some("a::Person"));
}

#[test]
fn test_partial_entry_truncated_on_open() {
    let temp = TempDir::new().unwrap();
    let path = storage::types_file_path(temp.path());

    {
        let mut types = TypeRegistry::open(&path, false).unwrap();
        types.record("Person", "a::Person").unwrap();
    }
    let complete_len = fs::metadata(&path).unwrap().len();

    // A crash in the middle of the next entry
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&[0, 0, 0, 5, b'O', b'r']).unwrap();
    drop(file);

    {
        let mut types = TypeRegistry::open(&path, false).unwrap();
        assert_eq!(types.entries().len(), 1);
        assert_eq!(fs::metadata(&path).unwrap().len(), complete_len);
        types.record("Order", "a::Order").unwrap();
    }

    let entries = TypeRegistry::read_entries(&path).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1], ("Order".to_string(), "a::Order".to_string()));
}

#[test]
fn test_read_entries_missing_file() {
    let temp = TempDir::new().unwrap();
    let err = TypeRegistry::read_entries(&storage::types_file_path(temp.path())).unwrap_err();

    assert!(matches!(err, KvError::StorageUnavailable { .. }));
}

// =============================================================================
// Descriptor Registry Tests
// =============================================================================

#[test]
fn test_resolve_creates_files() {
    let temp = TempDir::new().unwrap();
    let mut registry = open_registry(&temp);

    let descriptor = registry.resolve("Person", &person_fields()).unwrap();
    assert_eq!(descriptor.name(), "Person");
    assert_eq!(descriptor.kinds(), &[FieldKind::Str, FieldKind::Int32]);
    assert_eq!(descriptor.pool_size(), 2);

    assert!(storage::data_file_path(temp.path(), "Person").exists());
    assert!(storage::index_file_path(temp.path(), "Person").exists());
    assert!(registry.contains("Person"));
}

#[test]
fn test_resolve_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let mut registry = open_registry(&temp);

    registry
        .resolve("Person", &person_fields())
        .unwrap()
        .append(1, &[0, 0, 0, 0, 0, 0, 0, 7])
        .unwrap();
    let again = registry.resolve("Person", &person_fields()).unwrap();

    assert_eq!(again.index().live_offset(1), Some(0));
    assert_eq!(registry.descriptors().count(), 1);
}

#[test]
fn test_resolve_with_other_fields_is_mismatch() {
    let temp = TempDir::new().unwrap();
    let mut registry = open_registry(&temp);
    registry.resolve("Person", &person_fields()).unwrap();

    let other = Schema::new().field("id", FieldKind::Int64).persisted();
    let err = registry.resolve("Person", &other).err().unwrap();

    assert!(matches!(err, KvError::SchemaMismatch(_)));
}

#[test]
fn test_invalid_type_names() {
    let temp = TempDir::new().unwrap();
    let mut registry = open_registry(&temp);

    for name in ["", "Types", "../escape", "a/b", "a\\b", "Person.old", "tab\there"] {
        let err = registry.resolve(name, &person_fields()).err().unwrap();
        assert!(
            matches!(err, KvError::InvalidTypeName(_)),
            "{:?} gave {:?}",
            name,
            err
        );
    }
    assert_eq!(registry.descriptors().count(), 0);
}

#[test]
fn test_dirty_tracking() {
    let temp = TempDir::new().unwrap();
    let mut registry = open_registry(&temp);
    let record = [0, 0, 0, 0, 0, 0, 0, 1];

    let descriptor = registry.resolve("Person", &person_fields()).unwrap();
    descriptor.append(1, &record).unwrap();
    descriptor.append(2, &record).unwrap();
    assert!(!descriptor.is_dirty());
    assert!(registry.dirty_types().is_empty());

    let descriptor = registry.resolve("Person", &person_fields()).unwrap();
    assert!(descriptor.tombstone(2).unwrap());
    assert!(!descriptor.tombstone(2).unwrap());
    assert!(!descriptor.tombstone(99).unwrap());

    assert_eq!(registry.dirty_types(), vec!["Person".to_string()]);
}

#[test]
fn test_dirty_state_recomputed_on_open() {
    let temp = TempDir::new().unwrap();
    let record = [0, 0, 0, 0, 0, 0, 0, 1];

    {
        let mut registry = open_registry(&temp);
        let descriptor = registry.resolve("Person", &person_fields()).unwrap();
        descriptor.append(1, &record).unwrap();
        descriptor.append(1, &record).unwrap();
        registry.sync_all().unwrap();
    }

    let mut registry = open_registry(&temp);
    let descriptor = registry.resolve("Person", &person_fields()).unwrap();
    assert!(descriptor.is_dirty());
    assert_eq!(descriptor.index().live_offset(1), Some(8));
}

#[test]
fn test_partial_index_tail_truncated_on_resolve() {
    let temp = TempDir::new().unwrap();
    let record = [0, 0, 0, 0, 0, 0, 0, 1];

    {
        let mut registry = open_registry(&temp);
        registry
            .resolve("Person", &person_fields())
            .unwrap()
            .append(1, &record)
            .unwrap();
    }
    let index_path = storage::index_file_path(temp.path(), "Person");
    let mut file = OpenOptions::new().append(true).open(&index_path).unwrap();
    file.write_all(&[0, 0, 0, 2, 0]).unwrap();
    drop(file);

    let mut registry = open_registry(&temp);
    let descriptor = registry.resolve("Person", &person_fields()).unwrap();
    assert_eq!(fs::metadata(&index_path).unwrap().len(), 12);

    descriptor.append(2, &record).unwrap();
    drop(registry);

    let mut registry = open_registry(&temp);
    let descriptor = registry.resolve("Person", &person_fields()).unwrap();
    assert_eq!(descriptor.index().live_offset(2), Some(8));
}

// =============================================================================
// Partial Writes
// =============================================================================

/// Accepts `budget` bytes, then fails like a full disk
struct ShortDisk {
    bytes: Vec<u8>,
    budget: usize,
}

impl Write for ShortDisk {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.budget == 0 {
            return Err(io::Error::new(io::ErrorKind::Other, "no space left"));
        }
        let n = buf.len().min(self.budget);
        self.bytes.extend_from_slice(&buf[..n]);
        self.budget -= n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Truncate for ShortDisk {
    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.bytes.truncate(len as usize);
        Ok(())
    }
}

#[test]
fn test_failed_write_rolls_back_to_start() {
    let mut disk = ShortDisk {
        bytes: vec![0xAA; 12],
        budget: 5,
    };

    let result = write_whole(&mut disk, 12, &[1u8; 12]);

    assert!(matches!(result, Err(KvError::Io(_))), "got {:?}", result);
    assert_eq!(disk.bytes, vec![0xAA; 12]);
}

#[test]
fn test_complete_write_is_kept() {
    let mut disk = ShortDisk {
        bytes: Vec::new(),
        budget: 64,
    };

    write_whole(&mut disk, 0, &[7u8; 12]).unwrap();
    assert_eq!(disk.bytes, vec![7u8; 12]);
}

// =============================================================================
// File Lengths
// =============================================================================

#[test]
fn test_len_if_exists() {
    let temp = TempDir::new().unwrap();
    let present = temp.path().join("Person.db");
    fs::write(&present, [0u8; 21]).unwrap();

    assert_eq!(storage::len_if_exists(&present).unwrap(), 21);
    assert_eq!(
        storage::len_if_exists(&temp.path().join("Missing.db")).unwrap(),
        0
    );
}

#[cfg(unix)]
#[test]
fn test_len_if_exists_surfaces_other_errors() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("Person.db");
    fs::write(&file, b"x").unwrap();

    // A path below a regular file is ENOTDIR, not NotFound
    let result = storage::len_if_exists(&file.join("Person.idx"));
    assert!(
        matches!(result, Err(KvError::StorageUnavailable { .. })),
        "got {:?}",
        result
    );
}
