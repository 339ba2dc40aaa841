//! Schema Module
//!
//! Describes the persisted shape of a record type.
//!
//! ## Responsibilities
//! - Name the field kinds the codec understands
//! - Carry the ordered field list of a type, with the exclusion marker
//! - Define the `Record` trait every stored type implements
//!
//! Field order is part of the on-disk format: records are written as the
//! concatenation of their persisted fields in schema order, with no tags or
//! lengths other than the string prefix.

mod value;

pub use value::{FieldValues, Value};

use std::fmt;

use crate::error::{KvError, Result};

/// Kind of a single persisted field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Bool,
    Int32,
    Int64,
    Float32,
    Float64,
    /// UTF-8, length-prefixed
    Str,
}

impl FieldKind {
    /// Encoded width of fixed-size kinds, `None` for strings
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            FieldKind::Bool => Some(1),
            FieldKind::Int32 | FieldKind::Float32 => Some(4),
            FieldKind::Int64 | FieldKind::Float64 => Some(8),
            FieldKind::Str => None,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Bool => "bool",
            FieldKind::Int32 => "int32",
            FieldKind::Int64 => "int64",
            FieldKind::Float32 => "float32",
            FieldKind::Float64 => "float64",
            FieldKind::Str => "string",
        };
        f.write_str(name)
    }
}

/// One field of a record type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    /// Excluded fields are never written; they take their default on read
    pub excluded: bool,
}

/// Ordered field list of a record type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<FieldDef>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a persisted field
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            kind,
            excluded: false,
        });
        self
    }

    /// Append a field that is kept out of storage
    pub fn excluded(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            kind,
            excluded: true,
        });
        self
    }

    /// All fields, excluded ones included
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// The fields that reach disk, in order
    pub fn persisted(&self) -> Vec<FieldDef> {
        self.fields.iter().filter(|f| !f.excluded).cloned().collect()
    }

    /// Keep only the values of persisted fields, checking count and kinds
    ///
    /// `values` holds one entry per schema field, excluded ones included.
    pub fn persisted_values(&self, values: Vec<Value>) -> Result<Vec<Value>> {
        if values.len() != self.fields.len() {
            return Err(KvError::SchemaMismatch(format!(
                "expected {} field values, got {}",
                self.fields.len(),
                values.len()
            )));
        }

        let mut persisted = Vec::with_capacity(values.len());
        for (field, value) in self.fields.iter().zip(values) {
            if value.kind() != field.kind {
                return Err(KvError::SchemaMismatch(format!(
                    "field {:?} is {}, got a {} value",
                    field.name,
                    field.kind,
                    value.kind()
                )));
            }
            if !field.excluded {
                persisted.push(value);
            }
        }
        Ok(persisted)
    }
}

/// A type that can be stored in the engine
///
/// Implementations list every field in [`Record::schema`] and return the
/// values in the same order from [`Record::values`]:
///
/// ```
/// use recordkv::{FieldKind, FieldValues, Record, Result, Schema, Value};
///
/// struct Person {
///     name: String,
///     age: i32,
/// }
///
/// impl Record for Person {
///     const TYPE_NAME: &'static str = "Person";
///
///     fn schema() -> Schema {
///         Schema::new()
///             .field("name", FieldKind::Str)
///             .field("age", FieldKind::Int32)
///     }
///
///     fn values(&self) -> Vec<Value> {
///         vec![Value::Str(self.name.clone()), Value::Int32(self.age)]
///     }
///
///     fn from_values(mut fields: FieldValues) -> Result<Self> {
///         Ok(Person {
///             name: fields.take_string("name")?,
///             age: fields.get_i32("age")?,
///         })
///     }
/// }
/// ```
pub trait Record: Sized {
    /// Short name; also the stem of the type's file names
    const TYPE_NAME: &'static str;

    /// Name recorded in `Types.db` the first time the type is written
    ///
    /// Persisted: later writes under the same [`Record::TYPE_NAME`] must
    /// return the same string or fail with a schema mismatch. Defaults to
    /// `TYPE_NAME`; override it with a fixed string (never
    /// `std::any::type_name`, which changes with module paths and compiler
    /// versions) to tell apart types that share a short name.
    fn full_name() -> &'static str {
        Self::TYPE_NAME
    }

    fn schema() -> Schema;

    /// One value per schema field, excluded fields included
    fn values(&self) -> Vec<Value>;

    /// Rebuild a record from its persisted fields
    fn from_values(fields: FieldValues) -> Result<Self>;
}

/// Check that a type name can be used as a file stem
pub fn validate_type_name(name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name == crate::storage::TYPES_FILE_STEM
        || name
            .chars()
            .any(|c| c == '/' || c == '\\' || c == '.' || c.is_control());
    if bad {
        return Err(KvError::InvalidTypeName(name.to_string()));
    }
    Ok(())
}
