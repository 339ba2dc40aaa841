//! Field values
//!
//! Dynamically typed values passed between records and the codec.

use crate::error::{KvError, Result};

use super::{FieldDef, FieldKind};

/// A single field value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Str(String),
}

impl Value {
    pub fn kind(&self) -> FieldKind {
        match self {
            Value::Bool(_) => FieldKind::Bool,
            Value::Int32(_) => FieldKind::Int32,
            Value::Int64(_) => FieldKind::Int64,
            Value::Float32(_) => FieldKind::Float32,
            Value::Float64(_) => FieldKind::Float64,
            Value::Str(_) => FieldKind::Str,
        }
    }
}

/// Decoded persisted fields of one record, addressed by name
#[derive(Debug)]
pub struct FieldValues {
    entries: Vec<(String, Option<Value>)>,
}

impl FieldValues {
    /// Pair `values` with the persisted field list they were decoded with
    pub fn new(fields: &[FieldDef], values: Vec<Value>) -> Result<Self> {
        if fields.len() != values.len() {
            return Err(KvError::SchemaMismatch(format!(
                "{} persisted fields but {} decoded values",
                fields.len(),
                values.len()
            )));
        }
        let entries = fields
            .iter()
            .zip(values)
            .map(|(f, v)| (f.name.clone(), Some(v)))
            .collect();
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Move a value out; each field can be taken once
    pub fn take(&mut self, name: &str) -> Result<Value> {
        self.entries
            .iter_mut()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.take())
            .ok_or_else(|| KvError::SchemaMismatch(format!("no persisted field {:?}", name)))
    }

    pub fn get_bool(&mut self, name: &str) -> Result<bool> {
        match self.take(name)? {
            Value::Bool(v) => Ok(v),
            other => Err(wrong_kind(name, FieldKind::Bool, &other)),
        }
    }

    pub fn get_i32(&mut self, name: &str) -> Result<i32> {
        match self.take(name)? {
            Value::Int32(v) => Ok(v),
            other => Err(wrong_kind(name, FieldKind::Int32, &other)),
        }
    }

    pub fn get_i64(&mut self, name: &str) -> Result<i64> {
        match self.take(name)? {
            Value::Int64(v) => Ok(v),
            other => Err(wrong_kind(name, FieldKind::Int64, &other)),
        }
    }

    pub fn get_f32(&mut self, name: &str) -> Result<f32> {
        match self.take(name)? {
            Value::Float32(v) => Ok(v),
            other => Err(wrong_kind(name, FieldKind::Float32, &other)),
        }
    }

    pub fn get_f64(&mut self, name: &str) -> Result<f64> {
        match self.take(name)? {
            Value::Float64(v) => Ok(v),
            other => Err(wrong_kind(name, FieldKind::Float64, &other)),
        }
    }

    pub fn take_string(&mut self, name: &str) -> Result<String> {
        match self.take(name)? {
            Value::Str(v) => Ok(v),
            other => Err(wrong_kind(name, FieldKind::Str, &other)),
        }
    }
}

fn wrong_kind(name: &str, expected: FieldKind, got: &Value) -> KvError {
    KvError::SchemaMismatch(format!(
        "field {:?} should be {}, stored value is {}",
        name,
        expected,
        got.kind()
    ))
}
