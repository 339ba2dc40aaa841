//! Record types shared by the integration tests

#![allow(dead_code)]

use recordkv::{Config, Engine, FieldKind, FieldValues, Record, Result, Schema, Value};
use tempfile::TempDir;

// =============================================================================
// Fixtures
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub name: String,
    pub age: i32,
}

impl Person {
    pub fn new(name: &str, age: i32) -> Self {
        Self {
            name: name.to_string(),
            age,
        }
    }
}

impl Record for Person {
    const TYPE_NAME: &'static str = "Person";

    fn schema() -> Schema {
        Schema::new()
            .field("name", FieldKind::Str)
            .field("age", FieldKind::Int32)
    }

    fn values(&self) -> Vec<Value> {
        vec![Value::Str(self.name.clone()), Value::Int32(self.age)]
    }

    fn from_values(mut fields: FieldValues) -> Result<Self> {
        Ok(Self {
            name: fields.take_string("name")?,
            age: fields.get_i32("age")?,
        })
    }
}

/// Every field kind, plus a field that never reaches disk
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub valid: bool,
    pub sensor: i32,
    pub taken_at: i64,
    pub celsius: f32,
    pub precise: f64,
    pub label: String,
    /// Excluded from persistence
    pub cached_score: i64,
}

impl Reading {
    pub fn sample(sensor: i32) -> Self {
        Self {
            valid: sensor % 2 == 0,
            sensor,
            taken_at: 1_700_000_000_000 + sensor as i64,
            celsius: 21.5 + sensor as f32,
            precise: 0.1 * sensor as f64,
            label: format!("sensor-{}", sensor),
            cached_score: 99,
        }
    }
}

impl Record for Reading {
    const TYPE_NAME: &'static str = "Reading";

    fn schema() -> Schema {
        Schema::new()
            .field("valid", FieldKind::Bool)
            .field("sensor", FieldKind::Int32)
            .field("taken_at", FieldKind::Int64)
            .field("celsius", FieldKind::Float32)
            .field("precise", FieldKind::Float64)
            .field("label", FieldKind::Str)
            .excluded("cached_score", FieldKind::Int64)
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Bool(self.valid),
            Value::Int32(self.sensor),
            Value::Int64(self.taken_at),
            Value::Float32(self.celsius),
            Value::Float64(self.precise),
            Value::Str(self.label.clone()),
            Value::Int64(self.cached_score),
        ]
    }

    fn from_values(mut fields: FieldValues) -> Result<Self> {
        Ok(Self {
            valid: fields.get_bool("valid")?,
            sensor: fields.get_i32("sensor")?,
            taken_at: fields.get_i64("taken_at")?,
            celsius: fields.get_f32("celsius")?,
            precise: fields.get_f64("precise")?,
            label: fields.take_string("label")?,
            cached_score: 0,
        })
    }
}

/// Claims the `Person` name with a different layout
#[derive(Debug, Clone, PartialEq)]
pub struct Impostor {
    pub id: i64,
}

impl Record for Impostor {
    const TYPE_NAME: &'static str = "Person";

    fn full_name() -> &'static str {
        "billing::Impostor"
    }

    fn schema() -> Schema {
        Schema::new().field("id", FieldKind::Int64)
    }

    fn values(&self) -> Vec<Value> {
        vec![Value::Int64(self.id)]
    }

    fn from_values(mut fields: FieldValues) -> Result<Self> {
        Ok(Self {
            id: fields.get_i64("id")?,
        })
    }
}

/// A type whose name would clash with `Types.db`
#[derive(Debug, Clone, PartialEq)]
pub struct Types {
    pub flag: bool,
}

impl Record for Types {
    const TYPE_NAME: &'static str = "Types";

    fn schema() -> Schema {
        Schema::new().field("flag", FieldKind::Bool)
    }

    fn values(&self) -> Vec<Value> {
        vec![Value::Bool(self.flag)]
    }

    fn from_values(mut fields: FieldValues) -> Result<Self> {
        Ok(Self {
            flag: fields.get_bool("flag")?,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

pub fn setup_temp_engine() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open_path(temp_dir.path()).unwrap();
    (temp_dir, engine)
}

pub fn setup_temp_engine_with_pool(pool_size: usize) -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .reader_pool_size(pool_size)
        .build();
    let engine = Engine::open(config).unwrap();
    (temp_dir, engine)
}
