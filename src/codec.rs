//! Record codec
//!
//! Encoding and decoding of a record's persisted fields.
//!
//! ## Record Format
//! ```text
//! ┌──────────┬──────────┬─────┬──────────────────────────────┐
//! │ Field 0  │ Field 1  │ ... │ Field n-1                    │
//! └──────────┴──────────┴─────┴──────────────────────────────┘
//! ```
//!
//! ### Field Encoding (big-endian)
//! - bool:    1 byte (0 = false, anything else = true)
//! - int32:   4 bytes
//! - int64:   8 bytes
//! - float32: 4 bytes (IEEE 754 bits)
//! - float64: 8 bytes (IEEE 754 bits)
//! - string:  len (i32, 4 bytes) + UTF-8 bytes
//!
//! Records carry no schema of their own; they can only be read back with
//! the field list they were written with.

use std::io::{self, Read};

use bytes::{BufMut, BytesMut};

use crate::error::{KvError, Result};
use crate::schema::{FieldKind, Value};

/// Size of the string length prefix
pub const STRING_LEN_SIZE: usize = 4;

// =============================================================================
// Encoding
// =============================================================================

/// Encode `values` as one contiguous record
///
/// `kinds` and `values` must line up one to one.
pub fn encode(kinds: &[FieldKind], values: &[Value]) -> Result<BytesMut> {
    if kinds.len() != values.len() {
        return Err(KvError::SchemaMismatch(format!(
            "expected {} values, got {}",
            kinds.len(),
            values.len()
        )));
    }

    let mut buf = BytesMut::with_capacity(encoded_len(values));
    for (index, (kind, value)) in kinds.iter().zip(values).enumerate() {
        encode_field(&mut buf, index, *kind, value)?;
    }
    Ok(buf)
}

/// Number of bytes `values` occupy once encoded
pub fn encoded_len(values: &[Value]) -> usize {
    values
        .iter()
        .map(|v| match v {
            Value::Str(s) => STRING_LEN_SIZE + s.len(),
            other => other.kind().fixed_width().unwrap_or(0),
        })
        .sum()
}

fn encode_field(buf: &mut BytesMut, index: usize, kind: FieldKind, value: &Value) -> Result<()> {
    match (kind, value) {
        (FieldKind::Bool, Value::Bool(v)) => buf.put_u8(u8::from(*v)),
        (FieldKind::Int32, Value::Int32(v)) => buf.put_i32(*v),
        (FieldKind::Int64, Value::Int64(v)) => buf.put_i64(*v),
        (FieldKind::Float32, Value::Float32(v)) => buf.put_f32(*v),
        (FieldKind::Float64, Value::Float64(v)) => buf.put_f64(*v),
        (FieldKind::Str, Value::Str(s)) => {
            let len = i32::try_from(s.len()).map_err(|_| {
                KvError::SchemaMismatch(format!(
                    "field {}: string of {} bytes does not fit an i32 length",
                    index,
                    s.len()
                ))
            })?;
            buf.put_i32(len);
            buf.put_slice(s.as_bytes());
        }
        (kind, value) => {
            return Err(KvError::SchemaMismatch(format!(
                "field {} is {}, got a {} value",
                index,
                kind,
                value.kind()
            )))
        }
    }
    Ok(())
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode one record from `reader`
///
/// Running out of bytes anywhere inside the record is
/// [`KvError::TruncatedRecord`]; other read failures stay I/O errors.
pub fn decode<R: Read>(kinds: &[FieldKind], reader: &mut R) -> Result<Vec<Value>> {
    kinds
        .iter()
        .enumerate()
        .map(|(index, kind)| decode_field(reader, index, *kind))
        .collect()
}

fn decode_field<R: Read>(reader: &mut R, index: usize, kind: FieldKind) -> Result<Value> {
    let value = match kind {
        FieldKind::Bool => {
            let [b] = read_array::<R, 1>(reader, index, kind)?;
            Value::Bool(b != 0)
        }
        FieldKind::Int32 => Value::Int32(i32::from_be_bytes(read_array(reader, index, kind)?)),
        FieldKind::Int64 => Value::Int64(i64::from_be_bytes(read_array(reader, index, kind)?)),
        FieldKind::Float32 => Value::Float32(f32::from_be_bytes(read_array(reader, index, kind)?)),
        FieldKind::Float64 => Value::Float64(f64::from_be_bytes(read_array(reader, index, kind)?)),
        FieldKind::Str => {
            let len = i32::from_be_bytes(read_array(reader, index, kind)?);
            if len < 0 {
                return Err(KvError::SchemaMismatch(format!(
                    "field {}: negative string length {}",
                    index, len
                )));
            }

            // Bounded read: a corrupt length must not drive the allocation
            let mut bytes = Vec::new();
            reader.by_ref().take(len as u64).read_to_end(&mut bytes)?;
            if bytes.len() < len as usize {
                return Err(KvError::TruncatedRecord(format!(
                    "field {} (string): expected {} bytes, got {}",
                    index,
                    len,
                    bytes.len()
                )));
            }

            let s = String::from_utf8(bytes).map_err(|e| {
                KvError::SchemaMismatch(format!("field {}: invalid UTF-8: {}", index, e))
            })?;
            Value::Str(s)
        }
    };
    Ok(value)
}

fn read_array<R: Read, const N: usize>(
    reader: &mut R,
    index: usize,
    kind: FieldKind,
) -> Result<[u8; N]> {
    let mut bytes = [0u8; N];
    reader.read_exact(&mut bytes).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => KvError::TruncatedRecord(format!(
            "field {} ({}): expected {} bytes",
            index, kind, N
        )),
        _ => KvError::Io(e),
    })?;
    Ok(bytes)
}
