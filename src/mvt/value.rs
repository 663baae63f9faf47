//! The MVT attribute value union (`vector_tile.proto`'s `Tile.Value`).

use std::io::Cursor;

use super::wire::{
    read_f32, read_f64, read_key, read_string, read_svarint, read_varint, write_f32, write_f64,
    write_string_field, write_svarint, write_varint_field, WIRE_VARINT,
};
use crate::error::{PmtError, PmtResult};

/// A single attribute value. Exactly one variant is populated per MVT's tagged-union
/// wire encoding; unrecognized field numbers within a `Value` message decode to `None`
/// rather than an error, per the format's forward-compatibility convention.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// UTF-8 string.
    String(String),
    /// IEEE-754 single precision.
    Float(f32),
    /// IEEE-754 double precision.
    Double(f64),
    /// Signed 64-bit integer (zig-zag encoded on the wire as `sint64`).
    Int(i64),
    /// Unsigned 64-bit integer.
    UInt(u64),
    /// Boolean.
    Bool(bool),
}

const FIELD_STRING: u32 = 1;
const FIELD_FLOAT: u32 = 2;
const FIELD_DOUBLE: u32 = 3;
const FIELD_INT: u32 = 4;
const FIELD_UINT: u32 = 5;
const FIELD_SINT: u32 = 6;
const FIELD_BOOL: u32 = 7;

/// Decodes a `Value` message's bytes. Returns `None` if the message is empty (no
/// recognized field was present) rather than erroring, matching how an absent/unknown
/// tag type decodes per §4.5.2.
pub(crate) fn decode(bytes: &[u8]) -> PmtResult<Option<Value>> {
    let mut cursor = Cursor::new(bytes);
    let mut value = None;

    while let Some((field, wire_type)) = read_key(&mut cursor)? {
        value = match field {
            FIELD_STRING => Some(Value::String(read_string(&mut cursor)?)),
            FIELD_FLOAT => Some(Value::Float(read_f32(&mut cursor)?)),
            FIELD_DOUBLE => Some(Value::Double(read_f64(&mut cursor)?)),
            FIELD_INT => Some(Value::Int(read_varint(&mut cursor)? as i64)),
            FIELD_UINT => Some(Value::UInt(read_varint(&mut cursor)?)),
            FIELD_SINT => Some(Value::Int(read_svarint(&mut cursor)?)),
            FIELD_BOOL => Some(Value::Bool(read_varint(&mut cursor)? != 0)),
            _ => {
                super::wire::skip_field(&mut cursor, wire_type)?;
                value
            }
        };
    }

    Ok(value)
}

/// Encodes a `Value` message's bytes (without the enclosing field key/length that
/// frames it inside `Layer.values`).
pub(crate) fn encode(value: &Value, buf: &mut Vec<u8>) {
    match value {
        Value::String(s) => write_string_field(buf, FIELD_STRING, s),
        Value::Float(f) => write_f32(buf, FIELD_FLOAT, *f),
        Value::Double(d) => write_f64(buf, FIELD_DOUBLE, *d),
        Value::Int(i) => write_svarint_field(buf, FIELD_SINT, *i),
        Value::UInt(u) => write_varint_field(buf, FIELD_UINT, *u),
        Value::Bool(b) => write_varint_field(buf, FIELD_BOOL, u64::from(*b)),
    }
}

fn write_svarint_field(buf: &mut Vec<u8>, field: u32, v: i64) {
    super::wire::write_key(buf, field, WIRE_VARINT);
    write_svarint(buf, v);
}

impl TryFrom<&Value> for f64 {
    type Error = PmtError;

    fn try_from(value: &Value) -> PmtResult<f64> {
        match *value {
            Value::Float(f) => Ok(f64::from(f)),
            Value::Double(d) => Ok(d),
            Value::Int(i) => Ok(i as f64),
            Value::UInt(u) => Ok(u as f64),
            _ => Err(PmtError::InvalidMvt("value is not numeric".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{decode, encode, Value};

    #[test]
    fn round_trips_every_variant() {
        for value in [
            Value::String("hello".into()),
            Value::Float(1.5),
            Value::Double(2.5),
            Value::Int(-42),
            Value::UInt(42),
            Value::Bool(true),
        ] {
            let mut buf = Vec::new();
            encode(&value, &mut buf);
            assert_eq!(decode(&buf).unwrap(), Some(value));
        }
    }

    #[test]
    fn empty_message_decodes_to_none() {
        assert_eq!(decode(&[]).unwrap(), None);
    }
}
