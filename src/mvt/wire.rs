//! Low-level protobuf primitives shared by the MVT reader and writer.
//!
//! This hand-rolls just enough of the wire format (varints, packed repeated fields,
//! fixed32/fixed64, length-delimited submessages) to read and write `vector_tile.proto`
//! messages, rather than depending on `prost` and a build-time `.proto` compile step.

use std::io::Cursor;

use varint_rs::{VarintReader, VarintWriter};

use crate::error::{PmtError, PmtResult};

/// Protobuf wire types used by `vector_tile.proto`.
pub(crate) const WIRE_VARINT: u8 = 0;
pub(crate) const WIRE_FIXED64: u8 = 1;
pub(crate) const WIRE_LENGTH_DELIMITED: u8 = 2;
pub(crate) const WIRE_FIXED32: u8 = 5;

fn invalid(msg: impl Into<String>) -> PmtError {
    PmtError::InvalidMvt(msg.into())
}

/// Reads a `(field_number, wire_type)` pair, or `None` if `cursor` is exhausted.
pub(crate) fn read_key(cursor: &mut Cursor<&[u8]>) -> PmtResult<Option<(u32, u8)>> {
    if (cursor.position() as usize) >= cursor.get_ref().len() {
        return Ok(None);
    }
    let tag = cursor
        .read_u32_varint()
        .map_err(|_| invalid("truncated field key"))?;
    Ok(Some((tag >> 3, (tag & 0x7) as u8)))
}

pub(crate) fn read_varint(cursor: &mut Cursor<&[u8]>) -> PmtResult<u64> {
    cursor.read_u64_varint().map_err(|_| invalid("truncated varint"))
}

/// Decodes a zig-zag-encoded signed integer, per `vector_tile.proto`'s `sint32`/`sint64`
/// fields and the geometry command stream's coordinate deltas.
pub(crate) fn zigzag_decode(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

/// Encodes a signed integer in zig-zag form.
pub(crate) fn zigzag_encode(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

pub(crate) fn read_svarint(cursor: &mut Cursor<&[u8]>) -> PmtResult<i64> {
    Ok(zigzag_decode(read_varint(cursor)?))
}

pub(crate) fn read_f32(cursor: &mut Cursor<&[u8]>) -> PmtResult<f32> {
    let pos = cursor.position() as usize;
    let bytes = cursor
        .get_ref()
        .get(pos..pos + 4)
        .ok_or_else(|| invalid("truncated fixed32"))?;
    cursor.set_position((pos + 4) as u64);
    Ok(f32::from_le_bytes(bytes.try_into().expect("slice is 4 bytes")))
}

pub(crate) fn read_f64(cursor: &mut Cursor<&[u8]>) -> PmtResult<f64> {
    let pos = cursor.position() as usize;
    let bytes = cursor
        .get_ref()
        .get(pos..pos + 8)
        .ok_or_else(|| invalid("truncated fixed64"))?;
    cursor.set_position((pos + 8) as u64);
    Ok(f64::from_le_bytes(bytes.try_into().expect("slice is 8 bytes")))
}

/// Reads a length-delimited field's raw bytes (a string or an embedded message).
pub(crate) fn read_bytes<'a>(cursor: &mut Cursor<&'a [u8]>) -> PmtResult<&'a [u8]> {
    let len = read_varint(cursor)? as usize;
    let pos = cursor.position() as usize;
    let bytes = cursor
        .get_ref()
        .get(pos..pos + len)
        .ok_or_else(|| invalid("length-delimited field overruns buffer"))?;
    cursor.set_position((pos + len) as u64);
    Ok(bytes)
}

pub(crate) fn read_string(cursor: &mut Cursor<&[u8]>) -> PmtResult<String> {
    let bytes = read_bytes(cursor)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| invalid("string field is not valid UTF-8"))
}

/// Reads a packed repeated varint field's contents into `out`.
pub(crate) fn read_packed_varints(cursor: &mut Cursor<&[u8]>, out: &mut Vec<u32>) -> PmtResult<()> {
    let bytes = read_bytes(cursor)?;
    let mut sub = Cursor::new(bytes);
    while (sub.position() as usize) < bytes.len() {
        out.push(read_varint(&mut sub)? as u32);
    }
    Ok(())
}

/// Skips a field's value given its wire type, used when an unrecognized field number
/// is encountered (forward compatibility with future `vector_tile.proto` revisions).
pub(crate) fn skip_field(cursor: &mut Cursor<&[u8]>, wire_type: u8) -> PmtResult<()> {
    match wire_type {
        WIRE_VARINT => {
            read_varint(cursor)?;
        }
        WIRE_FIXED64 => {
            let pos = cursor.position();
            cursor.set_position(pos + 8);
        }
        WIRE_LENGTH_DELIMITED => {
            read_bytes(cursor)?;
        }
        WIRE_FIXED32 => {
            let pos = cursor.position();
            cursor.set_position(pos + 4);
        }
        other => return Err(invalid(format!("unsupported wire type {other}"))),
    }
    Ok(())
}

pub(crate) fn write_key(buf: &mut Vec<u8>, field: u32, wire_type: u8) {
    let tag = u64::from((field << 3) | u32::from(wire_type));
    buf.write_u64_varint(tag).expect("Vec<u8> writes are infallible");
}

pub(crate) fn write_varint(buf: &mut Vec<u8>, v: u64) {
    buf.write_u64_varint(v).expect("Vec<u8> writes are infallible");
}

pub(crate) fn write_svarint(buf: &mut Vec<u8>, v: i64) {
    write_varint(buf, zigzag_encode(v));
}

pub(crate) fn write_string_field(buf: &mut Vec<u8>, field: u32, s: &str) {
    write_key(buf, field, WIRE_LENGTH_DELIMITED);
    write_varint(buf, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

pub(crate) fn write_bytes_field(buf: &mut Vec<u8>, field: u32, bytes: &[u8]) {
    write_key(buf, field, WIRE_LENGTH_DELIMITED);
    write_varint(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

pub(crate) fn write_varint_field(buf: &mut Vec<u8>, field: u32, v: u64) {
    write_key(buf, field, WIRE_VARINT);
    write_varint(buf, v);
}

pub(crate) fn write_f32(buf: &mut Vec<u8>, field: u32, v: f32) {
    write_key(buf, field, WIRE_FIXED32);
    buf.extend_from_slice(&v.to_le_bytes());
}

pub(crate) fn write_f64(buf: &mut Vec<u8>, field: u32, v: f64) {
    write_key(buf, field, WIRE_FIXED64);
    buf.extend_from_slice(&v.to_le_bytes());
}

/// Writes a non-empty packed-repeated-varint field; per proto3 semantics an empty
/// packed field is simply omitted.
pub(crate) fn write_packed_varints_field(buf: &mut Vec<u8>, field: u32, values: &[u32]) {
    if values.is_empty() {
        return;
    }
    let mut payload = Vec::new();
    for &v in values {
        write_varint(&mut payload, u64::from(v));
    }
    write_bytes_field(buf, field, &payload);
}

#[cfg(test)]
mod tests {
    use super::{read_key, read_varint, write_key, write_varint, zigzag_decode, zigzag_encode};
    use std::io::Cursor;

    #[test]
    fn zigzag_round_trips() {
        for v in [-5i64, -1, 0, 1, 5, i32::MIN as i64, i32::MAX as i64] {
            assert_eq!(zigzag_decode(zigzag_encode(v)), v);
        }
    }

    #[test]
    fn key_round_trips() {
        let mut buf = Vec::new();
        write_key(&mut buf, 3, 2);
        let mut cursor = Cursor::new(buf.as_slice());
        assert_eq!(read_key(&mut cursor).unwrap(), Some((3, 2)));
    }

    #[test]
    fn varint_round_trips() {
        let mut buf = Vec::new();
        write_varint(&mut buf, 300);
        let mut cursor = Cursor::new(buf.as_slice());
        assert_eq!(read_varint(&mut cursor).unwrap(), 300);
    }
}
