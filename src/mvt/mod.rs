//! Mapbox Vector Tile codec: decodes/encodes the protobuf payload stored in `Mvt`-typed
//! `PMTiles` tiles.
//!
//! This hand-rolls the `vector_tile.proto` wire format directly (see [`wire`]) rather
//! than generating bindings with `prost`, since the format is small, stable, and the
//! geometry command stream needs custom assembly logic (ring orientation, polygon/hole
//! grouping) that a generated message type wouldn't provide anyway.

mod feature;
mod geometry;
mod layer;
mod value;
mod wire;

pub use feature::Feature;
pub use geometry::{Geometry, GeometryType, Polygon, Winding};
pub use layer::Layer;
pub use value::Value;

use crate::error::{PmtError, PmtResult};

const FIELD_LAYERS: u32 = 3;

/// A decoded vector tile: an ordered list of [`Layer`]s.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorTile {
    pub layers: Vec<Layer>,
}

impl VectorTile {
    /// Finds a layer by name.
    #[must_use]
    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name == name)
    }
}

/// Decodes a full vector tile payload (the bytes a [`crate::reader::PmTilesReader`]
/// returns for an `Mvt`-typed tile, already decompressed).
///
/// # Errors
///
/// Returns [`crate::error::PmtError::InvalidMvt`] if the protobuf framing or any
/// embedded layer/feature/value message is malformed.
pub fn decode_tile(bytes: &[u8]) -> PmtResult<VectorTile> {
    use std::io::Cursor;
    let mut cursor = Cursor::new(bytes);
    let mut tile = VectorTile::default();

    while let Some((field, wire_type)) = wire::read_key(&mut cursor)? {
        if field == FIELD_LAYERS {
            tile.layers.push(layer::Layer::read(wire::read_bytes(&mut cursor)?)?);
        } else {
            wire::skip_field(&mut cursor, wire_type)?;
        }
    }

    Ok(tile)
}

/// Encodes a vector tile to its protobuf wire form in a freshly allocated, growable
/// buffer.
#[must_use]
pub fn encode_tile(tile: &VectorTile) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_tile_into(tile, &mut buf);
    buf
}

/// Encodes a vector tile by appending to a caller-provided growable buffer.
pub fn encode_tile_to(tile: &VectorTile, out: &mut impl std::io::Write) -> PmtResult<()> {
    let mut buf = Vec::new();
    encode_tile_into(tile, &mut buf);
    out.write_all(&buf).map_err(PmtError::Io)
}

/// Encodes a vector tile into a fixed-size `dst`, failing fast instead of growing it.
///
/// # Errors
///
/// Returns [`PmtError::BufferTooSmall`] with the exact required size if `dst` cannot
/// hold the encoded message; the caller can retry with a buffer of that size.
pub fn encode_tile_into_fixed(tile: &VectorTile, dst: &mut [u8]) -> PmtResult<usize> {
    let mut buf = Vec::new();
    encode_tile_into(tile, &mut buf);
    if buf.len() > dst.len() {
        return Err(PmtError::BufferTooSmall { required: buf.len() });
    }
    dst[..buf.len()].copy_from_slice(&buf);
    Ok(buf.len())
}

fn encode_tile_into(tile: &VectorTile, buf: &mut Vec<u8>) {
    for layer in &tile.layers {
        let mut layer_buf = Vec::new();
        layer.write(&mut layer_buf);
        wire::write_bytes_field(buf, FIELD_LAYERS, &layer_buf);
    }
}

#[cfg(test)]
mod tests {
    use super::{decode_tile, encode_tile, encode_tile_into_fixed, Feature, Geometry, Layer, Value, VectorTile};
    use crate::error::PmtError;

    fn sample_tile() -> VectorTile {
        let mut layer = Layer::new("water");
        layer.extent = 4096;

        let geometry = Geometry::Point(vec![(2, 3)]);
        let mut tags = Vec::new();
        let key_idx = layer.intern_key("kind");
        let value_idx = layer.intern_value(&Value::String("lake".into()));
        tags.push(key_idx);
        tags.push(value_idx);

        layer.push_feature(Some(7), &geometry, tags, 0);

        VectorTile { layers: vec![layer] }
    }

    #[test]
    fn round_trips_a_tile_with_one_feature() {
        let tile = sample_tile();
        let bytes = encode_tile(&tile);
        let decoded = decode_tile(&bytes).unwrap();

        assert_eq!(decoded.layers.len(), 1);
        let layer = &decoded.layers[0];
        assert_eq!(layer.name, "water");
        assert_eq!(layer.extent, 4096);
        assert_eq!(layer.features.len(), 1);

        let feature = &layer.features[0];
        assert_eq!(feature.id(0), 7);
        assert_eq!(feature.geometry().unwrap(), Geometry::Point(vec![(2, 3)]));

        let attrs = feature.attributes(layer).unwrap();
        assert_eq!(attrs, vec![("kind", Value::String("lake".into()))]);
    }

    #[test]
    fn feature_without_id_falls_back_to_layer_position() {
        let geometry = Geometry::Point(vec![(0, 0)]);
        let feature = Feature::from_parts(None, &geometry, Vec::new(), 4096, 0);
        assert!(!feature.has_explicit_id());
        assert_eq!(feature.id(3), 3);
    }

    #[test]
    fn fixed_buffer_encode_reports_required_size_on_overflow() {
        let tile = sample_tile();
        let full = encode_tile(&tile);

        let mut tiny = [0u8; 1];
        let err = encode_tile_into_fixed(&tile, &mut tiny).unwrap_err();
        assert!(matches!(err, PmtError::BufferTooSmall { required } if required == full.len()));

        let mut exact = vec![0u8; full.len()];
        let written = encode_tile_into_fixed(&tile, &mut exact).unwrap();
        assert_eq!(written, full.len());
        assert_eq!(exact, full);
    }

    #[test]
    fn default_extent_and_version_survive_an_absent_field() {
        // A layer with only `name` set (field 1) and no extent/version fields at all.
        let mut buf = Vec::new();
        super::wire::write_string_field(&mut buf, 1, "bare");
        let layer = Layer::read(&buf).unwrap();
        assert_eq!(layer.extent, super::layer::DEFAULT_EXTENT);
        assert_eq!(layer.version, super::layer::DEFAULT_VERSION);
    }
}
