//! A single feature within an MVT layer (`vector_tile.proto`'s `Tile.Feature`).

use std::io::Cursor;

use super::geometry::{self, Geometry, GeometryType};
use super::layer::Layer;
use super::value::Value;
use super::wire::{self, read_key, WIRE_VARINT};
use crate::error::{PmtError, PmtResult};

const FIELD_ID: u32 = 1;
const FIELD_TAGS: u32 = 2;
const FIELD_TYPE: u32 = 3;
const FIELD_GEOMETRY: u32 = 4;

/// A feature's geometry and attribute tags, decoded lazily.
///
/// Geometry decoding is deferred to [`Feature::geometry`] since many consumers only
/// need a subset of a layer's features; the raw command stream is kept as-is until
/// then.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    id: Option<u64>,
    geometry_type: GeometryType,
    tags: Vec<u32>,
    geometry_commands: Vec<u32>,
}

impl Feature {
    /// This feature's id, or its position within the layer if the wire message
    /// omitted one (MVT features are not required to carry an id).
    #[must_use]
    pub fn id(&self, position_in_layer: usize) -> u64 {
        self.id.unwrap_or(position_in_layer as u64)
    }

    /// Whether the wire message carried an explicit id.
    #[must_use]
    pub fn has_explicit_id(&self) -> bool {
        self.id.is_some()
    }

    /// This feature's coarse geometry type.
    #[must_use]
    pub fn geometry_type(&self) -> GeometryType {
        self.geometry_type
    }

    /// Decodes this feature's geometry from its raw command stream.
    ///
    /// # Errors
    ///
    /// Returns [`PmtError::InvalidMvt`] if the command stream is malformed.
    pub fn geometry(&self) -> PmtResult<Geometry> {
        geometry::decode(self.geometry_type, &self.geometry_commands)
    }

    /// Resolves this feature's tags against `layer`'s interned key/value pools.
    ///
    /// A tag whose value index resolves to an absent value (an unrecognized tag type,
    /// see [`Value`]) is silently dropped rather than surfaced as an error.
    ///
    /// # Errors
    ///
    /// Returns [`PmtError::InvalidMvt`] if a tag references an out-of-range key index,
    /// or if `tags` has an odd length.
    pub fn attributes<'a>(&self, layer: &'a Layer) -> PmtResult<Vec<(&'a str, Value)>> {
        if self.tags.len() % 2 != 0 {
            return Err(PmtError::InvalidMvt("feature tags are not (key, value) pairs".into()));
        }

        let mut attrs = Vec::with_capacity(self.tags.len() / 2);
        for pair in self.tags.chunks_exact(2) {
            let key = layer
                .key(pair[0] as usize)
                .ok_or_else(|| PmtError::InvalidMvt(format!("tag references out-of-range key {}", pair[0])))?;
            if let Some(value) = layer.value(pair[1] as usize) {
                attrs.push((key, value.clone()));
            }
        }
        Ok(attrs)
    }

    pub(crate) fn read(bytes: &[u8]) -> PmtResult<Self> {
        let mut cursor = Cursor::new(bytes);
        let mut id = None;
        let mut tags = Vec::new();
        let mut geometry_type = GeometryType::Unknown;
        let mut geometry_commands = Vec::new();

        while let Some((field, wire_type)) = read_key(&mut cursor)? {
            match field {
                FIELD_ID => id = Some(wire::read_varint(&mut cursor)?),
                FIELD_TAGS => wire::read_packed_varints(&mut cursor, &mut tags)?,
                FIELD_TYPE => geometry_type = GeometryType::from(wire::read_varint(&mut cursor)?),
                FIELD_GEOMETRY => wire::read_packed_varints(&mut cursor, &mut geometry_commands)?,
                _ => wire::skip_field(&mut cursor, wire_type)?,
            }
        }

        Ok(Self {
            id,
            geometry_type,
            tags,
            geometry_commands,
        })
    }

    /// Builds a feature from a decoded geometry, quantizing its coordinates into
    /// `[-buffer, extent+buffer]` as they're packed into the command stream.
    pub(crate) fn from_parts(id: Option<u64>, geometry: &Geometry, tags: Vec<u32>, extent: u32, buffer: u32) -> Self {
        let geometry_type = match geometry {
            Geometry::Point(_) => GeometryType::Point,
            Geometry::LineString(_) => GeometryType::LineString,
            Geometry::Polygon(_) => GeometryType::Polygon,
        };
        Self {
            id,
            geometry_type,
            tags,
            geometry_commands: geometry::encode(geometry, extent, buffer),
        }
    }

    pub(crate) fn write(&self, buf: &mut Vec<u8>) {
        if let Some(id) = self.id {
            wire::write_varint_field(buf, FIELD_ID, id);
        }
        wire::write_packed_varints_field(buf, FIELD_TAGS, &self.tags);
        if self.geometry_type != GeometryType::Unknown {
            wire::write_key(buf, FIELD_TYPE, WIRE_VARINT);
            wire::write_varint(buf, self.geometry_type as u64);
        }
        wire::write_packed_varints_field(buf, FIELD_GEOMETRY, &self.geometry_commands);
    }
}
