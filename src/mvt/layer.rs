//! A single layer within a vector tile (`vector_tile.proto`'s `Tile.Layer`).

use std::io::Cursor;

use super::feature::Feature;
use super::geometry::Geometry;
use super::value::{self, Value};
use super::wire::{self, read_key};
use crate::error::{PmtError, PmtResult};

const FIELD_NAME: u32 = 1;
const FIELD_FEATURES: u32 = 2;
const FIELD_KEYS: u32 = 3;
const FIELD_VALUES: u32 = 4;
const FIELD_EXTENT: u32 = 5;
const FIELD_VERSION: u32 = 15;

/// Default value of a layer's `extent` field when the wire message omits it.
pub const DEFAULT_EXTENT: u32 = 4096;

/// Default value of a layer's `version` field when the wire message omits it.
pub const DEFAULT_VERSION: u32 = 1;

/// A named collection of features sharing one interned key/value pool.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub name: String,
    pub version: u32,
    pub extent: u32,
    pub(crate) keys: Vec<String>,
    pub(crate) values: Vec<Option<Value>>,
    pub features: Vec<Feature>,
}

impl Layer {
    /// Creates an empty layer.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: DEFAULT_VERSION,
            extent: DEFAULT_EXTENT,
            keys: Vec::new(),
            values: Vec::new(),
            features: Vec::new(),
        }
    }

    #[must_use]
    pub fn key(&self, index: usize) -> Option<&str> {
        self.keys.get(index).map(String::as_str)
    }

    /// Returns the interned value at `index`, or `None` if the index is out of range
    /// or the value's wire message carried no recognized field (an absent tag type).
    #[must_use]
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)?.as_ref()
    }

    /// Interns `key`, returning its index, inserting it if not already present.
    pub(crate) fn intern_key(&mut self, key: &str) -> u32 {
        if let Some(pos) = self.keys.iter().position(|k| k == key) {
            return pos as u32;
        }
        self.keys.push(key.to_string());
        (self.keys.len() - 1) as u32
    }

    /// Builds a feature from a decoded geometry and interned tags, and appends it to
    /// this layer's feature list. `buffer` widens the quantization range beyond this
    /// layer's `extent` (see [`crate::mvt::geometry::encode`]).
    pub fn push_feature(&mut self, id: Option<u64>, geometry: &Geometry, tags: Vec<u32>, buffer: u32) {
        self.features.push(Feature::from_parts(id, geometry, tags, self.extent, buffer));
    }

    /// Interns `value`, returning its index, inserting it if not already present.
    pub(crate) fn intern_value(&mut self, value: &Value) -> u32 {
        if let Some(pos) = self.values.iter().position(|v| v.as_ref() == Some(value)) {
            return pos as u32;
        }
        self.values.push(Some(value.clone()));
        (self.values.len() - 1) as u32
    }

    pub(crate) fn read(bytes: &[u8]) -> PmtResult<Self> {
        let mut cursor = Cursor::new(bytes);
        let mut layer = Layer {
            name: String::new(),
            version: DEFAULT_VERSION,
            extent: DEFAULT_EXTENT,
            keys: Vec::new(),
            values: Vec::new(),
            features: Vec::new(),
        };
        let mut saw_name = false;

        while let Some((field, wire_type)) = read_key(&mut cursor)? {
            match field {
                FIELD_NAME => {
                    layer.name = wire::read_string(&mut cursor)?;
                    saw_name = true;
                }
                FIELD_FEATURES => layer.features.push(Feature::read(wire::read_bytes(&mut cursor)?)?),
                FIELD_KEYS => layer.keys.push(wire::read_string(&mut cursor)?),
                FIELD_VALUES => {
                    let raw = wire::read_bytes(&mut cursor)?;
                    layer.values.push(value::decode(raw)?);
                }
                FIELD_EXTENT => layer.extent = wire::read_varint(&mut cursor)? as u32,
                FIELD_VERSION => layer.version = wire::read_varint(&mut cursor)? as u32,
                _ => wire::skip_field(&mut cursor, wire_type)?,
            }
        }

        if !saw_name {
            return Err(PmtError::InvalidMvt("layer is missing its name field".into()));
        }

        Ok(layer)
    }

    pub(crate) fn write(&self, buf: &mut Vec<u8>) {
        wire::write_varint_field(buf, FIELD_VERSION, u64::from(self.version));
        wire::write_string_field(buf, FIELD_NAME, &self.name);

        for feature in &self.features {
            let mut feature_buf = Vec::new();
            feature.write(&mut feature_buf);
            wire::write_bytes_field(buf, FIELD_FEATURES, &feature_buf);
        }
        for key in &self.keys {
            wire::write_string_field(buf, FIELD_KEYS, key);
        }
        for value in &self.values {
            let mut value_buf = Vec::new();
            if let Some(value) = value {
                value::encode(value, &mut value_buf);
            }
            wire::write_bytes_field(buf, FIELD_VALUES, &value_buf);
        }
        wire::write_varint_field(buf, FIELD_EXTENT, u64::from(self.extent));
    }
}
