use std::io::Cursor;

use bytes::{Buf, BufMut};

use crate::error::PmtError;

/// Size in bytes of the fixed `PMTiles` v3 header.
pub const HEADER_SIZE: usize = 127;

/// Default maximum compressed size of the root directory (see [`crate::writer`]).
pub const DEFAULT_ROOT_MAX_BYTES: usize = 16_384;

/// `HEADER_SIZE` plus `DEFAULT_ROOT_MAX_BYTES`: the space the writer reserves up front
/// for the header and root directory before it knows their final compressed size.
pub const MAX_INITIAL_BYTES: usize = HEADER_SIZE + DEFAULT_ROOT_MAX_BYTES;

const V3_MAGIC: &[u8; 7] = b"PMTiles";
const V2_MAGIC: &[u8; 2] = b"PM";

/// Compression algorithms used for tile payloads and for metadata/directories.
#[derive(Debug, Eq, PartialEq, Copy, Clone, Hash)]
#[repr(u8)]
pub enum Compression {
    /// Compression is not specified; readers should treat this as an error for tile data.
    Unknown = 0,
    /// No compression.
    None = 1,
    /// gzip (RFC 1952).
    Gzip = 2,
    /// Brotli. This crate only supports decoding brotli, not encoding it.
    Brotli = 3,
    /// Zstandard.
    Zstd = 4,
}

impl TryFrom<u8> for Compression {
    type Error = PmtError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Compression::Unknown),
            1 => Ok(Compression::None),
            2 => Ok(Compression::Gzip),
            3 => Ok(Compression::Brotli),
            4 => Ok(Compression::Zstd),
            _ => Err(PmtError::InvalidCompression(value)),
        }
    }
}

impl From<Compression> for u8 {
    fn from(value: Compression) -> Self {
        value as u8
    }
}

/// The payload format stored in every tile of an archive.
#[derive(Debug, Eq, PartialEq, Copy, Clone, Hash)]
#[repr(u8)]
pub enum TileType {
    /// Unspecified/unknown tile content.
    Unknown = 0,
    /// Mapbox Vector Tile (protobuf).
    Mvt = 1,
    /// PNG raster tile.
    Png = 2,
    /// JPEG raster tile.
    Jpeg = 3,
    /// WebP raster tile.
    Webp = 4,
    /// AVIF raster tile.
    Avif = 5,
}

impl TryFrom<u8> for TileType {
    type Error = PmtError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TileType::Unknown),
            1 => Ok(TileType::Mvt),
            2 => Ok(TileType::Png),
            3 => Ok(TileType::Jpeg),
            4 => Ok(TileType::Webp),
            5 => Ok(TileType::Avif),
            _ => Err(PmtError::InvalidTileType(value)),
        }
    }
}

impl From<TileType> for u8 {
    fn from(value: TileType) -> Self {
        value as u8
    }
}

/// The fixed 127-byte `PMTiles` v3 header.
///
/// All multi-byte integer fields are little-endian. Longitude/latitude fields are
/// stored as signed integers in units of 1e-7 degrees, matching the on-disk layout
/// exactly so round-tripping a header never loses precision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Header {
    /// Must be 3; this crate does not read v1/v2 archives.
    pub version: u8,
    /// Byte offset of the root directory.
    pub root_offset: u64,
    /// Compressed byte length of the root directory.
    pub root_length: u64,
    /// Byte offset of the JSON metadata blob.
    pub metadata_offset: u64,
    /// Compressed byte length of the JSON metadata blob.
    pub metadata_length: u64,
    /// Byte offset of the concatenated leaf-directories section.
    pub leaf_offset: u64,
    /// Total byte length of the leaf-directories section.
    pub leaf_length: u64,
    /// Byte offset of the tile-data section.
    pub data_offset: u64,
    /// Total byte length of the tile-data section.
    pub data_length: u64,
    /// Number of tiles addressable through the directory tree (after run-length expansion).
    pub n_addressed_tiles: u64,
    /// Number of directory entries, across all directories (after run-length fusion).
    pub n_tile_entries: u64,
    /// Number of distinct tile payloads actually stored (after deduplication).
    pub n_tile_contents: u64,
    /// Whether tile ids are in strictly ascending order with no duplicated content runs skipped.
    pub clustered: bool,
    /// Compression used for the JSON metadata blob and all directories.
    pub internal_compression: Compression,
    /// Compression used for tile payloads.
    pub tile_compression: Compression,
    /// The format of the tile payloads.
    pub tile_type: TileType,
    /// Minimum zoom level present in the archive.
    pub min_zoom: u8,
    /// Maximum zoom level present in the archive.
    pub max_zoom: u8,
    /// Minimum longitude of the content bounds, in units of 1e-7 degrees.
    pub min_lon_e7: i32,
    /// Minimum latitude of the content bounds, in units of 1e-7 degrees.
    pub min_lat_e7: i32,
    /// Maximum longitude of the content bounds, in units of 1e-7 degrees.
    pub max_lon_e7: i32,
    /// Maximum latitude of the content bounds, in units of 1e-7 degrees.
    pub max_lat_e7: i32,
    /// Suggested initial zoom level for display.
    pub center_zoom: u8,
    /// Suggested initial center longitude, in units of 1e-7 degrees.
    pub center_lon_e7: i32,
    /// Suggested initial center latitude, in units of 1e-7 degrees.
    pub center_lat_e7: i32,
}

impl Header {
    /// Creates a header with sensible defaults for a brand-new archive.
    #[must_use]
    pub fn new(tile_compression: Compression, tile_type: TileType) -> Self {
        Self {
            version: 3,
            root_offset: 0,
            root_length: 0,
            metadata_offset: 0,
            metadata_length: 0,
            leaf_offset: 0,
            leaf_length: 0,
            data_offset: 0,
            data_length: 0,
            n_addressed_tiles: 0,
            n_tile_entries: 0,
            n_tile_contents: 0,
            clustered: true,
            internal_compression: Compression::Gzip,
            tile_compression,
            tile_type,
            min_zoom: 0,
            max_zoom: 0,
            min_lon_e7: -180_0000000,
            min_lat_e7: -85_0000000,
            max_lon_e7: 180_0000000,
            max_lat_e7: 85_0000000,
            center_zoom: 0,
            center_lon_e7: 0,
            center_lat_e7: 0,
        }
    }

    /// Parses a header from exactly [`HEADER_SIZE`] bytes.
    ///
    /// # Errors
    ///
    /// Returns [`PmtError::InvalidMagicNumber`] or [`PmtError::UnsupportedV2`] if the magic
    /// number does not match, [`PmtError::UnsupportedVersion`] if the version is not 3, and
    /// [`PmtError::InvalidCompression`]/[`PmtError::InvalidTileType`] for unrecognized codes.
    pub fn try_from_bytes(raw: &[u8; HEADER_SIZE]) -> Result<Self, PmtError> {
        if &raw[0..7] != V3_MAGIC {
            return if &raw[0..2] == V2_MAGIC {
                Err(PmtError::UnsupportedV2)
            } else {
                Err(PmtError::InvalidMagicNumber)
            };
        }

        let mut b = Cursor::new(&raw[7..]);
        let version = b.get_u8();
        if version != 3 {
            return Err(PmtError::UnsupportedVersion(version));
        }

        Ok(Self {
            version,
            root_offset: b.get_u64_le(),
            root_length: b.get_u64_le(),
            metadata_offset: b.get_u64_le(),
            metadata_length: b.get_u64_le(),
            leaf_offset: b.get_u64_le(),
            leaf_length: b.get_u64_le(),
            data_offset: b.get_u64_le(),
            data_length: b.get_u64_le(),
            n_addressed_tiles: b.get_u64_le(),
            n_tile_entries: b.get_u64_le(),
            n_tile_contents: b.get_u64_le(),
            clustered: b.get_u8() == 1,
            internal_compression: b.get_u8().try_into()?,
            tile_compression: b.get_u8().try_into()?,
            tile_type: b.get_u8().try_into()?,
            min_zoom: b.get_u8(),
            max_zoom: b.get_u8(),
            min_lon_e7: b.get_i32_le(),
            min_lat_e7: b.get_i32_le(),
            max_lon_e7: b.get_i32_le(),
            max_lat_e7: b.get_i32_le(),
            center_zoom: b.get_u8(),
            center_lon_e7: b.get_i32_le(),
            center_lat_e7: b.get_i32_le(),
        })
    }

    /// Serializes the header to exactly [`HEADER_SIZE`] bytes.
    pub fn write_to<W: std::io::Write>(&self, writer: &mut W) -> std::io::Result<()> {
        let mut buf = Vec::with_capacity(HEADER_SIZE);
        buf.put_slice(V3_MAGIC);
        buf.put_u8(self.version);
        buf.put_u64_le(self.root_offset);
        buf.put_u64_le(self.root_length);
        buf.put_u64_le(self.metadata_offset);
        buf.put_u64_le(self.metadata_length);
        buf.put_u64_le(self.leaf_offset);
        buf.put_u64_le(self.leaf_length);
        buf.put_u64_le(self.data_offset);
        buf.put_u64_le(self.data_length);
        buf.put_u64_le(self.n_addressed_tiles);
        buf.put_u64_le(self.n_tile_entries);
        buf.put_u64_le(self.n_tile_contents);
        buf.put_u8(u8::from(self.clustered));
        buf.put_u8(self.internal_compression.into());
        buf.put_u8(self.tile_compression.into());
        buf.put_u8(self.tile_type.into());
        buf.put_u8(self.min_zoom);
        buf.put_u8(self.max_zoom);
        buf.put_i32_le(self.min_lon_e7);
        buf.put_i32_le(self.min_lat_e7);
        buf.put_i32_le(self.max_lon_e7);
        buf.put_i32_le(self.max_lat_e7);
        buf.put_u8(self.center_zoom);
        buf.put_i32_le(self.center_lon_e7);
        buf.put_i32_le(self.center_lat_e7);
        debug_assert_eq!(buf.len(), HEADER_SIZE);
        writer.write_all(&buf)
    }

    /// Minimum longitude of the content bounds, in degrees.
    #[must_use]
    pub fn min_longitude(&self) -> f64 {
        f64::from(self.min_lon_e7) / 1e7
    }

    /// Minimum latitude of the content bounds, in degrees.
    #[must_use]
    pub fn min_latitude(&self) -> f64 {
        f64::from(self.min_lat_e7) / 1e7
    }

    /// Maximum longitude of the content bounds, in degrees.
    #[must_use]
    pub fn max_longitude(&self) -> f64 {
        f64::from(self.max_lon_e7) / 1e7
    }

    /// Maximum latitude of the content bounds, in degrees.
    #[must_use]
    pub fn max_latitude(&self) -> f64 {
        f64::from(self.max_lat_e7) / 1e7
    }

    /// Suggested initial center longitude, in degrees.
    #[must_use]
    pub fn center_longitude(&self) -> f64 {
        f64::from(self.center_lon_e7) / 1e7
    }

    /// Suggested initial center latitude, in degrees.
    #[must_use]
    pub fn center_latitude(&self) -> f64 {
        f64::from(self.center_lat_e7) / 1e7
    }
}

#[cfg(test)]
mod tests {
    use super::{Compression, Header, TileType, HEADER_SIZE};

    fn sample_header_bytes() -> [u8; HEADER_SIZE] {
        let header = Header {
            version: 3,
            root_offset: 127,
            root_length: 1000,
            metadata_offset: 1127,
            metadata_length: 50,
            leaf_offset: 0,
            leaf_length: 0,
            data_offset: 1177,
            data_length: 5000,
            n_addressed_tiles: 329,
            n_tile_entries: 329,
            n_tile_contents: 329,
            clustered: true,
            internal_compression: Compression::Gzip,
            tile_compression: Compression::Gzip,
            tile_type: TileType::Mvt,
            min_zoom: 0,
            max_zoom: 14,
            min_lon_e7: 14_123_680,
            min_lat_e7: 424_276_000,
            max_lon_e7: 17_874_810,
            max_lat_e7: 426_571_700,
            center_zoom: 10,
            center_lon_e7: 0,
            center_lat_e7: 0,
        };
        let mut buf = Vec::with_capacity(HEADER_SIZE);
        header.write_to(&mut buf).unwrap();
        buf.try_into().unwrap()
    }

    #[test]
    fn round_trips_header_fields() {
        let bytes = sample_header_bytes();
        let header = Header::try_from_bytes(&bytes).expect("valid header");

        assert_eq!(header.version, 3);
        assert_eq!(header.min_zoom, 0);
        assert_eq!(header.max_zoom, 14);
        assert_eq!(header.tile_compression, Compression::Gzip);
        assert_eq!(header.internal_compression, Compression::Gzip);
        assert_eq!(header.min_lon_e7, 14_123_680);
        assert_eq!(header.max_lon_e7, 17_874_810);
        assert_eq!(header.min_lat_e7, 424_276_000);
        assert_eq!(header.max_lat_e7, 426_571_700);
        assert_eq!(header.center_zoom, 10);
        assert_eq!(header.n_addressed_tiles, 329);
        assert_eq!(header.n_tile_entries, 329);
        assert_eq!(header.n_tile_contents, 329);
        assert!(header.clustered);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = sample_header_bytes();
        bytes[0] = b'X';
        assert!(matches!(
            Header::try_from_bytes(&bytes),
            Err(super::PmtError::InvalidMagicNumber)
        ));
    }

    #[test]
    fn rejects_v2_magic() {
        let mut bytes = sample_header_bytes();
        bytes[0..2].copy_from_slice(b"PM");
        bytes[2] = 2; // not 'Tiles...'
        assert!(matches!(
            Header::try_from_bytes(&bytes),
            Err(super::PmtError::UnsupportedV2)
        ));
    }
}
