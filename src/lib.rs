//! A synchronous reader and writer for the `PMTiles` v3 archive format, a random-access
//! pyramid of map tiles addressed by a Hilbert curve and stored alongside a compact
//! directory index, plus a codec for the Mapbox Vector Tile payloads such archives
//! commonly carry.
//!
//! The reader is transport-agnostic: anything implementing [`range::RangeReader`] (a
//! local file, an HTTP range request, an `object_store` backend, or a plain in-memory
//! buffer) can back a [`reader::PmTilesReader`]. [`writer::PmTilesWriter`] streams a new
//! archive to any [`std::io::Write`] + [`std::io::Seek`] sink in a single pass. The
//! [`mvt`] module decodes and encodes the vector-tile protobuf format independently of
//! the archive layer.

mod cache;
mod compression;
mod directory;
mod error;
mod header;
pub mod mvt;
pub mod range;
mod reader;
mod tile;
mod writer;

pub use cache::{DirCacheResult, DirectoryCache, HashMapCache, LruDirectoryCache, NoCache};
pub use directory::{DirEntry, Directory};
pub use error::{ErrorKind, PmtError, PmtResult};
pub use header::{Compression, Header, TileType, DEFAULT_ROOT_MAX_BYTES, HEADER_SIZE};
pub use reader::PmTilesReader;
pub use tile::{id_to_zxy, zxy_to_id, TileCoord, MAX_ZOOM};
pub use writer::{PmTilesStreamWriter, PmTilesWriter, ProgressCallback};
