//! Streaming writer that encodes tiles into a valid `PMTiles` v3 archive in one pass.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::BuildHasherDefault;
use std::io::{BufWriter, Seek, Write};

use countio::Counter;
use twox_hash::XxHash3_64;

use crate::compression;
use crate::directory::{DirEntry, Directory};
use crate::header::{Header, Compression, TileType, DEFAULT_ROOT_MAX_BYTES, MAX_INITIAL_BYTES};
use crate::error::{PmtError, PmtResult};
use crate::tile::TileCoord;

/// Callback consulted between tile emissions. Returning `true` requests cancellation.
pub type ProgressCallback = Box<dyn FnMut(f64) -> bool + Send>;

struct TileContentLocation {
    offset: u64,
    length: u32,
}

/// Builder for a new `PMTiles` archive.
pub struct PmTilesWriter {
    header: Header,
    metadata: String,
    root_max_bytes: usize,
    expected_tiles: Option<u64>,
    progress: Option<ProgressCallback>,
}

/// Streaming `PMTiles` writer: accepts tiles in ascending tile-id order and produces a
/// complete archive on [`PmTilesStreamWriter::finalize`].
pub struct PmTilesStreamWriter<W: Write + Seek> {
    out: Counter<BufWriter<W>>,
    header: Header,
    entries: Vec<DirEntry>,
    root_max_bytes: usize,
    expected_tiles: Option<u64>,
    progress: Option<ProgressCallback>,

    n_addressed_tiles: u64,
    n_tile_entries: u64,

    tile_content_map: HashMap<u64, TileContentLocation, BuildHasherDefault<XxHash3_64>>,
    prev_tile_hash: Option<u64>,
    prev_written_tile_offset: u64,
}

fn write_compressed_counted<W: Write>(
    data: &[u8],
    writer: &mut Counter<W>,
    compression: Compression,
) -> PmtResult<usize> {
    let pos = writer.writer_bytes();
    compression::compress_into(compression, writer, |w| w.write_all(data))?;
    Ok(writer.writer_bytes() - pos)
}

fn into_u32(v: usize) -> PmtResult<u32> {
    v.try_into().map_err(|_| PmtError::IndexEntryOverflow)
}

impl PmTilesWriter {
    /// Creates a writer with sensible defaults for `tile_type`.
    #[must_use]
    pub fn new(tile_type: TileType) -> Self {
        let tile_compression = match tile_type {
            TileType::Mvt => Compression::Gzip,
            _ => Compression::None,
        };
        Self {
            header: Header::new(tile_compression, tile_type),
            metadata: "{}".to_string(),
            root_max_bytes: DEFAULT_ROOT_MAX_BYTES,
            expected_tiles: None,
            progress: None,
        }
    }

    /// Sets the compression used for metadata and directories.
    #[must_use]
    pub fn internal_compression(mut self, compression: Compression) -> Self {
        self.header.internal_compression = compression;
        self
    }

    /// Sets the compression used for tile payloads added via [`PmTilesStreamWriter::add_tile`].
    #[must_use]
    pub fn tile_compression(mut self, compression: Compression) -> Self {
        self.header.tile_compression = compression;
        self
    }

    /// Sets the minimum zoom level present in the archive.
    #[must_use]
    pub fn min_zoom(mut self, level: u8) -> Self {
        self.header.min_zoom = level;
        self
    }

    /// Sets the maximum zoom level present in the archive.
    #[must_use]
    pub fn max_zoom(mut self, level: u8) -> Self {
        self.header.max_zoom = level;
        self
    }

    /// Sets the content bounds, in degrees.
    #[must_use]
    pub fn bounds(mut self, min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        self.header.min_lon_e7 = (min_lon * 1e7) as i32;
        self.header.min_lat_e7 = (min_lat * 1e7) as i32;
        self.header.max_lon_e7 = (max_lon * 1e7) as i32;
        self.header.max_lat_e7 = (max_lat * 1e7) as i32;
        self
    }

    /// Sets the suggested initial display zoom.
    #[must_use]
    pub fn center_zoom(mut self, level: u8) -> Self {
        self.header.center_zoom = level;
        self
    }

    /// Sets the suggested initial center, in degrees.
    #[must_use]
    pub fn center(mut self, lon: f64, lat: f64) -> Self {
        self.header.center_lon_e7 = (lon * 1e7) as i32;
        self.header.center_lat_e7 = (lat * 1e7) as i32;
        self
    }

    /// Sets the raw JSON metadata string.
    #[must_use]
    pub fn metadata(mut self, metadata: &str) -> Self {
        self.metadata = metadata.to_string();
        self
    }

    /// Overrides the default root-directory size budget (16 384 bytes).
    #[must_use]
    pub fn root_max_bytes(mut self, max_bytes: usize) -> Self {
        self.root_max_bytes = max_bytes;
        self
    }

    /// Declares the expected total number of tiles, used only to compute progress
    /// fractions; the writer functions correctly without it.
    #[must_use]
    pub fn expected_tiles(mut self, total: u64) -> Self {
        self.expected_tiles = Some(total);
        self
    }

    /// Registers a callback consulted between tile emissions. It receives a
    /// monotonically increasing progress fraction in `[0, 1]` (`0.0` if
    /// [`Self::expected_tiles`] was never set) and returns `true` to cancel the write.
    #[must_use]
    pub fn on_progress(mut self, callback: impl FnMut(f64) -> bool + Send + 'static) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Begins writing to `writer`, which must support seeking (the header and root
    /// directory are rewritten once their final size is known).
    ///
    /// # Errors
    ///
    /// Propagates I/O errors from reserving the header/metadata space.
    pub fn create<W: Write + Seek>(self, writer: W) -> PmtResult<PmTilesStreamWriter<W>> {
        let mut out = Counter::new(BufWriter::new(writer));

        // Layout: | Header | Root Directory | Metadata | Tile Data | Leaf Directories |
        // Reserving the header + root-directory budget up front lets us write tile data
        // immediately without buffering it, at the cost of a final rewind-and-rewrite.
        out.write_all(&[0u8; MAX_INITIAL_BYTES])?;

        let metadata_length =
            write_compressed_counted(self.metadata.as_bytes(), &mut out, self.header.internal_compression)?
                as u64;

        let mut stream_writer = PmTilesStreamWriter {
            out,
            header: self.header,
            entries: Vec::new(),
            root_max_bytes: self.root_max_bytes,
            expected_tiles: self.expected_tiles,
            progress: self.progress,
            n_addressed_tiles: 0,
            n_tile_entries: 0,
            tile_content_map: HashMap::default(),
            prev_tile_hash: None,
            prev_written_tile_offset: 0,
        };
        stream_writer.header.metadata_length = metadata_length;
        stream_writer.header.data_offset = MAX_INITIAL_BYTES as u64 + metadata_length;

        Ok(stream_writer)
    }
}

impl<W: Write + Seek> PmTilesStreamWriter<W> {
    /// Adds a tile, compressing it with the archive's configured tile compression.
    ///
    /// Identical consecutive payloads are run-length fused; identical payloads
    /// anywhere in the stream are deduplicated by content hash.
    ///
    /// # Errors
    ///
    /// Returns [`PmtError::InvalidArgument`] if `coord.to_id()` is not strictly greater
    /// than every previously added tile id. Returns [`PmtError::Cancelled`] if the
    /// progress observer requested cancellation.
    pub fn add_tile(&mut self, coord: TileCoord, data: &[u8]) -> PmtResult<()> {
        let compression = self.header.tile_compression;
        self.add_tile_by_id(coord.to_id(), data, compression)
    }

    /// Adds a tile whose bytes are already compressed exactly as the reader will expect.
    ///
    /// # Errors
    ///
    /// Same as [`Self::add_tile`].
    pub fn add_raw_tile(&mut self, coord: TileCoord, data: &[u8]) -> PmtResult<()> {
        self.add_tile_by_id(coord.to_id(), data, Compression::None)
    }

    fn add_tile_by_id(&mut self, tile_id: u64, data: &[u8], tile_compression: Compression) -> PmtResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        if let Some(last) = self.entries.last() {
            let covered_through = last.tile_id + u64::from(last.run_length.max(1));
            if tile_id < covered_through {
                return Err(PmtError::InvalidArgument(format!(
                    "tile id {tile_id} is out of order: the last tile id added was {}",
                    last.tile_id
                )));
            }
        }

        let tile_hash = XxHash3_64::oneshot(data);
        self.n_addressed_tiles += 1;

        if let Some(last) = self.entries.last_mut() {
            if self.prev_tile_hash == Some(tile_hash) && tile_id == last.tile_id + u64::from(last.run_length) {
                last.run_length += 1;
                return self.tick_progress();
            }
        }

        let loc = match self.tile_content_map.entry(tile_hash) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let offset = self.prev_written_tile_offset;
                let len = write_compressed_counted(data, &mut self.out, tile_compression)?;
                self.prev_written_tile_offset += len as u64;
                e.insert(TileContentLocation {
                    offset,
                    length: into_u32(len)?,
                })
            }
        };

        self.prev_tile_hash = Some(tile_hash);
        self.n_tile_entries += 1;
        self.entries.push(DirEntry {
            tile_id,
            offset: loc.offset,
            length: loc.length,
            run_length: 1,
        });

        self.tick_progress()
    }

    fn tick_progress(&mut self) -> PmtResult<()> {
        let Some(callback) = self.progress.as_mut() else {
            return Ok(());
        };
        let fraction = self
            .expected_tiles
            .map_or(0.0, |total| (self.n_addressed_tiles as f64 / total as f64).min(1.0));
        if callback(fraction) {
            return Err(PmtError::Cancelled);
        }
        Ok(())
    }

    /// Builds root and (if needed) leaf directories from the accumulated entries,
    /// writing any leaves to the output and recording their section in the header.
    fn build_directories(&mut self) -> PmtResult<Directory> {
        let (root_dir, leaf_dirs) = self.optimize_directories(self.root_max_bytes)?;

        if !leaf_dirs.is_empty() {
            self.header.leaf_offset = self.out.writer_bytes() as u64;
        }

        let mut leaves_bytes = 0usize;
        for leaf in &leaf_dirs {
            let pos = self.out.writer_bytes();
            leaf.write_compressed_to(&mut self.out, self.header.internal_compression)?;
            leaves_bytes += self.out.writer_bytes() - pos;
        }
        self.header.leaf_length = leaves_bytes as u64;

        Ok(root_dir)
    }

    /// Finds the smallest leaf size (via exponential widening) that packs all entries
    /// into leaves whose root-of-pointers fits `target_root_len` once compressed.
    fn optimize_directories(&mut self, target_root_len: usize) -> PmtResult<(Directory, Vec<Directory>)> {
        // Case 1: the whole entry list fits in the root directly, no leaves needed.
        if self.entries.len() < 16_384 {
            let root_dir = Directory::from_entries(std::mem::take(&mut self.entries));
            let root_bytes = root_dir.compressed_size(self.header.internal_compression)?;
            if root_bytes <= target_root_len {
                return Ok((root_dir, vec![]));
            }
            self.entries = root_dir.entries;
        }

        // Case 2: root directory is leaf pointers only; widen the leaf size until the
        // root of pointers fits the budget. Halts for any valid input since leaf_size
        // grows without bound while entries.len() is fixed.
        let mut leaf_size = (self.entries.len() / 3500).max(4096);
        loop {
            let (root_dir, leaf_dirs) = self.build_roots_leaves(leaf_size)?;
            let root_bytes = root_dir.compressed_size(self.header.internal_compression)?;
            if root_bytes <= target_root_len {
                return Ok((root_dir, leaf_dirs));
            }
            leaf_size += leaf_size / 5;
        }
    }

    fn build_roots_leaves(&self, leaf_size: usize) -> PmtResult<(Directory, Vec<Directory>)> {
        let mut root_dir = Directory::with_capacity(self.entries.len().div_ceil(leaf_size));
        let mut leaves = Vec::with_capacity(self.entries.len().div_ceil(leaf_size));
        let mut offset = 0u64;

        for chunk in self.entries.chunks(leaf_size) {
            let leaf = Directory::from_entries(chunk.to_vec());
            let leaf_bytes = leaf.compressed_size(self.header.internal_compression)?;
            leaves.push(leaf);

            root_dir.push(DirEntry {
                tile_id: chunk[0].tile_id,
                offset,
                length: into_u32(leaf_bytes)?,
                run_length: 0,
            });
            offset += leaf_bytes as u64;
        }

        Ok((root_dir, leaves))
    }

    /// Finishes the archive: builds and writes directories, then rewinds to write the
    /// final header and root directory.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors from the output sink and compression errors from
    /// serializing the directories.
    pub fn finalize(mut self) -> PmtResult<()> {
        self.header.data_length =
            self.out.writer_bytes() as u64 - MAX_INITIAL_BYTES as u64 - self.header.metadata_length;

        let root_dir = self.build_directories()?;

        self.header.n_addressed_tiles = self.n_addressed_tiles;
        self.header.n_tile_contents = self.tile_content_map.len() as u64;
        self.header.n_tile_entries = self.n_tile_entries;

        let mut root_dir_buf = Vec::new();
        compression::compress_into(self.header.internal_compression, &mut root_dir_buf, |w| {
            root_dir.write_to(w)
        })?;
        self.header.root_length = root_dir_buf.len() as u64;

        self.out.rewind()?;
        self.header.write_to(&mut self.out)?;
        self.out.write_all(&root_dir_buf)?;
        self.out.flush()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::PmTilesWriter;
    use crate::header::{Compression, TileType};
    use crate::tile::TileCoord;

    #[test]
    fn dedup_counts_unique_contents() {
        let mut writer = PmTilesWriter::new(TileType::Png)
            .internal_compression(Compression::None)
            .min_zoom(0)
            .max_zoom(1)
            .create(Cursor::new(Vec::new()))
            .unwrap();

        writer.add_tile(TileCoord::new(0, 0, 0).unwrap(), b"A").unwrap();
        writer.add_tile(TileCoord::new(1, 0, 0).unwrap(), b"B").unwrap();
        writer.add_tile(TileCoord::new(1, 0, 1).unwrap(), b"A").unwrap();
        writer.finalize().unwrap();
    }

    #[test]
    fn run_length_fuses_identical_consecutive_tiles() {
        let mut writer = PmTilesWriter::new(TileType::Png)
            .internal_compression(Compression::None)
            .create(Cursor::new(Vec::new()))
            .unwrap();

        for x in 0..4u64 {
            writer.add_tile(TileCoord::new(2, x, 0).unwrap(), b"X").unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn out_of_order_tile_id_is_rejected() {
        let mut writer = PmTilesWriter::new(TileType::Png)
            .create(Cursor::new(Vec::new()))
            .unwrap();

        writer.add_tile(TileCoord::new(2, 0, 0).unwrap(), b"a").unwrap();
        let result = writer.add_tile(TileCoord::new(0, 0, 0).unwrap(), b"b");
        assert!(result.is_err());
    }

    #[test]
    fn cancellation_from_progress_observer_aborts() {
        let mut writer = PmTilesWriter::new(TileType::Png)
            .expected_tiles(10)
            .on_progress(|_fraction| true)
            .create(Cursor::new(Vec::new()))
            .unwrap();

        let result = writer.add_tile(TileCoord::new(0, 0, 0).unwrap(), b"a");
        assert!(matches!(result, Err(crate::error::PmtError::Cancelled)));
    }

    #[test]
    fn round_trips_through_reader() {
        use crate::range::InMemoryRangeReader;
        use crate::reader::PmTilesReader;

        let mut buf = Cursor::new(Vec::new());
        let mut writer = PmTilesWriter::new(TileType::Png)
            .internal_compression(Compression::None)
            .tile_compression(Compression::None)
            .create(&mut buf)
            .unwrap();
        writer.add_tile(TileCoord::new(0, 0, 0).unwrap(), b"hello").unwrap();
        writer.finalize().unwrap();

        let reader = PmTilesReader::try_from_source(InMemoryRangeReader::from(buf.into_inner())).unwrap();
        let tile = reader.get_tile(TileCoord::new(0, 0, 0).unwrap()).unwrap();
        assert_eq!(tile.as_deref(), Some(&b"hello"[..]));
    }
}
