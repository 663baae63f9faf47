//! Resolves `(z, x, y)` tile coordinates to decompressed tile bytes over a [`RangeReader`].

use bytes::Bytes;

use crate::cache::{DirectoryCache, NoCache};
use crate::compression;
use crate::directory::{DirEntry, Directory};
use crate::error::{PmtError, PmtResult};
use crate::header::{Header, HEADER_SIZE};
use crate::range::RangeReader;
use crate::tile::{zxy_to_id, TileCoord, TZ};

/// Directory trees produced by this crate's writer never nest more than two levels
/// deep; anything beyond a generous margin of that indicates a corrupt or adversarial
/// archive, not legitimate leaf-of-leaf structure.
const MAX_DIRECTORY_DEPTH: u32 = 8;

/// A `PMTiles` v3 archive reader over any [`RangeReader`].
///
/// Construction reads the header and root directory once; everything else (leaf
/// directories, tile bytes) is fetched lazily and, for leaf directories, cached in `C`.
/// All lookup methods are safe to call concurrently.
pub struct PmTilesReader<R: RangeReader, C: DirectoryCache = NoCache> {
    source: R,
    header: Header,
    root_directory: Directory,
    cache: C,
}

impl<R: RangeReader> PmTilesReader<R, NoCache> {
    /// Opens an archive with no directory caching.
    ///
    /// # Errors
    ///
    /// Returns [`PmtError::InvalidFormat`]-classified errors if the header or root
    /// directory cannot be parsed, or a transport error if the underlying reads fail.
    pub fn try_from_source(source: R) -> PmtResult<Self> {
        Self::try_from_cached_source(source, NoCache)
    }
}

impl<R: RangeReader, C: DirectoryCache> PmTilesReader<R, C> {
    /// Opens an archive, caching leaf directories in `cache`.
    ///
    /// # Errors
    ///
    /// Returns [`PmtError::InvalidFormat`]-classified errors if the header or root
    /// directory cannot be parsed, or a transport error if the underlying reads fail.
    pub fn try_from_cached_source(source: R, cache: C) -> PmtResult<Self> {
        let header_bytes = source.read(0, HEADER_SIZE as u32)?;
        let header_bytes: [u8; HEADER_SIZE] = header_bytes.as_ref().try_into().map_err(|_| {
            PmtError::InvalidHeader(format!(
                "expected {HEADER_SIZE} header bytes, source returned {}",
                header_bytes.len()
            ))
        })?;
        let header = Header::try_from_bytes(&header_bytes)?;

        let root_length = u32::try_from(header.root_length).map_err(|_| PmtError::IndexEntryOverflow)?;
        let root_raw = source.read(header.root_offset, root_length)?;
        let root_decompressed = compression::decompress(header.internal_compression, &root_raw)?;
        let root_directory = Directory::try_from(Bytes::from(root_decompressed))?;

        Ok(Self {
            source,
            header,
            root_directory,
            cache,
        })
    }

    /// The parsed archive header.
    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The raw (decompressed) JSON metadata bytes.
    ///
    /// # Errors
    ///
    /// Propagates transport and decompression errors.
    pub fn metadata_bytes(&self) -> PmtResult<Vec<u8>> {
        let length =
            u32::try_from(self.header.metadata_length).map_err(|_| PmtError::IndexEntryOverflow)?;
        let raw = self.source.read(self.header.metadata_offset, length)?;
        compression::decompress(self.header.internal_compression, &raw)
    }

    /// The JSON metadata, decoded as UTF-8.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::metadata_bytes`]'s errors, plus [`PmtError::Utf8`] if the
    /// bytes are not valid UTF-8.
    pub fn metadata(&self) -> PmtResult<String> {
        Ok(String::from_utf8(self.metadata_bytes()?)?)
    }

    /// Resolves `coord` to its decompressed tile bytes, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`PmtError::InvalidArgument`] if `coord`'s zoom exceeds
    /// [`crate::tile::MAX_ZOOM`] or its `x`/`y` are out of range for that zoom;
    /// propagates transport/format errors encountered while resolving leaf directories.
    pub fn get_tile(&self, coord: TileCoord) -> PmtResult<Option<Bytes>> {
        self.get_tile_by_id(coord.to_id())
    }

    /// Resolves a raw tile id to its decompressed tile bytes, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Propagates transport/format errors encountered while resolving leaf directories.
    pub fn get_tile_by_id(&self, tile_id: u64) -> PmtResult<Option<Bytes>> {
        let Some(entry) = self.find_entry(tile_id)? else {
            return Ok(None);
        };

        let length = u32::try_from(entry.length).map_err(|_| PmtError::IndexEntryOverflow)?;
        let raw = self
            .source
            .read(self.header.data_offset + entry.offset, length)?;
        let decompressed = compression::decompress(self.header.tile_compression, &raw)?;
        Ok(Some(Bytes::from(decompressed)))
    }

    /// Finds the directory entry covering `tile_id`, recursing through leaf
    /// directories as needed.
    fn find_entry(&self, tile_id: u64) -> PmtResult<Option<DirEntry>> {
        let Some(mut entry) = self.root_directory.find_tile_id(tile_id).copied() else {
            return Ok(None);
        };

        let mut depth = 0u32;
        while entry.is_leaf_pointer() {
            depth += 1;
            if depth > MAX_DIRECTORY_DEPTH {
                return Err(PmtError::InvalidHeader(
                    "directory nesting exceeded the maximum supported depth".into(),
                ));
            }

            let leaf_offset = self.header.leaf_offset + entry.offset;
            let leaf_length = entry.length;
            let internal_compression = self.header.internal_compression;
            let source = &self.source;

            let found = self.cache.get_dir_entry_or_insert(leaf_offset, tile_id, || {
                let raw = source.read(leaf_offset, leaf_length)?;
                let decompressed = compression::decompress(internal_compression, &raw)?;
                Directory::try_from(Bytes::from(decompressed))
            })?;

            match found {
                Some(next_entry) => entry = next_entry,
                None => return Ok(None),
            }
        }

        Ok(Some(entry))
    }

    /// Lists every tile id present at zoom level `z`, expanding run-lengths, by walking
    /// the full directory tree. Read-only; safe to call concurrently with lookups.
    ///
    /// # Errors
    ///
    /// Propagates transport/format errors encountered while resolving leaf directories.
    pub fn tile_ids_at_zoom(&self, z: u8) -> PmtResult<Vec<u64>> {
        let lo = TZ.get(usize::from(z)).copied().unwrap_or(u64::MAX);
        let hi = TZ.get(usize::from(z) + 1).copied().unwrap_or(u64::MAX);

        let mut out = Vec::new();
        self.collect_zoom_range(&self.root_directory, lo, hi, 0, &mut out)?;
        Ok(out)
    }

    fn collect_zoom_range(
        &self,
        directory: &Directory,
        lo: u64,
        hi: u64,
        depth: u32,
        out: &mut Vec<u64>,
    ) -> PmtResult<()> {
        if depth > MAX_DIRECTORY_DEPTH {
            return Err(PmtError::InvalidHeader(
                "directory nesting exceeded the maximum supported depth".into(),
            ));
        }

        for entry in directory.iter() {
            let run_end = entry.tile_id + u64::from(entry.run_length.max(1));
            if run_end <= lo || entry.tile_id >= hi {
                continue;
            }

            if entry.is_leaf_pointer() {
                let leaf_offset = self.header.leaf_offset + entry.offset;
                let raw = self.source.read(leaf_offset, entry.length)?;
                let decompressed = compression::decompress(self.header.internal_compression, &raw)?;
                let leaf = Directory::try_from(Bytes::from(decompressed))?;
                self.collect_zoom_range(&leaf, lo, hi, depth + 1, out)?;
            } else {
                let start = entry.tile_id.max(lo);
                let end = run_end.min(hi);
                out.extend(start..end);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::PmTilesReader;
    use crate::header::Compression;
    use crate::tile::TileCoord;
    use crate::writer::PmTilesWriter;

    #[test]
    fn round_trips_single_tile() {
        let mut buf = Cursor::new(Vec::new());
        let mut writer = PmTilesWriter::new(crate::header::TileType::Png)
            .tile_compression(Compression::None)
            .create(&mut buf)
            .unwrap();
        writer
            .add_tile(TileCoord::new(0, 0, 0).unwrap(), b"Sample tile data")
            .unwrap();
        writer.finalize().unwrap();

        let bytes = crate::range::InMemoryRangeReader::from(buf.into_inner());
        let reader = PmTilesReader::try_from_source(bytes).unwrap();

        let tile = reader.get_tile(TileCoord::new(0, 0, 0).unwrap()).unwrap();
        assert_eq!(tile.as_deref(), Some(&b"Sample tile data"[..]));

        let absent = reader.get_tile(TileCoord::new(1, 0, 0).unwrap()).unwrap();
        assert!(absent.is_none());
    }
}
