use std::fmt::{Debug, Formatter};
use std::io::Cursor;

use bytes::Bytes;
use varint_rs::{VarintReader, VarintWriter};

use crate::error::PmtError;
use crate::tile::TileCoord;

/// A single row of a `PMTiles` directory: a run of `run_length` consecutive tile ids
/// starting at `tile_id`, all pointing at the same `(offset, length)` payload.
///
/// A `run_length` of `0` means this entry points at a leaf directory rather than a tile,
/// and `offset`/`length` locate that leaf directory's compressed bytes.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct DirEntry {
    /// The first tile id this entry covers.
    pub tile_id: u64,
    /// Byte offset of the payload within the tile-data (or leaf-directory) section.
    pub offset: u64,
    /// Byte length of the payload.
    pub length: u32,
    /// Number of consecutive tile ids, starting at `tile_id`, sharing this payload.
    /// `0` marks a pointer to a leaf directory instead of a tile.
    pub run_length: u32,
}

impl DirEntry {
    /// Whether this entry points at a leaf directory rather than tile content.
    #[must_use]
    pub fn is_leaf_pointer(&self) -> bool {
        self.run_length == 0
    }

    /// Iterates every `(z, x, y)` coordinate covered by this entry's run, in tile-id order.
    pub fn iter_coords(&self) -> impl Iterator<Item = TileCoord> + '_ {
        let run_length = self.run_length.max(1);
        (0..u64::from(run_length)).filter_map(move |i| {
            crate::tile::id_to_zxy(self.tile_id + i)
                .ok()
                .map(|(z, x, y)| TileCoord { z, x, y })
        })
    }
}

/// An in-memory, sorted table of [`DirEntry`] rows: either a root directory or a leaf.
#[derive(Clone, Default)]
pub struct Directory {
    pub(crate) entries: Vec<DirEntry>,
}

impl Debug for Directory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("Directory [entries: {}]", self.entries.len()))
    }
}

impl Directory {
    /// Builds a directory from already-sorted entries, taking ownership to avoid a copy.
    #[must_use]
    pub fn from_entries(entries: Vec<DirEntry>) -> Self {
        Self { entries }
    }

    /// An empty directory with room reserved for `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Appends an entry. Callers must maintain ascending `tile_id` order themselves.
    pub fn push(&mut self, entry: DirEntry) {
        self.entries.push(entry);
    }

    /// Number of rows in this directory.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether this directory has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates this directory's entries in tile-id order.
    pub fn iter(&self) -> impl Iterator<Item = &DirEntry> {
        self.entries.iter()
    }

    /// Finds the entry covering `tile_id`, if any: either an exact match or a run
    /// whose `[tile_id, tile_id + run_length)` range contains it.
    #[must_use]
    pub fn find_tile_id(&self, tile_id: u64) -> Option<&DirEntry> {
        match self.entries.binary_search_by(|e| e.tile_id.cmp(&tile_id)) {
            Ok(idx) => self.entries.get(idx),
            Err(0) => None,
            Err(next_idx) => {
                let candidate = self.entries.get(next_idx - 1)?;
                if candidate.is_leaf_pointer() {
                    // The leaf's coverage isn't known without descending into it; let
                    // the caller recurse and look there.
                    Some(candidate)
                } else if tile_id < candidate.tile_id + u64::from(candidate.run_length) {
                    Some(candidate)
                } else {
                    None
                }
            }
        }
    }

    /// Serializes this directory in the packed, column-oriented `PMTiles` varint format.
    pub fn write_to<W: std::io::Write>(&self, writer: &mut W) -> std::io::Result<()> {
        let mut buf = Vec::new();
        buf.write_usize_varint(self.entries.len())?;

        let mut prev_id = 0u64;
        for entry in &self.entries {
            buf.write_u64_varint(entry.tile_id - prev_id)?;
            prev_id = entry.tile_id;
        }
        for entry in &self.entries {
            buf.write_u32_varint(entry.run_length)?;
        }
        for entry in &self.entries {
            buf.write_u32_varint(entry.length)?;
        }

        let mut prev_entry: Option<&DirEntry> = None;
        for entry in &self.entries {
            let encoded = if let Some(prev) = prev_entry {
                if entry.offset == prev.offset + u64::from(prev.length) {
                    0
                } else {
                    entry.offset + 1
                }
            } else {
                entry.offset + 1
            };
            buf.write_u64_varint(encoded)?;
            prev_entry = Some(entry);
        }

        writer.write_all(&buf)
    }

    /// Serializes and compresses this directory with `compression`.
    pub fn write_compressed_to<W: std::io::Write>(
        &self,
        writer: &mut W,
        compression: crate::header::Compression,
    ) -> Result<(), PmtError> {
        crate::compression::compress_into(compression, writer, |w| self.write_to(w))
    }

    /// The byte length this directory would occupy once compressed with `compression`,
    /// without keeping the compressed bytes around.
    pub fn compressed_size(&self, compression: crate::header::Compression) -> Result<usize, PmtError> {
        let mut counter = countio::Counter::new(std::io::sink());
        self.write_compressed_to(&mut counter, compression)?;
        Ok(counter.writer_bytes())
    }
}

impl TryFrom<Bytes> for Directory {
    type Error = PmtError;

    fn try_from(buffer: Bytes) -> Result<Self, PmtError> {
        let mut buffer = Cursor::new(buffer);
        let n_entries = buffer.read_usize_varint().map_err(|_| PmtError::InvalidEntry)?;

        let mut entries = vec![DirEntry::default(); n_entries];

        let mut next_tile_id = 0u64;
        for entry in &mut entries {
            next_tile_id += buffer
                .read_u64_varint()
                .map_err(|_| PmtError::InvalidEntry)?;
            entry.tile_id = next_tile_id;
        }

        for entry in &mut entries {
            entry.run_length = buffer
                .read_u32_varint()
                .map_err(|_| PmtError::InvalidEntry)?;
        }

        for entry in &mut entries {
            entry.length = buffer
                .read_u32_varint()
                .map_err(|_| PmtError::InvalidEntry)?;
        }

        let mut last_entry: Option<DirEntry> = None;
        for entry in &mut entries {
            let offset = buffer
                .read_u64_varint()
                .map_err(|_| PmtError::InvalidEntry)?;
            entry.offset = if offset == 0 {
                let e = last_entry.ok_or(PmtError::InvalidEntry)?;
                e.offset + u64::from(e.length)
            } else {
                offset - 1
            };
            last_entry = Some(*entry);
        }

        Ok(Directory { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::{DirEntry, Directory};
    use crate::header::Compression;
    use bytes::Bytes;

    fn sample_entries() -> Vec<DirEntry> {
        vec![
            DirEntry {
                tile_id: 0,
                offset: 0,
                length: 100,
                run_length: 1,
            },
            DirEntry {
                tile_id: 1,
                offset: 100,
                length: 50,
                run_length: 3,
            },
            DirEntry {
                tile_id: 10,
                offset: 500,
                length: 20,
                run_length: 1,
            },
        ]
    }

    #[test]
    fn round_trips_directory_bytes() {
        let dir = Directory::from_entries(sample_entries());
        let mut buf = Vec::new();
        dir.write_to(&mut buf).unwrap();

        let parsed = Directory::try_from(Bytes::from(buf)).unwrap();
        assert_eq!(parsed.entries, dir.entries);
    }

    #[test]
    fn finds_tile_within_run() {
        let dir = Directory::from_entries(sample_entries());
        let found = dir.find_tile_id(2).unwrap();
        assert_eq!(found.tile_id, 1);

        assert!(dir.find_tile_id(4).is_none());
        assert!(dir.find_tile_id(9).is_none());
        assert_eq!(dir.find_tile_id(10).unwrap().tile_id, 10);
    }

    #[test]
    fn compressed_size_matches_written_bytes() {
        let dir = Directory::from_entries(sample_entries());
        let size = dir.compressed_size(Compression::Gzip).unwrap();
        let mut buf = Vec::new();
        dir.write_compressed_to(&mut buf, Compression::Gzip).unwrap();
        assert_eq!(size, buf.len());
    }
}
