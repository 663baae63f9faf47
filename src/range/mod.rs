//! A uniform, synchronous, pull-based random-access byte interface over heterogeneous
//! transports, plus decorators (block alignment, caching) composed over any implementation.

mod block_aligned;
mod cached;
mod file;
#[cfg(feature = "http")]
mod http;
mod memory;
#[cfg(feature = "object-store")]
mod object_store;

pub use block_aligned::BlockAlignedRangeReader;
pub use cached::CachedRangeReader;
pub use file::FileRangeReader;
pub use memory::InMemoryRangeReader;
#[cfg(feature = "http")]
pub use http::{Authenticator, HttpRangeReader};
#[cfg(feature = "object-store")]
pub use object_store::ObjectStoreRangeReader;

use bytes::Bytes;

use crate::error::PmtResult;

/// An absolute byte range within a source: `[offset, offset + length)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    /// Starting byte offset.
    pub offset: u64,
    /// Number of bytes in the range.
    pub length: u32,
}

impl ByteRange {
    /// Creates a new byte range.
    #[must_use]
    pub fn new(offset: u64, length: u32) -> Self {
        Self { offset, length }
    }

    /// The byte immediately past the end of this range.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.offset + u64::from(self.length)
    }
}

/// A random-access, byte-addressable source. Every method blocks the calling thread.
///
/// Implementations must be safe to call concurrently from multiple threads: a
/// [`crate::reader::PmTilesReader`] may issue overlapping `read` calls from different
/// threads while resolving different tiles.
pub trait RangeReader: Send + Sync {
    /// Reads `length` bytes starting at `offset`.
    ///
    /// Reads that straddle the end of the source are truncated to the available
    /// suffix; a read starting at or past `size()` returns an empty buffer. Zero-length
    /// reads return immediately without consulting the underlying transport.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::error::PmtError`] with [`crate::error::ErrorKind::TransportFailure`]
    /// if the underlying transport fails (I/O, network, auth denial).
    fn read(&self, offset: u64, length: u32) -> PmtResult<Bytes>;

    /// The total size of the source in bytes, if known.
    ///
    /// # Errors
    ///
    /// Returns a transport-failure error if the size cannot be determined.
    fn size(&self) -> PmtResult<u64>;

    /// Reads a [`ByteRange`] in one call.
    fn read_range(&self, range: ByteRange) -> PmtResult<Bytes> {
        self.read(range.offset, range.length)
    }
}

impl<T: RangeReader + ?Sized> RangeReader for std::sync::Arc<T> {
    fn read(&self, offset: u64, length: u32) -> PmtResult<Bytes> {
        (**self).read(offset, length)
    }

    fn size(&self) -> PmtResult<u64> {
        (**self).size()
    }
}
