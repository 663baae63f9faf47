use crate::header::Compression;

/// Coarse-grained classification of a [`PmtError`], matching the error kinds
/// callers are expected to branch on (see module docs for propagation policy).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Programmer error: bad coordinates, out-of-order tile ids, bad zoom.
    InvalidArgument,
    /// The bytes read from a source do not form a valid `PMTiles` archive or directory.
    InvalidFormat,
    /// A compression algorithm is not implemented on this platform/feature set.
    UnsupportedCompression,
    /// I/O, network, or auth failure from a [`crate::range::RangeReader`].
    TransportFailure,
    /// The MVT encoder's fixed-buffer mode could not fit the message.
    BufferTooSmall,
    /// The writer's progress observer requested cancellation.
    Cancelled,
}

/// The error type returned by all fallible operations in this crate.
#[derive(Debug, thiserror::Error)]
pub enum PmtError {
    /// The first bytes of the archive are not the `PMTiles` v3 magic number.
    #[error("invalid magic number: not a PMTiles archive")]
    InvalidMagicNumber,

    /// The archive declares a `PMTiles` v2 magic number, which this crate does not read.
    #[error("unsupported PMTiles v2 archive, only v3 is supported")]
    UnsupportedV2,

    /// The archive declares a version other than 3.
    #[error("unsupported PMTiles version {0}, only version 3 is supported")]
    UnsupportedVersion(u8),

    /// The 127-byte header could not be parsed or failed a bounds sanity check.
    #[error("invalid PMTiles header: {0}")]
    InvalidHeader(String),

    /// An unrecognized compression code was found in a header or directory.
    #[error("invalid compression code {0}")]
    InvalidCompression(u8),

    /// An unrecognized tile type code was found in the header.
    #[error("invalid tile type code {0}")]
    InvalidTileType(u8),

    /// A directory's varint columns were truncated or internally inconsistent.
    #[error("invalid directory entry")]
    InvalidEntry,

    /// A directory or tile-data section offset/length falls outside the source.
    #[error("archive bounds check failed: {0}")]
    BoundsCheckFailed(String),

    /// A length did not fit in the on-disk `u32` entry field.
    #[error("entry length/offset overflowed a u32")]
    IndexEntryOverflow,

    /// Negative/oversize tile coordinates, out-of-order tile ids, or a bad zoom.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// This platform/feature set cannot compress or decompress with `compression`.
    #[error("unsupported compression: {0:?}")]
    UnsupportedCompression(Compression),

    /// The MVT wire format was malformed (truncated varint, bad field/wire-type pair, etc.)
    #[error("invalid MVT tile: {0}")]
    InvalidMvt(String),

    /// The encoder's fixed-size output buffer is too small to hold the message.
    #[error("buffer too small, need at least {required} bytes")]
    BufferTooSmall {
        /// The number of bytes the caller must provide on retry.
        required: usize,
    },

    /// The writer's progress observer requested cancellation.
    #[error("write was cancelled")]
    Cancelled,

    /// Wraps the underlying I/O error from a local file or in-memory source.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A range-reader transport (HTTP, S3, Azure, ...) failed; the cause is preserved.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Metadata bytes were not valid UTF-8.
    #[error("metadata is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// A `reqwest` request failed outright (DNS, TLS, connection reset, ...).
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Reqwest(#[from] reqwest::Error),

    /// An `object_store` operation failed.
    #[cfg(feature = "object-store")]
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
}

impl PmtError {
    /// Classify this error into one of the tagged kinds callers branch on.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            PmtError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            PmtError::UnsupportedCompression(_) => ErrorKind::UnsupportedCompression,
            PmtError::BufferTooSmall { .. } => ErrorKind::BufferTooSmall,
            PmtError::Cancelled => ErrorKind::Cancelled,
            PmtError::Io(_) | PmtError::Transport(_) => ErrorKind::TransportFailure,
            #[cfg(feature = "http")]
            PmtError::Reqwest(_) => ErrorKind::TransportFailure,
            #[cfg(feature = "object-store")]
            PmtError::ObjectStore(_) => ErrorKind::TransportFailure,
            _ => ErrorKind::InvalidFormat,
        }
    }
}

/// A specialized [`Result`] using [`PmtError`].
pub type PmtResult<T> = Result<T, PmtError>;
