//! Dispatch over the [`Compression`] codes used for tile payloads, metadata, and directories.

use std::io::{Read, Write};

use crate::error::PmtError;
use crate::header::Compression;

/// Decompresses `bytes` according to `compression`.
///
/// # Errors
///
/// Returns [`PmtError::UnsupportedCompression`] if the relevant crate feature
/// (`brotli`/`zstd`) is not enabled, and [`PmtError::Io`] if the stream is corrupt.
pub fn decompress(compression: Compression, bytes: &[u8]) -> Result<Vec<u8>, PmtError> {
    match compression {
        Compression::None | Compression::Unknown => Ok(bytes.to_vec()),
        Compression::Gzip => {
            let mut out = Vec::with_capacity(bytes.len() * 2);
            flate2::read::GzDecoder::new(bytes).read_to_end(&mut out)?;
            Ok(out)
        }
        Compression::Brotli => {
            #[cfg(feature = "brotli")]
            {
                let mut out = Vec::with_capacity(bytes.len() * 2);
                brotli::BrotliDecompress(&mut std::io::Cursor::new(bytes), &mut out)
                    .map_err(PmtError::Io)?;
                Ok(out)
            }
            #[cfg(not(feature = "brotli"))]
            {
                Err(PmtError::UnsupportedCompression(compression))
            }
        }
        Compression::Zstd => {
            #[cfg(feature = "zstd")]
            {
                zstd::stream::decode_all(bytes).map_err(PmtError::Io)
            }
            #[cfg(not(feature = "zstd"))]
            {
                Err(PmtError::UnsupportedCompression(compression))
            }
        }
    }
}

/// Compresses `bytes` according to `compression`.
///
/// # Errors
///
/// Returns [`PmtError::UnsupportedCompression`] for [`Compression::Brotli`] (this crate
/// only decodes brotli, never encodes it) or for [`Compression::Zstd`] when the `zstd`
/// feature is disabled.
pub fn compress(compression: Compression, bytes: &[u8]) -> Result<Vec<u8>, PmtError> {
    let mut out = Vec::new();
    compress_into(compression, &mut out, |w| w.write_all(bytes))?;
    Ok(out)
}

/// Writes `write_plain(writer)`'s output through the compressor for `compression`.
///
/// This is the building block both [`compress`] and the directory/metadata writers use:
/// it lets a caller compress directly into a destination `Write` without buffering the
/// uncompressed bytes twice.
///
/// # Errors
///
/// Returns [`PmtError::UnsupportedCompression`] for [`Compression::Brotli`] or (when the
/// `zstd` feature is disabled) [`Compression::Zstd`].
pub fn compress_into<W: Write>(
    compression: Compression,
    writer: &mut W,
    write_plain: impl FnOnce(&mut dyn Write) -> std::io::Result<()>,
) -> Result<(), PmtError> {
    match compression {
        Compression::None | Compression::Unknown => {
            write_plain(writer)?;
        }
        Compression::Gzip => {
            let mut encoder = flate2::write::GzEncoder::new(writer, flate2::Compression::default());
            write_plain(&mut encoder)?;
            encoder.finish()?;
        }
        Compression::Brotli => {
            return Err(PmtError::UnsupportedCompression(compression));
        }
        Compression::Zstd => {
            #[cfg(feature = "zstd")]
            {
                let mut encoder = zstd::stream::Encoder::new(writer, 0)?;
                write_plain(&mut encoder)?;
                encoder.finish()?;
            }
            #[cfg(not(feature = "zstd"))]
            {
                return Err(PmtError::UnsupportedCompression(compression));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{compress, decompress};
    use crate::header::Compression;

    #[test]
    fn gzip_round_trips() {
        let data = b"hello pmtiles world, a bit of repeated text repeated text";
        let compressed = compress(Compression::Gzip, data).unwrap();
        assert_ne!(compressed, data);
        let decompressed = decompress(Compression::Gzip, &compressed).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn none_is_passthrough() {
        let data = b"raw bytes";
        let compressed = compress(Compression::None, data).unwrap();
        assert_eq!(compressed, data);
        let decompressed = decompress(Compression::None, &compressed).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn brotli_encode_is_unsupported() {
        assert!(compress(Compression::Brotli, b"x").is_err());
    }
}
