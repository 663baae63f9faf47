use bytes::{Bytes, BytesMut};

use super::RangeReader;
use crate::error::PmtResult;

/// Expands every inbound read to the smallest enclosing window of `block_size`-aligned
/// bytes before delegating, then slices the caller's requested sub-range back out.
///
/// Aligning reads this way means every downstream cache key is a block index: there can
/// never be two overlapping cache entries wasting capacity, and eviction is obvious.
pub struct BlockAlignedRangeReader<R: RangeReader> {
    inner: R,
    block_size: u32,
}

impl<R: RangeReader> BlockAlignedRangeReader<R> {
    /// Wraps `inner`, aligning every read to `block_size`-byte windows.
    ///
    /// # Panics
    ///
    /// Panics if `block_size` is zero or not a power of two.
    #[must_use]
    pub fn new(inner: R, block_size: u32) -> Self {
        assert!(block_size > 0 && block_size.is_power_of_two());
        Self { inner, block_size }
    }

    /// The index of the block containing `offset`.
    #[must_use]
    pub fn block_index(&self, offset: u64) -> u64 {
        offset / u64::from(self.block_size)
    }

    /// The configured block size.
    #[must_use]
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    fn aligned_window(&self, offset: u64, length: u32) -> (u64, u32) {
        let b = u64::from(self.block_size);
        let start = (offset / b) * b;
        let end = (offset + u64::from(length)).div_ceil(b) * b;
        #[expect(clippy::cast_possible_truncation)]
        let window_len = (end - start) as u32;
        (start, window_len)
    }
}

impl<R: RangeReader> RangeReader for BlockAlignedRangeReader<R> {
    fn read(&self, offset: u64, length: u32) -> PmtResult<Bytes> {
        if length == 0 {
            return Ok(Bytes::new());
        }

        let (win_start, win_len) = self.aligned_window(offset, length);
        let window = self.inner.read(win_start, win_len)?;

        #[expect(clippy::cast_possible_truncation)]
        let skip = (offset - win_start) as usize;
        if skip >= window.len() {
            return Ok(Bytes::new());
        }
        let take = (window.len() - skip).min(length as usize);

        let mut out = BytesMut::with_capacity(take);
        out.extend_from_slice(&window[skip..skip + take]);
        Ok(out.freeze())
    }

    fn size(&self) -> PmtResult<u64> {
        self.inner.size()
    }
}

#[cfg(test)]
mod tests {
    use super::BlockAlignedRangeReader;
    use crate::range::RangeReader;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingReader {
        data: Vec<u8>,
        calls: AtomicUsize,
    }

    impl RangeReader for CountingReader {
        fn read(&self, offset: u64, length: u32) -> crate::error::PmtResult<bytes::Bytes> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let offset = offset as usize;
            let end = (offset + length as usize).min(self.data.len());
            if offset >= self.data.len() {
                return Ok(bytes::Bytes::new());
            }
            Ok(bytes::Bytes::copy_from_slice(&self.data[offset..end]))
        }

        fn size(&self) -> crate::error::PmtResult<u64> {
            Ok(self.data.len() as u64)
        }
    }

    #[test]
    fn slices_requested_range_out_of_aligned_window() {
        let data: Vec<u8> = (0..256u32).map(|i| (i % 256) as u8).collect();
        let inner = CountingReader {
            data,
            calls: AtomicUsize::new(0),
        };
        let reader = BlockAlignedRangeReader::new(inner, 64);

        let bytes = reader.read(70, 10).unwrap();
        assert_eq!(bytes.len(), 10);
        assert_eq!(bytes[0], 70);
        assert_eq!(bytes[9], 79);
    }

    #[test]
    fn aligns_to_block_boundaries() {
        let data = vec![0u8; 256];
        let inner = CountingReader {
            data,
            calls: AtomicUsize::new(0),
        };
        let reader = BlockAlignedRangeReader::new(inner, 64);
        let (start, len) = reader.aligned_window(70, 10);
        assert_eq!(start, 64);
        assert_eq!(len, 64);
    }
}
