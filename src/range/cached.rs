use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, RwLock};

use bytes::Bytes;
use lru::LruCache;

use super::RangeReader;
use crate::error::PmtResult;

enum SlotState {
    Empty,
    Filled(Bytes),
}

struct Slot {
    state: Mutex<SlotState>,
}

/// A bounded LRU cache of block-aligned byte ranges, sitting on top of any
/// [`RangeReader`] (typically a [`super::BlockAlignedRangeReader`]).
///
/// Reads are cached by block index, not by the caller's raw `(offset, length)`, so two
/// overlapping reads within the same block share one cache entry. Concurrent misses for
/// the same block coalesce onto a single underlying fetch.
pub struct CachedRangeReader<R: RangeReader> {
    inner: R,
    block_size: u32,
    slots: RwLock<LruCache<u64, Arc<Slot>>>,
}

impl<R: RangeReader> CachedRangeReader<R> {
    /// Wraps `inner`, caching up to `capacity` blocks of `block_size` bytes each.
    ///
    /// # Panics
    ///
    /// Panics if `block_size` is zero or not a power of two.
    #[must_use]
    pub fn new(inner: R, block_size: u32, capacity: NonZeroUsize) -> Self {
        assert!(block_size > 0 && block_size.is_power_of_two());
        Self {
            inner,
            block_size,
            slots: RwLock::new(LruCache::new(capacity)),
        }
    }

    fn slot_for(&self, block_index: u64) -> Arc<Slot> {
        #[expect(clippy::unwrap_used)]
        let mut slots = self.slots.write().unwrap();
        slots
            .get_or_insert(block_index, || {
                Arc::new(Slot {
                    state: Mutex::new(SlotState::Empty),
                })
            })
            .clone()
    }

    fn read_block(&self, block_index: u64) -> PmtResult<Bytes> {
        let slot = self.slot_for(block_index);
        let mut state = slot.state.lock().unwrap_or_else(|e| e.into_inner());
        if let SlotState::Filled(bytes) = &*state {
            return Ok(bytes.clone());
        }
        let offset = block_index * u64::from(self.block_size);
        let bytes = self.inner.read(offset, self.block_size)?;
        *state = SlotState::Filled(bytes.clone());
        Ok(bytes)
    }
}

impl<R: RangeReader> RangeReader for CachedRangeReader<R> {
    fn read(&self, offset: u64, length: u32) -> PmtResult<Bytes> {
        if length == 0 {
            return Ok(Bytes::new());
        }

        let b = u64::from(self.block_size);
        let first_block = offset / b;
        let last_block = (offset + u64::from(length) - 1) / b;

        if first_block == last_block {
            let block = self.read_block(first_block)?;
            #[expect(clippy::cast_possible_truncation)]
            let skip = (offset - first_block * b) as usize;
            if skip >= block.len() {
                return Ok(Bytes::new());
            }
            let take = (block.len() - skip).min(length as usize);
            return Ok(block.slice(skip..skip + take));
        }

        let mut out = Vec::with_capacity(length as usize);
        for block_index in first_block..=last_block {
            let block = self.read_block(block_index)?;
            if block.is_empty() {
                break;
            }
            let block_start = block_index * b;
            let lo = offset.max(block_start);
            let hi = (offset + u64::from(length)).min(block_start + block.len() as u64);
            if hi <= lo {
                continue;
            }
            #[expect(clippy::cast_possible_truncation)]
            let (lo_rel, hi_rel) = ((lo - block_start) as usize, (hi - block_start) as usize);
            out.extend_from_slice(&block[lo_rel..hi_rel]);
        }
        Ok(Bytes::from(out))
    }

    fn size(&self) -> PmtResult<u64> {
        self.inner.size()
    }
}

#[cfg(test)]
mod tests {
    use super::CachedRangeReader;
    use crate::range::RangeReader;
    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingReader {
        data: Vec<u8>,
        reads: AtomicUsize,
    }

    impl RangeReader for CountingReader {
        fn read(&self, offset: u64, length: u32) -> crate::error::PmtResult<bytes::Bytes> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let offset = offset as usize;
            if offset >= self.data.len() {
                return Ok(bytes::Bytes::new());
            }
            let end = (offset + length as usize).min(self.data.len());
            Ok(bytes::Bytes::copy_from_slice(&self.data[offset..end]))
        }

        fn size(&self) -> crate::error::PmtResult<u64> {
            Ok(self.data.len() as u64)
        }
    }

    #[test]
    fn repeated_reads_within_block_hit_cache() {
        let data: Vec<u8> = (0..256u32).map(|i| (i % 256) as u8).collect();
        let inner = CountingReader {
            data,
            reads: AtomicUsize::new(0),
        };
        let reader = CachedRangeReader::new(inner, 64, NonZeroUsize::new(4).unwrap());

        let a = reader.read(10, 5).unwrap();
        let b = reader.read(20, 5).unwrap();
        assert_eq!(&a[..], &[10, 11, 12, 13, 14]);
        assert_eq!(&b[..], &[20, 21, 22, 23, 24]);
        assert_eq!(reader.inner.reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn read_spanning_multiple_blocks() {
        let data: Vec<u8> = (0..256u32).map(|i| (i % 256) as u8).collect();
        let inner = CountingReader {
            data,
            reads: AtomicUsize::new(0),
        };
        let reader = CachedRangeReader::new(inner, 64, NonZeroUsize::new(4).unwrap());

        let out = reader.read(60, 20).unwrap();
        assert_eq!(out.len(), 20);
        assert_eq!(&out[..], &(60..80).map(|i| i as u8).collect::<Vec<_>>()[..]);
    }
}
