use bytes::Bytes;

use super::RangeReader;
use crate::error::PmtResult;

/// A [`RangeReader`] over an in-memory buffer. Useful for tests and for archives small
/// enough to load wholesale.
#[derive(Clone)]
pub struct InMemoryRangeReader {
    data: Bytes,
}

impl From<Vec<u8>> for InMemoryRangeReader {
    fn from(data: Vec<u8>) -> Self {
        Self { data: Bytes::from(data) }
    }
}

impl From<Bytes> for InMemoryRangeReader {
    fn from(data: Bytes) -> Self {
        Self { data }
    }
}

impl RangeReader for InMemoryRangeReader {
    fn read(&self, offset: u64, length: u32) -> PmtResult<Bytes> {
        if length == 0 || offset >= self.data.len() as u64 {
            return Ok(Bytes::new());
        }
        #[expect(clippy::cast_possible_truncation)]
        let start = offset as usize;
        let end = (start + length as usize).min(self.data.len());
        Ok(self.data.slice(start..end))
    }

    fn size(&self) -> PmtResult<u64> {
        Ok(self.data.len() as u64)
    }
}
