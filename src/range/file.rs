use std::fs::File;
use std::path::Path;

use bytes::Bytes;

use super::RangeReader;
use crate::error::PmtResult;

/// A [`RangeReader`] backed by a local file, using positioned reads so concurrent
/// callers never contend on a shared file cursor.
pub struct FileRangeReader {
    file: File,
    size: u64,
}

impl FileRangeReader {
    /// Opens `path` for reading.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::PmtError::Io`] if the file cannot be opened or its
    /// metadata cannot be read.
    pub fn open<P: AsRef<Path>>(path: P) -> PmtResult<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self { file, size })
    }

    /// Wraps an already-open file, probing its length via `metadata`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::PmtError::Io`] if the file's metadata cannot be read.
    pub fn from_file(file: File) -> PmtResult<Self> {
        let size = file.metadata()?.len();
        Ok(Self { file, size })
    }
}

#[cfg(unix)]
fn positioned_read(file: &File, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
fn positioned_read(file: &File, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

#[cfg(not(any(unix, windows)))]
fn positioned_read(file: &File, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
    use std::io::{Read, Seek, SeekFrom};
    // Fallback for exotic targets: not safe under concurrent use, but keeps the crate
    // portable. The unix/windows paths above are what every real deployment hits.
    let mut file = file.try_clone()?;
    file.seek(SeekFrom::Start(offset))?;
    file.read(buf)
}

impl RangeReader for FileRangeReader {
    fn read(&self, offset: u64, length: u32) -> PmtResult<Bytes> {
        if length == 0 || offset >= self.size {
            return Ok(Bytes::new());
        }
        let available = (self.size - offset).min(u64::from(length));
        #[expect(clippy::cast_possible_truncation)]
        let mut buf = vec![0u8; available as usize];
        let mut filled = 0usize;
        while filled < buf.len() {
            let n = positioned_read(&self.file, offset + filled as u64, &mut buf[filled..])?;
            if n == 0 {
                buf.truncate(filled);
                break;
            }
            filled += n;
        }
        Ok(Bytes::from(buf))
    }

    fn size(&self) -> PmtResult<u64> {
        Ok(self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::FileRangeReader;
    use crate::range::RangeReader;
    use std::io::Write;

    #[test]
    fn reads_exact_range() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"0123456789").unwrap();
        let reader = FileRangeReader::open(file.path()).unwrap();

        assert_eq!(reader.size().unwrap(), 10);
        assert_eq!(&reader.read(2, 3).unwrap()[..], b"234");
    }

    #[test]
    fn truncates_at_eof() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[1u8; 100]).unwrap();
        let reader = FileRangeReader::open(file.path()).unwrap();

        assert_eq!(reader.read(90, 100).unwrap().len(), 10);
        assert_eq!(reader.read(100, 100).unwrap().len(), 0);
        assert_eq!(reader.read(5, 0).unwrap().len(), 0);
    }
}
