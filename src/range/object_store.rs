use std::ops::Range;
use std::sync::Mutex;

use bytes::Bytes;
use object_store::path::Path;
use object_store::ObjectStore;
use tokio::runtime::Runtime;
use url::Url;

use super::RangeReader;
use crate::error::{PmtError, PmtResult};

/// A [`RangeReader`] backed by the [`object_store`] crate, giving synchronous access to
/// S3, Azure Blob Storage, Google Cloud Storage, and plain HTTP(S)/WebDAV stores.
///
/// `object_store`'s clients are async; this type owns a small single-threaded Tokio
/// runtime and bridges every call through [`Runtime::block_on`] so the rest of this
/// crate never has to know the backing transport is async under the hood.
pub struct ObjectStoreRangeReader {
    store: Box<dyn ObjectStore>,
    path: Path,
    runtime: Runtime,
    size: Mutex<Option<u64>>,
}

impl ObjectStoreRangeReader {
    /// Wraps an already-constructed [`ObjectStore`] and the path of the archive within it.
    ///
    /// # Errors
    ///
    /// Returns [`PmtError::Io`] if the internal Tokio runtime cannot be started.
    pub fn new<P: Into<Path>>(store: Box<dyn ObjectStore>, path: P) -> PmtResult<Self> {
        let runtime = Runtime::new()?;
        Ok(Self {
            store,
            path: path.into(),
            runtime,
            size: Mutex::new(None),
        })
    }

    /// Builds a reader from a URL, e.g. `s3://bucket/path`, `https://host/path`,
    /// `file:///path`, or `azure://account/container/path` (feature-gated by the
    /// scheme's corresponding `object-store-*` crate feature).
    ///
    /// # Errors
    ///
    /// Returns [`PmtError::ObjectStore`] if the URL's scheme is unsupported or the
    /// provider's client cannot be constructed, and [`PmtError::Io`] if the internal
    /// Tokio runtime cannot be started.
    pub fn from_url(url: &Url) -> PmtResult<Self> {
        let (store, path) = object_store::parse_url(url)?;
        Self::new(store, path)
    }

    /// Builds a reader from a URL and provider-specific options (e.g. credentials,
    /// `allow_http`), as accepted by [`object_store::parse_url_opts`].
    ///
    /// # Errors
    ///
    /// Returns [`PmtError::ObjectStore`] if the URL or options are rejected, and
    /// [`PmtError::Io`] if the internal Tokio runtime cannot be started.
    pub fn from_url_opts<I, K, V>(url: &Url, options: I) -> PmtResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let (store, path) = object_store::parse_url_opts(url, options)?;
        Self::new(store, path)
    }
}

impl RangeReader for ObjectStoreRangeReader {
    fn read(&self, offset: u64, length: u32) -> PmtResult<Bytes> {
        if length == 0 {
            return Ok(Bytes::new());
        }
        let size = self.size()?;
        if offset >= size {
            return Ok(Bytes::new());
        }
        let end = (offset + u64::from(length)).min(size);
        let range = Range { start: offset, end };
        self.runtime
            .block_on(async { self.store.get_range(&self.path, range).await })
            .map_err(PmtError::from)
    }

    fn size(&self) -> PmtResult<u64> {
        #[expect(clippy::unwrap_used)]
        if let Some(size) = *self.size.lock().unwrap() {
            return Ok(size);
        }

        let meta = self
            .runtime
            .block_on(async { self.store.head(&self.path).await })?;
        let size = u64::try_from(meta.size).unwrap_or(u64::MAX);

        #[expect(clippy::unwrap_used)]
        {
            *self.size.lock().unwrap() = Some(size);
        }
        Ok(size)
    }
}
