//! Synchronous caching of parsed directories, keyed by their byte offset in the archive.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, RwLock};

use lru::LruCache;

use crate::directory::{DirEntry, Directory};
use crate::error::PmtResult;

/// Result of a directory cache lookup.
pub enum DirCacheResult {
    /// The directory was not found in the cache.
    NotCached,
    /// The directory was cached, but it has no entry covering the requested tile id.
    NotFound,
    /// The directory was cached and covers the requested tile id.
    Found(DirEntry),
}

impl From<Option<&DirEntry>> for DirCacheResult {
    fn from(entry: Option<&DirEntry>) -> Self {
        match entry {
            Some(entry) => DirCacheResult::Found(*entry),
            None => DirCacheResult::NotFound,
        }
    }
}

/// A cache for parsed `PMTiles` directories, keyed by their byte offset in the archive.
///
/// Implementations must be safe to share across threads: a [`crate::reader::PmTilesReader`]
/// may be cloned and used concurrently.
pub trait DirectoryCache: Send + Sync {
    /// Looks up the directory at `offset`, and if present, the entry covering `tile_id`.
    fn get_dir_entry(&self, offset: u64, tile_id: u64) -> DirCacheResult;

    /// Inserts a freshly-fetched directory into the cache under `offset`.
    fn insert_dir(&self, offset: u64, directory: Directory);

    /// Looks up `tile_id` in the directory at `offset`, fetching and caching it with
    /// `fetch` on a miss.
    ///
    /// Implementations that support request coalescing should ensure concurrent misses
    /// for the same `offset` invoke `fetch` only once.
    ///
    /// # Errors
    ///
    /// Propagates whatever error `fetch` returns.
    fn get_dir_entry_or_insert(
        &self,
        offset: u64,
        tile_id: u64,
        fetch: impl FnOnce() -> PmtResult<Directory>,
    ) -> PmtResult<Option<DirEntry>> {
        match self.get_dir_entry(offset, tile_id) {
            DirCacheResult::Found(entry) => Ok(Some(entry)),
            DirCacheResult::NotFound => Ok(None),
            DirCacheResult::NotCached => {
                let dir = fetch()?;
                let entry = dir.find_tile_id(tile_id).copied();
                self.insert_dir(offset, dir);
                Ok(entry)
            }
        }
    }
}

/// A cache that never stores anything; every lookup is a miss.
pub struct NoCache;

impl DirectoryCache for NoCache {
    #[inline]
    fn get_dir_entry(&self, _offset: u64, _tile_id: u64) -> DirCacheResult {
        DirCacheResult::NotCached
    }

    #[inline]
    fn insert_dir(&self, _offset: u64, _directory: Directory) {}
}

/// An unbounded, `HashMap`-based directory cache.
///
/// Suitable for small archives read end-to-end, where every directory fits in memory
/// and eviction is unnecessary.
#[derive(Default)]
pub struct HashMapCache {
    cache: RwLock<HashMap<u64, Directory>>,
}

impl DirectoryCache for HashMapCache {
    fn get_dir_entry(&self, offset: u64, tile_id: u64) -> DirCacheResult {
        #[expect(clippy::unwrap_used)]
        if let Some(dir) = self.cache.read().unwrap().get(&offset) {
            return dir.find_tile_id(tile_id).into();
        }
        DirCacheResult::NotCached
    }

    fn insert_dir(&self, offset: u64, directory: Directory) {
        #[expect(clippy::unwrap_used)]
        self.cache.write().unwrap().insert(offset, directory);
    }
}

#[derive(Default)]
enum CacheSlotState {
    #[default]
    Empty,
    Filled(Directory),
}

#[derive(Default)]
struct CacheSlot {
    /// Guards the slot's fill state and coalesces concurrent misses onto one fetch.
    state: Mutex<CacheSlotState>,
}

impl CacheSlot {
    fn get_dir_entry_or_insert(
        &self,
        tile_id: u64,
        fetch: impl FnOnce() -> PmtResult<Directory>,
    ) -> PmtResult<Option<DirEntry>> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let CacheSlotState::Empty = *state {
            let dir = fetch()?;
            let entry = dir.find_tile_id(tile_id).copied();
            *state = CacheSlotState::Filled(dir);
            return Ok(entry);
        }
        match &*state {
            CacheSlotState::Filled(dir) => Ok(dir.find_tile_id(tile_id).copied()),
            CacheSlotState::Empty => unreachable!(),
        }
    }
}

/// A bounded, LRU-evicted directory cache with request coalescing.
///
/// Holding the per-slot lock only while filling a single slot (rather than the whole
/// cache) means concurrent lookups for *different* offsets never block each other; only
/// concurrent misses for the *same* offset coalesce onto a single `fetch`.
pub struct LruDirectoryCache {
    slots: RwLock<LruCache<u64, Arc<CacheSlot>>>,
}

impl LruDirectoryCache {
    /// Creates a cache that holds at most `capacity` directories.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            slots: RwLock::new(LruCache::new(capacity)),
        }
    }

    fn slot_for(&self, offset: u64) -> Arc<CacheSlot> {
        #[expect(clippy::unwrap_used)]
        let mut slots = self.slots.write().unwrap();
        slots
            .get_or_insert(offset, || Arc::new(CacheSlot::default()))
            .clone()
    }
}

impl DirectoryCache for LruDirectoryCache {
    fn get_dir_entry(&self, offset: u64, tile_id: u64) -> DirCacheResult {
        #[expect(clippy::unwrap_used)]
        let Some(slot) = self.slots.write().unwrap().get(&offset).cloned() else {
            return DirCacheResult::NotCached;
        };
        match &*slot.state.lock().unwrap_or_else(|e| e.into_inner()) {
            CacheSlotState::Filled(dir) => dir.find_tile_id(tile_id).into(),
            CacheSlotState::Empty => DirCacheResult::NotCached,
        }
    }

    fn insert_dir(&self, offset: u64, directory: Directory) {
        let slot = self.slot_for(offset);
        *slot.state.lock().unwrap_or_else(|e| e.into_inner()) = CacheSlotState::Filled(directory);
    }

    fn get_dir_entry_or_insert(
        &self,
        offset: u64,
        tile_id: u64,
        fetch: impl FnOnce() -> PmtResult<Directory>,
    ) -> PmtResult<Option<DirEntry>> {
        let slot = self.slot_for(offset);
        slot.get_dir_entry_or_insert(tile_id, fetch)
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::{DirCacheResult, DirectoryCache, HashMapCache, LruDirectoryCache};
    use crate::directory::{DirEntry, Directory};

    fn dir_with_entry(tile_id: u64) -> Directory {
        Directory::from_entries(vec![DirEntry {
            tile_id,
            offset: 0,
            length: 10,
            run_length: 1,
        }])
    }

    #[test]
    fn hash_map_cache_hits_and_misses() {
        let cache = HashMapCache::default();
        assert!(matches!(
            cache.get_dir_entry(0, 0),
            DirCacheResult::NotCached
        ));

        cache.insert_dir(0, dir_with_entry(5));
        assert!(matches!(cache.get_dir_entry(0, 5), DirCacheResult::Found(_)));
        assert!(matches!(cache.get_dir_entry(0, 6), DirCacheResult::NotFound));
    }

    #[test]
    fn lru_cache_coalesces_fetch() {
        let cache = LruDirectoryCache::new(NonZeroUsize::new(4).unwrap());
        let fetch_count = AtomicUsize::new(0);

        let entry = cache
            .get_dir_entry_or_insert(0, 5, || {
                fetch_count.fetch_add(1, Ordering::SeqCst);
                Ok(dir_with_entry(5))
            })
            .unwrap();
        assert!(entry.is_some());

        let entry_again = cache
            .get_dir_entry_or_insert(0, 5, || {
                fetch_count.fetch_add(1, Ordering::SeqCst);
                Ok(dir_with_entry(5))
            })
            .unwrap();
        assert!(entry_again.is_some());
        assert_eq!(fetch_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lru_cache_propagates_fetch_error() {
        let cache = LruDirectoryCache::new(NonZeroUsize::new(4).unwrap());
        let result = cache.get_dir_entry_or_insert(0, 5, || Err(crate::error::PmtError::InvalidEntry));
        assert!(result.is_err());
    }
}
