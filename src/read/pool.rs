//! Pipeline reuse for solid folders.
//!
//! Decoding a solid folder is strictly sequential, so a caller extracting
//! its files in archive order would otherwise restart decompression from
//! byte zero for every file. Each multi-file folder instead owns a small
//! pool of partially consumed pipelines keyed by their uncompressed
//! offset: closing a file reader parks its pipeline, and the next open
//! takes the parked pipeline whose position is at (or nearest below) the
//! wanted offset and rolls it forward.
//!
//! Folders holding a single file never benefit from parking, so they get
//! a no-op pool that drops whatever is put into it.

use std::num::NonZeroUsize;

use lru::LruCache;

use super::folder::FolderReader;

/// A per-folder pipeline pool.
pub(crate) enum FolderPool {
    /// Drops every pipeline on put; used for single-file folders.
    Noop,
    /// Offset-keyed pool with LRU eviction.
    Lru(LruPool),
}

impl FolderPool {
    /// Creates the pool matching a folder's file count.
    pub(crate) fn for_file_count(files: usize) -> Self {
        if files > 1 {
            Self::Lru(LruPool::new())
        } else {
            Self::Noop
        }
    }

    /// Takes the pipeline parked exactly at `offset`, or the one parked
    /// closest before it. The pipeline leaves the pool without running
    /// eviction.
    pub(crate) fn get(&mut self, offset: u64) -> Option<FolderReader> {
        match self {
            Self::Noop => None,
            Self::Lru(pool) => pool.get(offset),
        }
    }

    /// Parks a pipeline at its current offset. A pipeline already parked
    /// at the same offset is kept; the newcomer is dropped.
    pub(crate) fn put(&mut self, offset: u64, reader: FolderReader) {
        match self {
            Self::Noop => drop(reader),
            Self::Lru(pool) => pool.put(offset, reader),
        }
    }
}

/// Offset-keyed LRU pool of live pipelines.
///
/// Capacity follows the machine's parallelism: that many readers can
/// plausibly interleave over one folder, and each parked pipeline pins
/// decoder state that is expensive to rebuild but not free to keep.
pub(crate) struct LruPool {
    cache: LruCache<u64, FolderReader>,
}

impl LruPool {
    fn new() -> Self {
        let capacity = std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
        }
    }

    #[cfg(test)]
    fn with_capacity(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(NonZeroUsize::new(capacity).expect("nonzero capacity")),
        }
    }

    fn get(&mut self, offset: u64) -> Option<FolderReader> {
        if let Some(reader) = self.cache.pop(&offset) {
            return Some(reader);
        }

        // Greatest parked offset strictly below the target: anything at a
        // higher offset would need a backwards seek.
        let floor = self
            .cache
            .iter()
            .map(|(&k, _)| k)
            .filter(|&k| k < offset)
            .max()?;
        self.cache.pop(&floor)
    }

    fn put(&mut self, offset: u64, reader: FolderReader) {
        if self.cache.contains(&offset) {
            return;
        }
        // push evicts the least-recently-inserted entry when full; the
        // evicted pipeline is simply dropped, which closes it.
        self.cache.push(offset, reader);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.cache.len()
    }
}
