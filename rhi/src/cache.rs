//! Transient resource cache (C4): frame-indexed reuse of buffers and textures
//! keyed by descriptor hash, so the render graph doesn't allocate fresh GPU
//! memory every frame for resources whose shape repeats.

use std::collections::HashMap;

use log::{debug, warn};

/// Bound on how many idle entries a single descriptor hash may accumulate.
/// Past this, the oldest idle entry is dropped rather than grown further.
pub const MAX_FREE_LIST_LEN: usize = 8;

/// Entries idle for this many frames are evicted even if the free list isn't full.
pub const DEFAULT_EVICT_AFTER_FRAMES: u64 = 3;

struct CacheEntry<T> {
    resource: T,
    last_used_frame: u64,
}

/// A descriptor-hash-keyed pool of GPU resources of type `T`. `T` is opaque to
/// the cache; callers are responsible for knowing a resource satisfies a given
/// hash (the caller computed the hash from the same descriptor that created it).
pub struct TransientCache<T> {
    free_lists: HashMap<u64, Vec<CacheEntry<T>>>,
    evict_after_frames: u64,
    current_frame: u64,
}

impl<T> TransientCache<T> {
    pub fn new(evict_after_frames: u64) -> Self {
        Self { free_lists: HashMap::new(), evict_after_frames, current_frame: 0 }
    }

    /// Attempts to reuse an idle resource matching `descriptor_hash`. Returns
    /// `None` on a cache miss, in which case the caller must create a new
    /// resource and insert it via [`Self::release`] once its frame is done.
    pub fn acquire(&mut self, descriptor_hash: u64) -> Option<T> {
        let list = self.free_lists.get_mut(&descriptor_hash)?;
        let entry = list.pop();
        match &entry {
            Some(_) => debug!("transient cache hit for descriptor {descriptor_hash:#x}"),
            None => debug!("transient cache miss for descriptor {descriptor_hash:#x}"),
        }
        entry.map(|e| e.resource)
    }

    /// Returns a resource to the free list for its descriptor hash, to be
    /// reused by a future frame. If the free list is already at capacity the
    /// resource is dropped instead of being retained (and a warning logged);
    /// growth is bounded rather than unbounded.
    pub fn release(&mut self, descriptor_hash: u64, resource: T) {
        let list = self.free_lists.entry(descriptor_hash).or_default();
        if list.len() >= MAX_FREE_LIST_LEN {
            warn!("transient cache free list for descriptor {descriptor_hash:#x} at capacity, dropping resource");
            return;
        }
        list.push(CacheEntry { resource, last_used_frame: self.current_frame });
    }

    /// Advances the frame counter and evicts idle entries older than the
    /// configured threshold. Call once per frame retirement.
    pub fn advance_frame(&mut self) {
        self.current_frame += 1;
        let cutoff = self.current_frame.saturating_sub(self.evict_after_frames);
        for (hash, list) in self.free_lists.iter_mut() {
            let before = list.len();
            list.retain(|entry| entry.last_used_frame >= cutoff);
            let evicted = before - list.len();
            if evicted > 0 {
                warn!("evicted {evicted} idle transient resource(s) for descriptor {hash:#x}");
            }
        }
        self.free_lists.retain(|_, list| !list.is_empty());
    }

    /// Total number of idle resources currently held across all descriptors.
    pub fn idle_count(&self) -> usize {
        self.free_lists.values().map(|l| l.len()).sum()
    }
}

impl<T> Default for TransientCache<T> {
    fn default() -> Self {
        Self::new(DEFAULT_EVICT_AFTER_FRAMES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_after_release_reuses_the_resource() {
        let mut cache: TransientCache<u32> = TransientCache::default();
        assert!(cache.acquire(42).is_none());
        cache.release(42, 7);
        assert_eq!(cache.acquire(42), Some(7));
        assert!(cache.acquire(42).is_none());
    }

    #[test]
    fn free_list_is_bounded() {
        let mut cache: TransientCache<u32> = TransientCache::default();
        for i in 0..(MAX_FREE_LIST_LEN as u32 + 4) {
            cache.release(1, i);
        }
        assert_eq!(cache.idle_count(), MAX_FREE_LIST_LEN);
    }

    #[test]
    fn idle_entries_are_evicted_after_n_frames() {
        let mut cache: TransientCache<u32> = TransientCache::new(3);
        cache.release(1, 100);
        cache.advance_frame();
        cache.advance_frame();
        assert_eq!(cache.idle_count(), 1);
        cache.advance_frame();
        cache.advance_frame();
        assert_eq!(cache.idle_count(), 0);
    }

    #[test]
    fn reacquiring_refreshes_last_used_frame() {
        let mut cache: TransientCache<u32> = TransientCache::new(3);
        cache.release(1, 100);
        cache.advance_frame();
        cache.advance_frame();
        let v = cache.acquire(1).unwrap();
        cache.release(1, v);
        cache.advance_frame();
        cache.advance_frame();
        assert_eq!(cache.idle_count(), 1, "reinserted entry should not be evicted as stale immediately");
    }
}
