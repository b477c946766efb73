//! Reusable per-worker scratch state for path queries
//!
//! The parent array is split into fixed-size chunks. A query marks the chunk
//! of every node it settles, and the next query clears only those chunks, so
//! the reset cost follows the work done rather than the graph size.

use parking_lot::{Mutex, MutexGuard};
use priority_queue::PriorityQueue;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;

/// Nodes per dirty flag
pub const CHUNK_SIZE: usize = 1024;

pub(crate) const UNSET: u32 = u32::MAX;

/// Queue entry for a node that has been reached but not settled
#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate {
    /// Ordering key: cost plus heuristic
    pub key: f64,
    pub cost: f64,
    pub parent: u32,
    pub link: u32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    // Reversed so that the queue pops the smallest key first
    fn cmp(&self, other: &Self) -> Ordering {
        other.key.total_cmp(&self.key)
    }
}

pub struct QueryCache {
    parent: Vec<u32>,
    via_link: Vec<u32>,
    dirty: Vec<bool>,
    pub(crate) queue: PriorityQueue<u32, Candidate>,
    /// Straight-line lower bounds computed during the current A* query
    pub(crate) heuristic: FxHashMap<u32, f64>,
}

impl QueryCache {
    pub fn new(node_count: usize) -> Self {
        Self {
            parent: vec![UNSET; node_count],
            via_link: vec![UNSET; node_count],
            dirty: vec![false; node_count.div_ceil(CHUNK_SIZE)],
            queue: PriorityQueue::new(),
            heuristic: FxHashMap::default(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.parent.len()
    }

    /// Clear only the chunks touched since the last reset
    pub fn reset(&mut self) {
        for (chunk, dirty) in self.dirty.iter_mut().enumerate() {
            if !*dirty {
                continue;
            }
            let start = chunk * CHUNK_SIZE;
            let end = (start + CHUNK_SIZE).min(self.parent.len());
            self.parent[start..end].fill(UNSET);
            self.via_link[start..end].fill(UNSET);
            *dirty = false;
        }
        self.queue.clear();
        self.heuristic.clear();
    }

    pub(crate) fn settle(&mut self, node: u32, parent: u32, link: u32) {
        let i = node as usize;
        self.parent[i] = parent;
        self.via_link[i] = link;
        self.dirty[i / CHUNK_SIZE] = true;
    }

    pub fn is_settled(&self, node: u32) -> bool {
        self.parent[node as usize] != UNSET
    }

    /// Predecessor of a settled node; the origin is its own parent
    pub fn parent(&self, node: u32) -> Option<u32> {
        match self.parent[node as usize] {
            UNSET => None,
            p => Some(p),
        }
    }

    /// Link used to reach a settled node, `None` for the origin
    pub fn via_link(&self, node: u32) -> Option<u32> {
        match self.via_link[node as usize] {
            UNSET => None,
            l => Some(l),
        }
    }

    pub fn dirty_chunks(&self) -> usize {
        self.dirty.iter().filter(|&&d| d).count()
    }
}

/// One cache per rayon worker, allocated once and reused across parallel passes
///
/// Workers pick their slot by thread index; the lock is only ever contended
/// when the pool is used from threads outside the pool it was sized for.
pub struct CachePool {
    caches: Vec<Mutex<QueryCache>>,
}

impl CachePool {
    /// Sized to the current rayon pool
    pub fn new(node_count: usize) -> Self {
        Self::with_workers(node_count, rayon::current_num_threads())
    }

    pub fn with_workers(node_count: usize, workers: usize) -> Self {
        Self {
            caches: (0..workers.max(1))
                .map(|_| Mutex::new(QueryCache::new(node_count)))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }

    /// The calling worker's cache; hold the guard for a whole chunk of queries
    pub fn for_current_thread(&self) -> MutexGuard<'_, QueryCache> {
        let slot = rayon::current_thread_index().unwrap_or(0) % self.caches.len();
        self.caches[slot].lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_cache_is_clean() {
        let cache = QueryCache::new(3000);
        assert_eq!(cache.node_count(), 3000);
        assert_eq!(cache.dirty_chunks(), 0);
        assert!(!cache.is_settled(2999));
    }

    #[test]
    fn test_reset_clears_only_dirty_chunks() {
        let mut cache = QueryCache::new(3 * CHUNK_SIZE);
        cache.settle(5, 5, UNSET);
        cache.settle(2 * CHUNK_SIZE as u32 + 1, 5, 7);
        assert_eq!(cache.dirty_chunks(), 2);
        assert_eq!(cache.parent(5), Some(5));
        assert_eq!(cache.via_link(5), None);
        assert_eq!(cache.via_link(2 * CHUNK_SIZE as u32 + 1), Some(7));

        cache.reset();
        assert_eq!(cache.dirty_chunks(), 0);
        assert!(!cache.is_settled(5));
        assert!(!cache.is_settled(2 * CHUNK_SIZE as u32 + 1));
    }

    #[test]
    fn test_partial_last_chunk() {
        let mut cache = QueryCache::new(CHUNK_SIZE + 10);
        cache.settle(CHUNK_SIZE as u32 + 9, 0, 0);
        cache.reset();
        assert!(!cache.is_settled(CHUNK_SIZE as u32 + 9));
    }

    #[test]
    fn test_candidate_ordering_pops_lowest_key() {
        let mut queue: PriorityQueue<u32, Candidate> = PriorityQueue::new();
        let c = |key| Candidate {
            key,
            cost: key,
            parent: 0,
            link: 0,
        };
        queue.push(1, c(5.0));
        queue.push(2, c(1.0));
        queue.push(3, c(3.0));
        assert_eq!(queue.pop().map(|(n, _)| n), Some(2));

        // only a strictly lower cost replaces an entry
        queue.push_increase(1, c(7.0));
        assert_eq!(queue.get_priority(&1).map(|p| p.key), Some(5.0));
        queue.push_increase(1, c(0.5));
        assert_eq!(queue.pop().map(|(n, p)| (n, p.key)), Some((1, 0.5)));
    }

    #[test]
    fn test_pool_reuses_worker_caches() {
        let pool = CachePool::with_workers(2 * CHUNK_SIZE, 3);
        assert_eq!(pool.len(), 3);
        {
            let mut cache = pool.for_current_thread();
            assert_eq!(cache.node_count(), 2 * CHUNK_SIZE);
            cache.settle(CHUNK_SIZE as u32, CHUNK_SIZE as u32, UNSET);
        }
        // the same slot comes back with the state the last query left
        let cache = pool.for_current_thread();
        assert_eq!(cache.dirty_chunks(), 1);
        assert_eq!(CachePool::with_workers(10, 0).len(), 1);
    }
}
