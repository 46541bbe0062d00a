//! Local node cache: an LRU of payloads layered on the shared index
//!
//! Uses an arena-backed doubly-linked list for O(1) splicing and eviction;
//! nodes are addressed by small indices, so no raw pointers are involved.

use std::collections::HashMap;

use ahash::RandomState;
use nestindex::{CuckooIndex, Result, SlotStore};
use tracing::debug;

use crate::keys::CacheKey;
use crate::stats::CacheStats;
use crate::values::ValueStore;

/// Node in the LRU doubly-linked list
struct LruNode<K> {
    key: K,
    value: Vec<u8>,
    more_recent: Option<usize>,
    less_recent: Option<usize>,
    /// Index generation current when this node was last touched
    generation: u64,
}

/// Payload cache kept convergent with the shared index
///
/// Every read first records the access in the shared [`CuckooIndex`], so any
/// key that stays live there keeps getting refreshed here too. A cache that
/// cold-starts against a warm index may miss on keys the index considers
/// cached, but once the index has advanced two generations past the cache's
/// creation, every live index key is present locally (the subset property),
/// and the property persists from then on. This relies on the local capacity
/// being at least the index capacity, which the constructor enforces.
pub struct LocalCache<K, S, V>
where
    K: CacheKey,
    S: SlotStore,
    V: ValueStore<K>,
{
    index: CuckooIndex<S>,
    local_capacity: u64,
    num_in_cache: u64,
    map: HashMap<K, usize, RandomState>,
    nodes: Vec<Option<LruNode<K>>>,
    free_list: Vec<usize>,
    mru: Option<usize>,
    lru: Option<usize>,
    values: V,
    stats: CacheStats,
}

impl<K, S, V> LocalCache<K, S, V>
where
    K: CacheKey,
    S: SlotStore,
    V: ValueStore<K>,
{
    /// Create a local cache over `index`, fetching payloads from `values`
    ///
    /// # Arguments
    /// * `index` - Shared cuckoo index to front
    /// * `local_capacity` - Maximum number of locally cached payloads;
    ///   raised to the index capacity if smaller, since a smaller local
    ///   cache could keep missing keys that persistently hit the index
    /// * `values` - Payload provider consulted on local misses
    ///
    /// # Returns
    /// * `Result<LocalCache>` - Fails only if the index header cannot be read
    pub fn new(index: CuckooIndex<S>, local_capacity: u64, values: V) -> Result<Self> {
        let header = index.read_header()?;
        let local_capacity = local_capacity.max(header.capacity);
        Ok(Self {
            index,
            local_capacity,
            num_in_cache: 0,
            map: HashMap::with_capacity_and_hasher(local_capacity as usize, RandomState::new()),
            nodes: Vec::with_capacity(local_capacity as usize),
            free_list: Vec::new(),
            mru: None,
            lru: None,
            values,
            stats: CacheStats::new(),
        })
    }

    /// Whether `key` currently has a node in the local LRU
    pub fn is_in_local(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Index generation observed when `key` was last read, if it is cached
    pub fn last_seen_generation(&self, key: &K) -> Option<u64> {
        self.map
            .get(key)
            .and_then(|&idx| self.nodes[idx].as_ref())
            .map(|node| node.generation)
    }

    /// Read the payload for `key`
    ///
    /// Records the access in the shared index first; if that fails, the
    /// error is returned and the LRU is left untouched.
    ///
    /// # Returns
    /// * `Result<(Vec<u8>, bool)>` - The payload, and whether the key was
    ///   live in the shared index before this access
    pub fn read(&mut self, key: &K) -> Result<(Vec<u8>, bool)> {
        let (hit_in_index, generation_after) = self.index.access(&key.to_canonical())?;
        if hit_in_index {
            self.stats.record_index_hit();
        }

        let idx = match self.map.get(key).copied() {
            Some(idx) => {
                self.stats.record_local_hit();
                self.move_to_front(idx);
                idx
            }
            None => {
                self.stats.record_local_miss();
                if self.num_in_cache == self.local_capacity {
                    self.evict_lru();
                }
                let value = self.values.read(key);
                let idx = self.alloc_node();
                self.nodes[idx] = Some(LruNode {
                    key: key.clone(),
                    value,
                    more_recent: None,
                    less_recent: self.mru,
                    generation: 0,
                });
                if let Some(prev_mru) = self.mru {
                    if let Some(node) = &mut self.nodes[prev_mru] {
                        node.more_recent = Some(idx);
                    }
                }
                self.mru = Some(idx);
                if self.lru.is_none() {
                    self.lru = Some(idx);
                }
                self.map.insert(key.clone(), idx);
                self.num_in_cache += 1;
                idx
            }
        };

        let mut payload = Vec::new();
        if let Some(node) = &mut self.nodes[idx] {
            node.generation = generation_after;
            payload = node.value.clone();
        }
        Ok((payload, hit_in_index))
    }

    /// Drop every locally cached payload
    ///
    /// With `also_flush_index`, the shared index is flushed as well.
    pub fn flush_all(&mut self, also_flush_index: bool) -> Result<()> {
        self.map.clear();
        self.nodes.clear();
        self.free_list.clear();
        self.mru = None;
        self.lru = None;
        self.num_in_cache = 0;
        debug!(flush_index = also_flush_index, "flushed local cache");
        if also_flush_index {
            self.index.flush_all()?;
        }
        Ok(())
    }

    /// Drop the locally cached payload for `key`, if present
    ///
    /// With `also_flush_index`, the key is expired in the shared index too.
    pub fn flush_one(&mut self, key: &K, also_flush_index: bool) -> Result<()> {
        if let Some(idx) = self.map.remove(key) {
            self.unlink(idx);
            self.nodes[idx] = None;
            self.free_list.push(idx);
            self.num_in_cache -= 1;
        }
        if also_flush_index {
            self.index.flush_one(&key.to_canonical())?;
        }
        Ok(())
    }

    /// Fold `f` over every cached entry, most recently used first
    pub fn for_all<A, F>(&self, mut f: F, acc: A) -> A
    where
        F: FnMut(&K, &[u8], A) -> A,
    {
        let mut acc = acc;
        let mut cursor = self.mru;
        while let Some(idx) = cursor {
            match &self.nodes[idx] {
                Some(node) => {
                    acc = f(&node.key, &node.value, acc);
                    cursor = node.less_recent;
                }
                None => break,
            }
        }
        acc
    }

    /// Number of locally cached entries
    pub fn len(&self) -> u64 {
        self.num_in_cache
    }

    /// Whether the local cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.num_in_cache == 0
    }

    /// The effective local capacity (never below the index capacity)
    pub fn local_capacity(&self) -> u64 {
        self.local_capacity
    }

    /// The shared index this cache fronts
    pub fn index(&self) -> &CuckooIndex<S> {
        &self.index
    }

    /// Performance counters for this cache
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.mru == Some(idx) {
            return;
        }

        self.unlink(idx);

        if let Some(node) = &mut self.nodes[idx] {
            node.more_recent = None;
            node.less_recent = self.mru;
        }
        if let Some(prev_mru) = self.mru {
            if let Some(node) = &mut self.nodes[prev_mru] {
                node.more_recent = Some(idx);
            }
        }
        self.mru = Some(idx);
        if self.lru.is_none() {
            self.lru = Some(idx);
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (more, less) = match &self.nodes[idx] {
            Some(node) => (node.more_recent, node.less_recent),
            None => return,
        };

        match more {
            Some(more_idx) => {
                if let Some(node) = &mut self.nodes[more_idx] {
                    node.less_recent = less;
                }
            }
            None => self.mru = less,
        }

        match less {
            Some(less_idx) => {
                if let Some(node) = &mut self.nodes[less_idx] {
                    node.more_recent = more;
                }
            }
            None => self.lru = more,
        }
    }

    fn evict_lru(&mut self) {
        if let Some(tail_idx) = self.lru {
            self.unlink(tail_idx);
            if let Some(node) = self.nodes[tail_idx].take() {
                self.map.remove(&node.key);
                self.num_in_cache -= 1;
                self.stats.record_eviction();
                debug!("evicted least recently used entry");
            }
            self.free_list.push(tail_idx);
        }
    }

    fn alloc_node(&mut self) -> usize {
        match self.free_list.pop() {
            Some(idx) => idx,
            None => {
                self.nodes.push(None);
                self.nodes.len() - 1
            }
        }
    }
}
