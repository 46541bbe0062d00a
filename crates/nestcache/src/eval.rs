//! Trace replay harness
//!
//! Replays an access trace against a fresh mock-backed cache pair and
//! reports hit counts for both tiers plus the storage traffic the replay
//! generated. Useful for sizing experiments and for pinning down the
//! generation-advancement behavior in tests.

use nestindex::{CuckooIndex, MockSlotStore, Result};

use crate::cache::LocalCache;
use crate::keys::CacheKey;
use crate::values::MockValueStore;

/// Outcome of replaying one access trace
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraceReport {
    /// Accesses that found their key live in the shared index
    pub index_hits: u64,
    /// Accesses that found their payload already in the local cache
    pub local_hits: u64,
    /// Slot-store reads issued during the replay
    pub storage_reads: u64,
    /// Slot-store writes issued during the replay
    pub storage_writes: u64,
}

/// Replay `trace` against a fresh mock-backed cache pair
///
/// # Arguments
/// * `index_capacity` - Slots in the shared index
/// * `local_capacity` - Entries in the local cache
/// * `trace` - Keys in access order
///
/// # Returns
/// * `Result<TraceReport>` - Hit counts and storage traffic of the replay
pub fn evaluate_trace<K: CacheKey>(
    index_capacity: u64,
    local_capacity: u64,
    trace: &[K],
) -> Result<TraceReport> {
    let storage = MockSlotStore::new();
    let index = CuckooIndex::open(storage.clone(), index_capacity);
    index.initialize(index_capacity)?;
    let mut cache = LocalCache::new(index, local_capacity, MockValueStore::new())?;

    let (reads_before, writes_before) = storage.access_counts();
    let mut report = TraceReport::default();
    for key in trace {
        if cache.is_in_local(key) {
            report.local_hits += 1;
        }
        let (_, hit) = cache.read(key)?;
        if hit {
            report.index_hits += 1;
        }
    }

    let (reads, writes) = storage.access_counts();
    report.storage_reads = reads - reads_before;
    report.storage_writes = writes - writes_before;
    Ok(report)
}
