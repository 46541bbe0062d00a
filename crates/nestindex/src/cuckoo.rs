//! Generational cuckoo table stored in a [`SlotStore`]
//!
//! Each key has 8 candidate positions (one per lane), derived from disjoint
//! 2-byte windows of its canonical form. Entries are never removed
//! individually; instead every access stamps its entry with the current
//! generation, and bumping the generation expires in bulk the cohort of keys
//! that were not re-accessed during the previous epoch. Relocation therefore
//! only ever overwrites expired positions, and its recursion is capped at
//! [`NUM_LANES`], which bounds storage writes per access.

use tracing::debug;

use crate::codec::{
    decode_entry, decode_header, encode_entry, encode_header, CanonicalKey, IndexEntry,
    IndexHeader,
};
use crate::error::Result;
use crate::storage::{location, SlotStore, Word};

/// log2 of the largest supported table capacity
pub const LOG_MAX_CACHE_SIZE: u64 = 16;

/// Largest supported table capacity
pub const MAX_CACHE_SIZE: u64 = 1 << LOG_MAX_CACHE_SIZE;

/// Number of candidate table positions per key
pub const NUM_LANES: u64 = 8;

/// Bytes of the canonical key consumed per lane when deriving slot numbers
pub const SLICE_SIZE_BYTES: u64 = (LOG_MAX_CACHE_SIZE + 7) / 8;

/// Handle to a cuckoo table living in a slot store
///
/// Opening is lazy: no storage is touched until an operation needs it.
/// Several handles may front the same store, but accesses must be externally
/// serialised; every mutating operation reads the header first and writes it
/// back exactly once at the end.
pub struct CuckooIndex<S: SlotStore> {
    storage: S,
    capacity: u64,
}

impl<S: SlotStore> CuckooIndex<S> {
    /// Open a handle onto the table stored in `storage`
    pub fn open(storage: S, capacity: u64) -> Self {
        Self { storage, capacity }
    }

    /// Write a fresh header for a table of `capacity` slots
    ///
    /// Slots are not zeroed: unwritten locations already read as zero, and
    /// generation 0 is treated as deeply expired. A capacity of 0 or above
    /// [`MAX_CACHE_SIZE`] is a programmer error.
    pub fn initialize(&self, capacity: u64) -> Result<()> {
        debug_assert!(capacity > 0 && capacity <= MAX_CACHE_SIZE);
        self.write_header(&IndexHeader {
            capacity,
            // uninitialized entries must look double-expired
            current_generation: 3,
            current_gen_count: 0,
            in_cache_count: 0,
        })
    }

    /// The capacity this handle was opened with
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Read the table header from slot location 0
    pub fn read_header(&self) -> Result<IndexHeader> {
        Ok(decode_header(&self.storage.get(&location(0))?))
    }

    /// Write the table header to slot location 0
    pub fn write_header(&self, header: &IndexHeader) -> Result<()> {
        self.storage.set(&location(0), encode_header(header))
    }

    /// Read the entry at `(slot, lane)`
    pub fn read_entry(&self, slot: u64, lane: u64) -> Result<IndexEntry> {
        Ok(decode_entry(&self.storage.get(&entry_location(slot, lane))?))
    }

    /// Write the entry at `(slot, lane)`
    pub fn write_entry(&self, slot: u64, lane: u64, entry: &IndexEntry) -> Result<()> {
        self.storage
            .set(&entry_location(slot, lane), encode_entry(entry))
    }

    /// Whether `key` is currently live in the table, without mutating it
    pub fn is_in_cache(&self, header: &IndexHeader, key: &CanonicalKey) -> Result<bool> {
        for lane in 0..NUM_LANES {
            let slot = slot_for_lane(key, lane, header.capacity);
            let entry = self.read_entry(slot, lane)?;
            if entry.key == *key && entry.generation != 0 {
                return Ok(entry.generation + 1 >= header.current_generation);
            }
        }
        Ok(false)
    }

    /// Record an access to `key`, installing it if necessary
    ///
    /// The header is re-written exactly once per mutating access, so a
    /// failed call leaves the table in its last consistent state.
    ///
    /// # Returns
    /// * `(hit, generation_after)` - whether the key was live before the
    ///   access, and the current generation once the access completed
    pub fn access(&self, key: &CanonicalKey) -> Result<(bool, u64)> {
        let mut header = self.read_header()?;
        for lane in 0..NUM_LANES {
            let slot = slot_for_lane(key, lane, header.capacity);
            let mut entry = self.read_entry(slot, lane)?;
            if entry.key == *key {
                let cached_generation = entry.generation;
                if cached_generation == header.current_generation {
                    return Ok((true, header.current_generation));
                } else if cached_generation + 1 == header.current_generation {
                    entry.generation = header.current_generation;
                    self.write_entry(slot, lane, &entry)?;
                    header.current_gen_count += 1;
                    advance_generation_if_needed(&mut header);
                    self.write_header(&header)?;
                    return Ok((true, header.current_generation));
                } else {
                    // the key is in the table but expired
                    entry.generation = header.current_generation;
                    self.write_entry(slot, lane, &entry)?;
                    header.current_gen_count += 1;
                    header.in_cache_count += 1;
                    advance_generation_if_needed(&mut header);
                    self.write_header(&header)?;
                    return Ok((false, header.current_generation));
                }
            } else if entry.generation + 1 < header.current_generation {
                // the occupant is expired, so claim its position; a later
                // lane may still hold the key at the previous generation,
                // in which case it is already counted as in-cache
                self.write_entry(
                    slot,
                    lane,
                    &IndexEntry {
                        key: *key,
                        generation: header.current_generation,
                    },
                )?;
                header.current_gen_count += 1;
                let was_in_old_generation =
                    self.find_exact_match(key, header.current_generation - 1, lane + 1, &header)?;
                if !was_in_old_generation {
                    header.in_cache_count += 1;
                }
                advance_generation_if_needed(&mut header);
                self.write_header(&header)?;
                return Ok((was_in_old_generation, header.current_generation));
            }
        }

        // every lane is occupied by a live entry: displace lane 0 and let
        // the cuckoo cascade find room for its previous occupant
        let slot = slot_for_lane(key, 0, header.capacity);
        let displaced = self.read_entry(slot, 0)?;
        self.write_entry(
            slot,
            0,
            &IndexEntry {
                key: *key,
                generation: header.current_generation,
            },
        )?;
        header.current_gen_count += 1;
        header.in_cache_count += 1;
        self.relocate(displaced, 1, &mut header)?;
        advance_generation_if_needed(&mut header);
        self.write_header(&header)?;
        Ok((false, header.current_generation))
    }

    /// Scan lanes from `start_lane` for `key`; true iff it is found with
    /// generation exactly `target_generation`
    fn find_exact_match(
        &self,
        key: &CanonicalKey,
        target_generation: u64,
        start_lane: u64,
        header: &IndexHeader,
    ) -> Result<bool> {
        for lane in start_lane..NUM_LANES {
            let slot = slot_for_lane(key, lane, header.capacity);
            let entry = self.read_entry(slot, lane)?;
            if entry.key == *key {
                return Ok(entry.generation == target_generation);
            } else if entry.generation < target_generation - 1 {
                // a live copy of the key would have overwritten this
                // position already
                return Ok(false);
            }
        }
        Ok(false)
    }

    fn relocate(&self, entry: IndexEntry, tries_so_far: u64, header: &mut IndexHeader) -> Result<()> {
        if tries_so_far >= NUM_LANES {
            // no vacancy even after several displacements; drop the entry
            // (negligible probability at the operating load factor)
            debug!(tries = tries_so_far, "relocation failed, discarding entry");
            if entry.generation == header.current_generation {
                header.current_gen_count -= 1;
                header.in_cache_count -= 1;
            } else if entry.generation + 1 == header.current_generation {
                header.in_cache_count -= 1;
            }
            return Ok(());
        }

        for lane in 0..NUM_LANES {
            let slot = slot_for_lane(&entry.key, lane, header.capacity);
            let occupant = self.read_entry(slot, lane)?;
            if occupant.key == entry.key {
                // duplicate of the displaced key; keep the newer stamp
                if occupant.generation < entry.generation {
                    self.write_entry(slot, lane, &entry)?;
                }
                return Ok(());
            } else if occupant.generation + 1 < header.current_generation {
                return self.write_entry(slot, lane, &entry);
            }
        }

        // no expired position either; kick out the occupant at the lane
        // numbered by the current try and recurse
        let slot = slot_for_lane(&entry.key, tries_so_far, header.capacity);
        let displaced = self.read_entry(slot, tries_so_far)?;
        self.write_entry(slot, tries_so_far, &entry)?;
        self.relocate(displaced, tries_so_far + 1, header)
    }

    /// Expire every entry at once by advancing the generation past them all
    ///
    /// Entry slots are untouched; they become invisible to
    /// [`CuckooIndex::is_in_cache`] because their stamps are now at least
    /// three generations old.
    pub fn flush_all(&self) -> Result<()> {
        let mut header = self.read_header()?;
        header.current_generation += 3;
        header.current_gen_count = 0;
        header.in_cache_count = 0;
        debug!(
            generation = header.current_generation,
            "flushed entire index"
        );
        self.write_header(&header)
    }

    /// Expire a single key
    ///
    /// Matching entries are re-stamped two generations back, which makes
    /// them deeply expired. Counts are not adjusted here; they self-correct
    /// at the next generation advancement.
    pub fn flush_one(&self, key: &CanonicalKey) -> Result<()> {
        let header = self.read_header()?;
        for lane in 0..NUM_LANES {
            let slot = slot_for_lane(key, lane, header.capacity);
            let mut entry = self.read_entry(slot, lane)?;
            if entry.generation + 3 <= header.current_generation {
                // anything past this point is already deeply expired
                return Ok(());
            } else if entry.key == *key && entry.generation != 0 {
                entry.generation = header.current_generation - 2;
                self.write_entry(slot, lane, &entry)?;
            }
        }
        Ok(())
    }

    /// Fold `f` over every live entry
    ///
    /// `f` receives the key, whether the entry is stamped with the current
    /// generation, and the accumulator. Each live entry is visited exactly
    /// once, in `(slot, lane)` row-major order.
    pub fn for_all_live<A, F>(&self, mut f: F, acc: A) -> Result<A>
    where
        F: FnMut(CanonicalKey, bool, A) -> A,
    {
        let mut acc = acc;
        let header = self.read_header()?;
        for slot in 0..header.capacity {
            for lane in 0..NUM_LANES {
                let entry = self.read_entry(slot, lane)?;
                if entry.generation + 1 >= header.current_generation {
                    acc = f(
                        entry.key,
                        entry.generation == header.current_generation,
                        acc,
                    );
                }
            }
        }
        Ok(acc)
    }
}

fn entry_location(slot: u64, lane: u64) -> Word {
    location(1 + lane + NUM_LANES * slot)
}

/// Candidate slot for `key` in `lane`: a 2-byte big-endian window of the
/// canonical key, reduced modulo the capacity
fn slot_for_lane(key: &CanonicalKey, lane: u64, capacity: u64) -> u64 {
    let mut value = 0u64;
    let start = (lane * SLICE_SIZE_BYTES) as usize;
    for &byte in &key[start..start + SLICE_SIZE_BYTES as usize] {
        value = (value << 8) + u64::from(byte);
    }
    value % capacity
}

fn advance_generation_if_needed(header: &mut IndexHeader) {
    while header.in_cache_count > header.capacity
        || header.current_gen_count > 3 * header.capacity / 4
    {
        header.current_generation += 1;
        header.in_cache_count = header.current_gen_count;
        header.current_gen_count = 0;
        debug!(
            generation = header.current_generation,
            live = header.in_cache_count,
            "advanced index generation"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::storage::MockSlotStore;
    use tiny_keccak::{Hasher, Keccak};

    fn key_from_u64(key: u64) -> CanonicalKey {
        let mut hasher = Keccak::v256();
        hasher.update(&key.to_le_bytes());
        let mut digest = [0u8; 32];
        hasher.finalize(&mut digest);
        let mut ret = [0u8; 24];
        ret.copy_from_slice(&digest[0..24]);
        ret
    }

    /// Access roughly `capacity` distinct keys to force a generation shift
    fn spray(index: &CuckooIndex<MockSlotStore>, seed: u64) {
        let capacity = index.read_header().unwrap().capacity;
        let modulus = 11 * capacity / 7;
        for i in seed..seed + capacity {
            index.access(&key_from_u64(seed + (i % modulus))).unwrap();
        }
    }

    fn count_live(index: &CuckooIndex<MockSlotStore>) -> u64 {
        index
            .for_all_live(|_key, _current, count| count + 1, 0u64)
            .unwrap()
    }

    fn verify_generation_counts(index: &CuckooIndex<MockSlotStore>) {
        let header = index.read_header().unwrap();
        let current = index
            .for_all_live(
                |_key, is_current, count| if is_current { count + 1 } else { count },
                0u64,
            )
            .unwrap();
        assert_eq!(current, header.current_gen_count);
        assert_eq!(count_live(index), header.in_cache_count);

        // no key may be live in two positions at once
        let live_keys = index
            .for_all_live(
                |key, _current, mut keys: Vec<CanonicalKey>| {
                    keys.push(key);
                    keys
                },
                Vec::new(),
            )
            .unwrap();
        let distinct: std::collections::HashSet<CanonicalKey> =
            live_keys.iter().copied().collect();
        assert_eq!(distinct.len(), live_keys.len());
    }

    #[test]
    fn test_access_and_bulk_expiry() {
        let capacity = 32u64;
        let storage = MockSlotStore::new();
        let index = CuckooIndex::open(storage.clone(), capacity);
        index.initialize(capacity).unwrap();

        // uninitialized positions must not read as present
        let header = index.read_header().unwrap();
        assert!(!index.is_in_cache(&header, &key_from_u64(0)).unwrap());
        assert!(!index.is_in_cache(&header, &key_from_u64(31)).unwrap());
        verify_generation_counts(&index);

        // almost fill the table and verify everything stays live
        for i in 0..capacity - 2 {
            index.access(&key_from_u64(i)).unwrap();
            verify_generation_counts(&index);
            assert_eq!(count_live(&index), i + 1);
        }

        // a second handle over the same storage sees the same table
        let index = CuckooIndex::open(storage.clone(), capacity);
        let header = index.read_header().unwrap();
        for i in 0..capacity - 2 {
            assert!(index.is_in_cache(&header, &key_from_u64(i)).unwrap());
        }
        assert_eq!(header.in_cache_count, capacity - 2);
        verify_generation_counts(&index);

        // push past capacity; the generation shift must expire someone
        for i in capacity - 2..capacity + 1 {
            let index = CuckooIndex::open(storage.clone(), capacity);
            index.access(&key_from_u64(i)).unwrap();
            verify_generation_counts(&index);
        }
        let index = CuckooIndex::open(storage.clone(), capacity);
        let header = index.read_header().unwrap();
        let mut found_them_all = true;
        for i in 0..capacity + 1 {
            if !index.is_in_cache(&header, &key_from_u64(i)).unwrap() {
                found_them_all = false;
            }
        }
        assert!(!found_them_all);
        verify_generation_counts(&index);

        // a freshly accessed key is always live afterwards
        spray(&index, 98113084);
        verify_generation_counts(&index);
        index.access(&key_from_u64(58712)).unwrap();
        let header = index.read_header().unwrap();
        assert!(index.is_in_cache(&header, &key_from_u64(58712)).unwrap());
    }

    #[test]
    fn test_flush_one_and_flush_all() {
        let capacity = 32u64;
        let index = CuckooIndex::open(MockSlotStore::new(), capacity);
        index.initialize(capacity).unwrap();

        spray(&index, 98113084);
        index.access(&key_from_u64(42)).unwrap();
        let header = index.read_header().unwrap();
        assert!(index.is_in_cache(&header, &key_from_u64(42)).unwrap());

        index.flush_one(&key_from_u64(42)).unwrap();
        assert!(!index.is_in_cache(&header, &key_from_u64(42)).unwrap());

        index.access(&key_from_u64(42)).unwrap();
        index.flush_all().unwrap();
        let header = index.read_header().unwrap();
        assert!(!index.is_in_cache(&header, &key_from_u64(42)).unwrap());
        assert_eq!(header.in_cache_count, 0);
        assert_eq!(header.current_gen_count, 0);
    }

    /// Key whose lane windows all decode to small fixed slot numbers, so
    /// that differently-tagged keys collide on every lane
    fn colliding_key(tag: u8) -> CanonicalKey {
        let mut key = [0u8; 24];
        for lane in 0..NUM_LANES as usize {
            key[lane * 2] = 0;
            key[lane * 2 + 1] = lane as u8;
        }
        key[16] = tag;
        key
    }

    #[test]
    fn test_relocation_discards_when_every_lane_is_live() {
        let capacity = 32u64;
        let index = CuckooIndex::open(MockSlotStore::new(), capacity);
        index.initialize(capacity).unwrap();

        // eight keys with identical lane windows fill one probe path
        for tag in 1..=8u8 {
            let (hit, _) = index.access(&colliding_key(tag)).unwrap();
            assert!(!hit);
            verify_generation_counts(&index);
        }
        assert_eq!(count_live(&index), 8);

        // the ninth forces a full cascade; the last displaced entry is
        // dropped and the counts must absorb it
        let (hit, _) = index.access(&colliding_key(9)).unwrap();
        assert!(!hit);
        verify_generation_counts(&index);
        assert_eq!(count_live(&index), 8);

        let header = index.read_header().unwrap();
        assert!(index.is_in_cache(&header, &colliding_key(9)).unwrap());
        assert!(!index.is_in_cache(&header, &colliding_key(8)).unwrap());
        for tag in 1..=7u8 {
            assert!(index.is_in_cache(&header, &colliding_key(tag)).unwrap());
        }
    }

    struct FailingSlotStore;

    impl SlotStore for FailingSlotStore {
        fn get(&self, _location: &Word) -> Result<Word> {
            Err(Error::StorageGet("backend offline".to_string()))
        }

        fn set(&self, _location: &Word, _value: Word) -> Result<()> {
            Err(Error::StorageSet("backend offline".to_string()))
        }
    }

    #[test]
    fn test_storage_errors_propagate() {
        let index = CuckooIndex::open(FailingSlotStore, 32);

        assert!(matches!(
            index.access(&key_from_u64(1)),
            Err(Error::StorageGet(_))
        ));
        assert!(matches!(index.flush_all(), Err(Error::StorageGet(_))));
        assert!(matches!(index.initialize(32), Err(Error::StorageSet(_))));
    }
}
