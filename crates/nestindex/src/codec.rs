//! Binary layout of the index header and table entries
//!
//! Both the header and a table entry pack into a single 32-byte word:
//! - header: four little-endian u64s in the order (capacity, current
//!   generation, current-generation count, in-cache count)
//! - entry: 24 key bytes, then the generation as a little-endian u64
//!
//! Decoding the all-zero word yields the zero header or zero entry;
//! consumers treat generation 0 as "never written".

use crate::storage::{Word, ZERO_WORD};

/// Fixed 24-byte key used inside the index
///
/// External key types are mapped to this width by an adapter; the mapping
/// must be collision-resistant in practice because lane assignment reads
/// byte windows straight out of the canonical key.
pub type CanonicalKey = [u8; 24];

/// Index-wide bookkeeping, stored in one word at slot location 0
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexHeader {
    /// Number of table slots; fixed after initialization
    pub capacity: u64,
    /// Monotonically non-decreasing epoch counter
    pub current_generation: u64,
    /// Number of entries stamped with the current generation
    pub current_gen_count: u64,
    /// Number of entries stamped with the current or previous generation
    pub in_cache_count: u64,
}

/// One table entry: a canonical key and the generation it was last stamped at
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexEntry {
    /// The canonical key occupying this position
    pub key: CanonicalKey,
    /// Generation of the last access; 0 means the position was never written
    pub generation: u64,
}

fn read_u64(word: &Word, at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&word[at..at + 8]);
    u64::from_le_bytes(buf)
}

/// Pack a header into a storage word
pub fn encode_header(header: &IndexHeader) -> Word {
    let mut word = ZERO_WORD;
    word[0..8].copy_from_slice(&header.capacity.to_le_bytes());
    word[8..16].copy_from_slice(&header.current_generation.to_le_bytes());
    word[16..24].copy_from_slice(&header.current_gen_count.to_le_bytes());
    word[24..32].copy_from_slice(&header.in_cache_count.to_le_bytes());
    word
}

/// Unpack a header from a storage word
pub fn decode_header(word: &Word) -> IndexHeader {
    IndexHeader {
        capacity: read_u64(word, 0),
        current_generation: read_u64(word, 8),
        current_gen_count: read_u64(word, 16),
        in_cache_count: read_u64(word, 24),
    }
}

/// Pack a table entry into a storage word
pub fn encode_entry(entry: &IndexEntry) -> Word {
    let mut word = ZERO_WORD;
    word[0..24].copy_from_slice(&entry.key);
    word[24..32].copy_from_slice(&entry.generation.to_le_bytes());
    word
}

/// Unpack a table entry from a storage word
pub fn decode_entry(word: &Word) -> IndexEntry {
    let mut key = [0u8; 24];
    key.copy_from_slice(&word[0..24]);
    IndexEntry {
        key,
        generation: read_u64(word, 24),
    }
}
