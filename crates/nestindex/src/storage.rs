//! Word-granular storage abstraction
//!
//! Models a small, expensive key/value substrate (e.g. contract storage)
//! where every location holds one 32-byte word. Locations that were never
//! written read as the all-zero word.

use std::collections::HashMap;
use std::sync::Arc;

use ahash::RandomState;
use parking_lot::Mutex;

use crate::error::Result;

/// One 32-byte storage word, used for both locations and values
pub type Word = [u8; 32];

/// The all-zero word returned for unwritten locations
pub const ZERO_WORD: Word = [0u8; 32];

/// Word-addressed key/value store
///
/// The substrate is assumed to serialise writes; the index layer performs
/// no internal locking of its own. Unwritten locations must read as
/// [`ZERO_WORD`].
pub trait SlotStore {
    /// Read the word at `location`
    fn get(&self, location: &Word) -> Result<Word>;

    /// Write `value` at `location`
    fn set(&self, location: &Word, value: Word) -> Result<()>;
}

/// Build the storage location for logical slot number `n`
///
/// The number is little-endian encoded and zero-padded to a full word.
pub(crate) fn location(n: u64) -> Word {
    let mut loc = ZERO_WORD;
    loc[0..8].copy_from_slice(&n.to_le_bytes());
    loc
}

/// In-memory [`SlotStore`] with read/write accounting
///
/// Clones share the same underlying map, so a handle can be kept around to
/// inspect access counts after another clone has moved into an index.
#[derive(Clone, Default)]
pub struct MockSlotStore {
    inner: Arc<Mutex<MockInner>>,
}

#[derive(Default)]
struct MockInner {
    contents: HashMap<Word, Word, RandomState>,
    reads: u64,
    writes: u64,
}

impl MockSlotStore {
    /// Create an empty mock store
    pub fn new() -> Self {
        Self::default()
    }

    /// Total `(reads, writes)` issued against this store since creation
    pub fn access_counts(&self) -> (u64, u64) {
        let inner = self.inner.lock();
        (inner.reads, inner.writes)
    }
}

impl SlotStore for MockSlotStore {
    fn get(&self, location: &Word) -> Result<Word> {
        let mut inner = self.inner.lock();
        inner.reads += 1;
        Ok(inner.contents.get(location).copied().unwrap_or(ZERO_WORD))
    }

    fn set(&self, location: &Word, value: Word) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.writes += 1;
        if value == ZERO_WORD {
            inner.contents.remove(location);
        } else {
            inner.contents.insert(*location, value);
        }
        Ok(())
    }
}
