//! # nestindex
//!
//! Shared cache-membership index: a generational cuckoo hash table stored
//! in word-granular key/value storage.
//!
//! ## Architecture
//! - **SlotStore**: abstract 32-byte-word substrate; one header word plus
//!   8 lanes per table slot
//! - **Codec**: fixed little-endian packing of the header and entries
//! - **CuckooIndex**: access protocol, relocation, bulk expiry via
//!   generation advancement, flush, and live-entry traversal
//!
//! The table never stores payloads; it only records which keys are
//! currently considered cached, cheaply enough to update on every access.

#![warn(missing_docs)]

mod codec;
mod cuckoo;
mod error;
mod storage;

pub use codec::{
    decode_entry, decode_header, encode_entry, encode_header, CanonicalKey, IndexEntry,
    IndexHeader,
};
pub use cuckoo::{
    CuckooIndex, LOG_MAX_CACHE_SIZE, MAX_CACHE_SIZE, NUM_LANES, SLICE_SIZE_BYTES,
};
pub use error::{Error, Result};
pub use storage::{MockSlotStore, SlotStore, Word, ZERO_WORD};
