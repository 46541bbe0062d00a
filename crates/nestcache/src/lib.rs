//! # nestcache
//!
//! Local node cache layered on the shared [`nestindex`] cuckoo index.
//!
//! ## Architecture
//! - **Key adapters**: map external key types onto 24-byte canonical keys
//! - **LRU list**: arena-backed doubly-linked list for O(1) eviction
//! - **ValueStore**: payload provider consulted on local misses
//! - **Convergence**: every read touches the shared index first, so the
//!   local cache grows into a superset of the index within two of its
//!   generations, even from a cold start
//! - **Evaluator**: trace replay reporting per-tier hits and storage I/O

#![warn(missing_docs)]

mod cache;
mod eval;
mod keys;
mod stats;
mod values;

pub use cache::LocalCache;
pub use eval::{evaluate_trace, TraceReport};
pub use keys::{AddressKey, CacheKey, U64Key};
pub use stats::CacheStats;
pub use values::{MockValueStore, ValueStore};

pub use nestindex::{Error, Result};
