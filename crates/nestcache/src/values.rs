//! Payload providers backing the local cache

use std::collections::HashMap;

use ahash::RandomState;

use crate::keys::{keccak256, CacheKey};

/// Maps keys to payload bytes
///
/// A total function: every key has a payload. Failure handling, if any,
/// belongs to the implementation behind this interface.
pub trait ValueStore<K> {
    /// Fetch the payload for `key`
    fn read(&self, key: &K) -> Vec<u8>;
}

/// Deterministic in-memory value store for tests and trace evaluation
///
/// Keys without an explicit payload yield pseudo-random bytes derived from
/// the canonical key, so repeated reads of an untouched key agree.
#[derive(Debug, Clone)]
pub struct MockValueStore<K: CacheKey> {
    contents: HashMap<K, Vec<u8>, RandomState>,
}

impl<K: CacheKey> MockValueStore<K> {
    /// Create an empty mock store
    pub fn new() -> Self {
        Self {
            contents: HashMap::default(),
        }
    }

    /// Give `key` an explicit payload
    pub fn insert(&mut self, key: K, value: Vec<u8>) {
        self.contents.insert(key, value);
    }
}

impl<K: CacheKey> Default for MockValueStore<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: CacheKey> ValueStore<K> for MockValueStore<K> {
    fn read(&self, key: &K) -> Vec<u8> {
        match self.contents.get(key) {
            Some(value) => value.clone(),
            None => keccak256(&key.to_canonical()).to_vec(),
        }
    }
}
