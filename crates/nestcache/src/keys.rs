//! Key adapters mapping external key types to canonical index keys

use std::hash::Hash;

use nestindex::CanonicalKey;
use tiny_keccak::{Hasher, Keccak};

/// External key type usable with the local cache
///
/// Equal keys must map to equal canonical forms, and the mapping must be
/// collision-resistant in practice: the index derives lane assignments from
/// byte windows of the canonical key, so structured canonical forms would
/// cluster keys onto the same slots.
pub trait CacheKey: Eq + Hash + Clone {
    /// Map this key to the fixed 24-byte form used inside the index
    fn to_canonical(&self) -> CanonicalKey;
}

pub(crate) fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut digest = [0u8; 32];
    hasher.finalize(&mut digest);
    digest
}

/// 64-bit integer key
///
/// The canonical form is the keccak-256 digest of the little-endian
/// encoding, truncated to 24 bytes; it is computed once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct U64Key {
    key: u64,
    canonical: CanonicalKey,
}

impl U64Key {
    /// Wrap an integer key, precomputing its canonical form
    pub fn new(key: u64) -> Self {
        let digest = keccak256(&key.to_le_bytes());
        let mut canonical = [0u8; 24];
        canonical.copy_from_slice(&digest[0..24]);
        Self { key, canonical }
    }

    /// The wrapped integer
    pub fn value(&self) -> u64 {
        self.key
    }
}

impl CacheKey for U64Key {
    fn to_canonical(&self) -> CanonicalKey {
        self.canonical
    }
}

/// 20-byte account address key
///
/// Addresses are already hash-derived, so no second hash is taken: the
/// canonical form is the address bytes with the tail filled by a copy of
/// the first four.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressKey([u8; 20]);

impl AddressKey {
    /// Wrap an address
    pub fn new(address: [u8; 20]) -> Self {
        Self(address)
    }

    /// The wrapped address bytes
    pub fn bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl CacheKey for AddressKey {
    fn to_canonical(&self) -> CanonicalKey {
        let mut ret = [0u8; 24];
        ret[0..20].copy_from_slice(&self.0);
        ret.copy_within(0..4, 20);
        ret
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u64_key_is_deterministic() {
        let a = U64Key::new(12345);
        let b = U64Key::new(12345);

        assert_eq!(a, b);
        assert_eq!(a.to_canonical(), b.to_canonical());
        assert_eq!(a.value(), 12345);
    }

    #[test]
    fn test_u64_keys_differ() {
        assert_ne!(
            U64Key::new(1).to_canonical(),
            U64Key::new(2).to_canonical()
        );
    }

    #[test]
    fn test_address_key_layout() {
        let mut address = [0u8; 20];
        for (i, byte) in address.iter_mut().enumerate() {
            *byte = i as u8 + 1;
        }
        let canonical = AddressKey::new(address).to_canonical();

        assert_eq!(&canonical[0..20], &address);
        assert_eq!(&canonical[20..24], &address[0..4]);
    }
}
