// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::{Hash, HashedKey};
use murmur3::murmur3_x64_128;
use std::hash::Hasher;

/// Algorithm used as the hasher for the Hamt.
pub trait HashAlgorithm {
    fn hash<X: ?Sized>(key: &X) -> HashedKey
    where
        X: Hash;
}

/// Type is needed because murmur hashes a finished byte buffer rather than
/// implementing `std::hash::Hasher` incrementally.
#[derive(Default)]
struct Murmur3Hasher(Vec<u8>);

impl Hasher for Murmur3Hasher {
    fn finish(&self) -> u64 {
        // u64 hash not used in hamt
        0
    }

    fn write(&mut self, bytes: &[u8]) {
        self.0.extend_from_slice(bytes);
    }
}

/// Murmur3 x64 hash, truncated to the first 64-bit lane in big-endian byte
/// order. This is the digest the interoperable wire format is defined over.
#[derive(Debug)]
pub enum Murmur3 {}

impl HashAlgorithm for Murmur3 {
    fn hash<X: ?Sized>(key: &X) -> HashedKey
    where
        X: Hash,
    {
        let mut hasher = Murmur3Hasher::default();
        key.hash(&mut hasher);
        let hash = murmur3_x64_128(&mut hasher.0.as_slice(), 0)
            .expect("reading from a byte slice cannot fail");
        let mut digest = HashedKey::default();
        digest.copy_from_slice(&hash.to_be_bytes()[8..]);
        digest
    }
}
