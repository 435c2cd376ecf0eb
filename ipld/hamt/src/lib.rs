// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! HAMT crate for use as a rust IPLD data structure
//!
//! [Data structure reference](https://github.com/ipld/specs/blob/51fab05b4fe4930d3d851d50cc1e5f1a02092deb/data-structures/hashmap.md)
//!
//! The Hamt is a data structure that mimics a HashMap which has the features of being sharded,
//! persisted, and indexable by a Cid. The Hamt supports a variable bit width to adjust the amount
//! of possible pointers that can exist at each height of the tree. Hamt can be modified at any
//! point, but the underlying values are only persisted to the store when the
//! [flush](struct.Hamt.html#method.flush) is called.

mod bitfield;
mod error;
mod hamt;
mod hash;
mod hash_algorithm;
mod hash_bits;
mod node;
mod pointer;

pub use self::error::Error;
pub use self::hamt::Hamt;
pub use self::hash::Hash;
pub use self::hash_algorithm::{HashAlgorithm, Murmur3};

use minicbor::{decode, encode, Decode, Decoder, Encode, Encoder};
use std::hash::Hasher;

/// Maximum number of entries a value bucket may hold before it is sharded
/// into a child node. Fixed for wire compatibility.
const MAX_ARRAY_WIDTH: usize = 3;

/// Default bit width for indexing a hash at each depth level
const DEFAULT_BIT_WIDTH: u32 = 8;

/// Digest a key is navigated by, 64 bits consumed from the root downwards.
pub type HashedKey = [u8; 8];

#[derive(Debug, PartialEq)]
struct KeyValuePair<K, V>(K, V);

impl<K, V> KeyValuePair<K, V> {
    pub fn key(&self) -> &K {
        &self.0
    }
    pub fn value(&self) -> &V {
        &self.1
    }
}

impl<K, V> KeyValuePair<K, V> {
    pub fn new(key: K, value: V) -> Self {
        KeyValuePair(key, value)
    }
}

impl<C, K, V> Encode<C> for KeyValuePair<K, V>
where
    K: Encode<C>,
    V: Encode<C>,
{
    fn encode<W: encode::Write>(
        &self,
        e: &mut Encoder<W>,
        ctx: &mut C,
    ) -> Result<(), encode::Error<W::Error>> {
        e.array(2)?;
        self.0.encode(e, ctx)?;
        self.1.encode(e, ctx)
    }
}

impl<'b, C, K, V> Decode<'b, C> for KeyValuePair<K, V>
where
    K: Decode<'b, C>,
    V: Decode<'b, C>,
{
    fn decode(d: &mut Decoder<'b>, ctx: &mut C) -> Result<Self, decode::Error> {
        if d.array()? != Some(2) {
            return Err(decode::Error::message("entry must be a key and value tuple"));
        }
        Ok(KeyValuePair(d.decode_with(ctx)?, d.decode_with(ctx)?))
    }
}

/// Default key type of the hamt, an arbitrary (not necessarily utf-8) byte
/// string written as a CBOR byte string.
#[derive(Debug, Default, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct BytesKey(pub Vec<u8>);

impl Hash for BytesKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write(&self.0);
    }
}

impl<C> Encode<C> for BytesKey {
    fn encode<W: encode::Write>(
        &self,
        e: &mut Encoder<W>,
        _: &mut C,
    ) -> Result<(), encode::Error<W::Error>> {
        e.bytes(&self.0)?;
        Ok(())
    }
}

impl<'b, C> Decode<'b, C> for BytesKey {
    fn decode(d: &mut Decoder<'b>, _: &mut C) -> Result<Self, decode::Error> {
        Ok(BytesKey(d.bytes()?.to_vec()))
    }
}

impl std::borrow::Borrow<Vec<u8>> for BytesKey {
    fn borrow(&self) -> &Vec<u8> {
        &self.0
    }
}

impl std::borrow::Borrow<[u8]> for BytesKey {
    fn borrow(&self) -> &[u8] {
        &self.0
    }
}

impl std::ops::Deref for BytesKey {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<u8>> for BytesKey {
    fn from(bz: Vec<u8>) -> Self {
        BytesKey(bz)
    }
}

impl From<&[u8]> for BytesKey {
    fn from(s: &[u8]) -> Self {
        Self(s.to_vec())
    }
}

impl From<&str> for BytesKey {
    fn from(s: &str) -> Self {
        Self::from(s.as_bytes())
    }
}

impl From<String> for BytesKey {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

/// Value that is already in its encoded form. The bytes pass to the wire
/// verbatim on encode and are captured verbatim on decode, so the engine
/// never re-encodes them.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Raw(pub Vec<u8>);

impl From<Vec<u8>> for Raw {
    fn from(bz: Vec<u8>) -> Self {
        Raw(bz)
    }
}

impl<C> Encode<C> for Raw {
    fn encode<W: encode::Write>(
        &self,
        e: &mut Encoder<W>,
        _: &mut C,
    ) -> Result<(), encode::Error<W::Error>> {
        e.writer_mut()
            .write_all(&self.0)
            .map_err(encode::Error::write)
    }
}

impl<'b, C> Decode<'b, C> for Raw {
    fn decode(d: &mut Decoder<'b>, _: &mut C) -> Result<Self, decode::Error> {
        let start = d.position();
        d.skip()?;
        let end = d.position();
        Ok(Raw(d.input()[start..end].to_vec()))
    }
}
