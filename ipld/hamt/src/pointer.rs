// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::node::Node;
use super::{Error, KeyValuePair, MAX_ARRAY_WIDTH};
use cid::Cid;
use minicbor::data::Tag;
use minicbor::{decode, encode, Decode, Decoder, Encode, Encoder};
use once_cell::unsync::OnceCell;
use std::cmp::Ordering;

/// Pointer to index values or a link to another child node.
#[derive(Debug)]
pub(crate) enum Pointer<K, V, H> {
    Values(Vec<KeyValuePair<K, V>>),
    Link {
        cid: Cid,
        cache: OnceCell<Box<Node<K, V, H>>>,
    },
    Dirty(Box<Node<K, V, H>>),
}

impl<K: PartialEq, V: PartialEq, H> PartialEq for Pointer<K, V, H> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (&Pointer::Values(ref a), &Pointer::Values(ref b)) => a == b,
            (&Pointer::Link { cid: ref a, .. }, &Pointer::Link { cid: ref b, .. }) => a == b,
            (&Pointer::Dirty(ref a), &Pointer::Dirty(ref b)) => a == b,
            _ => false,
        }
    }
}

/// Links are written as tag 42 over the binary cid prefixed with the
/// identity multibase byte.
fn encode_cid<W: encode::Write>(
    cid: &Cid,
    e: &mut Encoder<W>,
) -> Result<(), encode::Error<W::Error>> {
    let mut bytes = Vec::with_capacity(64);
    bytes.push(0x00);
    bytes.extend_from_slice(&cid.to_bytes());
    e.tag(Tag::Unassigned(42))?;
    e.bytes(&bytes)?;
    Ok(())
}

fn decode_cid(d: &mut Decoder<'_>) -> Result<Cid, decode::Error> {
    if d.tag()? != Tag::Unassigned(42) {
        return Err(decode::Error::message("link must carry cid tag 42"));
    }
    match d.bytes()?.split_first() {
        Some((0x00, cid)) => {
            Cid::try_from(cid).map_err(|_| decode::Error::message("invalid cid bytes in link"))
        }
        _ => Err(decode::Error::message(
            "cid in link must use the identity multibase",
        )),
    }
}

impl<C, K, V, H> Encode<C> for Pointer<K, V, H>
where
    K: Encode<C>,
    V: Encode<C>,
{
    fn encode<W: encode::Write>(
        &self,
        e: &mut Encoder<W>,
        ctx: &mut C,
    ) -> Result<(), encode::Error<W::Error>> {
        match self {
            Pointer::Values(vals) => {
                e.map(1)?.str("1")?;
                vals.encode(e, ctx)
            }
            Pointer::Link { cid, .. } => {
                e.map(1)?.str("0")?;
                encode_cid(cid, e)
            }
            Pointer::Dirty(_) => Err(encode::Error::message("cannot serialize cached values")),
        }
    }
}

impl<'b, C, K, V, H> Decode<'b, C> for Pointer<K, V, H>
where
    K: Decode<'b, C>,
    V: Decode<'b, C>,
{
    fn decode(d: &mut Decoder<'b>, ctx: &mut C) -> Result<Self, decode::Error> {
        if d.map()? != Some(1) {
            return Err(decode::Error::message("pointer must be a single entry map"));
        }
        match d.str()? {
            "0" => Ok(Pointer::Link {
                cid: decode_cid(d)?,
                cache: Default::default(),
            }),
            "1" => Ok(Pointer::Values(d.decode_with(ctx)?)),
            _ => Err(decode::Error::message("invalid pointer map key")),
        }
    }
}

impl<K, V, H> Pointer<K, V, H>
where
    K: PartialOrd,
{
    pub(crate) fn from_key_value(key: K, value: V) -> Self {
        Pointer::Values(vec![KeyValuePair::new(key, value)])
    }

    /// Internal method to cleanup children, to ensure consistent tree representation
    /// after deletes.
    pub(crate) fn clean(&mut self) -> Result<(), Error> {
        match self {
            Pointer::Dirty(n) => {
                if n.pointers.is_empty() {
                    return Err(Error::ZeroPointers);
                }

                let mut entries = 0;
                for p in n.pointers.iter() {
                    match p {
                        Pointer::Values(vals) => entries += vals.len(),
                        // Nested shards stay in place.
                        _ => return Ok(()),
                    }
                }
                // A bucket past the array width only exists where the key
                // hashes are exhausted; it never moves back up.
                if entries > MAX_ARRAY_WIDTH {
                    return Ok(());
                }

                let mut child_vals: Vec<KeyValuePair<K, V>> = n
                    .pointers
                    .iter_mut()
                    .filter_map(|p| {
                        if let Pointer::Values(kvs) = p {
                            Some(std::mem::take(kvs))
                        } else {
                            None
                        }
                    })
                    .flatten()
                    .collect();

                // Values are keyed in ascending order within a bucket, so the
                // merged bucket must restore that order across the slots.
                child_vals.sort_unstable_by(|a, b| {
                    a.key().partial_cmp(b.key()).unwrap_or(Ordering::Equal)
                });

                // Replace link node with child values
                *self = Pointer::Values(child_vals);
                Ok(())
            }
            _ => unreachable!("clean is only called on dirty pointer"),
        }
    }
}
