// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::node::Node;
use crate::{BytesKey, Error, Hash, HashAlgorithm, Murmur3, DEFAULT_BIT_WIDTH};
use cid::Cid;
use ipld_blockstore::BlockStore;
use minicbor::{Decode, Encode};
use multihash_codetable::Code::Blake2b256;
use once_cell::unsync::OnceCell;
use std::borrow::Borrow;
use std::error::Error as StdError;
use std::marker::PhantomData;

/// Implementation of the HAMT data structure for IPLD.
///
/// The root node is materialised on the first operation: constructing a map
/// from a Cid performs no store reads by itself.
///
/// # Examples
///
/// ```
/// use hamt_ipld::Hamt;
///
/// let store = db::MemoryDB::default();
///
/// let mut map: Hamt<_, _, u64> = Hamt::new(&store);
/// map.set(1, "a".to_string()).unwrap();
/// assert_eq!(map.get(&1).unwrap(), Some(&"a".to_string()));
/// assert_eq!(map.delete(&1).unwrap(), Some((1, "a".to_string())));
/// assert_eq!(map.get(&1).unwrap(), None);
/// let cid = map.flush().unwrap();
/// ```
#[derive(Debug)]
pub struct Hamt<'a, BS, V, K = BytesKey, H = Murmur3> {
    root: OnceCell<Node<K, V, H>>,
    root_cid: Option<Cid>,
    store: &'a BS,

    bit_width: u32,
    hash: PhantomData<H>,
}

impl<'a, BS, V, K, H> Hamt<'a, BS, V, K, H>
where
    K: Hash + Eq + PartialOrd + Encode<()> + for<'b> Decode<'b, ()>,
    V: Encode<()> + for<'b> Decode<'b, ()>,
    BS: BlockStore,
    H: HashAlgorithm,
{
    pub fn new(store: &'a BS) -> Self {
        Self::new_with_bit_width(store, DEFAULT_BIT_WIDTH)
    }

    /// Construct hamt with a bit width
    pub fn new_with_bit_width(store: &'a BS, bit_width: u32) -> Self {
        Self {
            root: OnceCell::from(Node::default()),
            root_cid: None,
            store,
            bit_width,
            hash: Default::default(),
        }
    }

    /// Lazily instantiate a hamt from this root Cid.
    pub fn load(cid: &Cid, store: &'a BS) -> Self {
        Self::load_with_bit_width(cid, store, DEFAULT_BIT_WIDTH)
    }

    /// Lazily instantiate a hamt from this root Cid with a specified bit width.
    pub fn load_with_bit_width(cid: &Cid, store: &'a BS, bit_width: u32) -> Self {
        Self {
            root: OnceCell::new(),
            root_cid: Some(*cid),
            store,
            bit_width,
            hash: Default::default(),
        }
    }

    /// Sets the root to the given Cid; the node is read from the store on
    /// the next operation.
    pub fn set_root(&mut self, cid: &Cid) {
        self.root = OnceCell::new();
        self.root_cid = Some(*cid);
    }

    /// Returns a reference to the underlying store of the Hamt.
    pub fn store(&self) -> &'a BS {
        self.store
    }

    fn root(&self) -> Result<&Node<K, V, H>, Error> {
        self.root.get_or_try_init(|| match &self.root_cid {
            Some(cid) => {
                let bytes = self
                    .store
                    .get_bytes(cid)?
                    .ok_or_else(|| Error::CidNotFound(cid.to_string()))?;
                Node::from_bytes(&bytes)
            }
            None => Ok(Node::default()),
        })
    }

    fn root_mut(&mut self) -> Result<&mut Node<K, V, H>, Error> {
        self.root()?;
        Ok(self.root.get_mut().expect("filled line above"))
    }

    /// Inserts a key-value pair into the HAMT.
    ///
    /// If the HAMT did not have this key present, `None` is returned.
    ///
    /// If the HAMT did have this key present, the value is updated, and the old
    /// value is returned. The key is not updated, though;
    ///
    /// # Examples
    ///
    /// ```
    /// use hamt_ipld::Hamt;
    ///
    /// let store = db::MemoryDB::default();
    ///
    /// let mut map: Hamt<_, _, u64> = Hamt::new(&store);
    /// map.set(37, "a".to_string()).unwrap();
    /// assert_eq!(map.is_empty().unwrap(), false);
    ///
    /// map.set(37, "b".to_string()).unwrap();
    /// map.set(37, "c".to_string()).unwrap();
    /// ```
    pub fn set(&mut self, key: K, value: V) -> Result<Option<V>, Error>
    where
        V: PartialEq,
    {
        let (store, bit_width) = (self.store, self.bit_width);
        self.root_mut()?
            .set(key, value, store, bit_width, true)
            .map(|(r, _)| r)
    }

    /// Inserts a key-value pair into the HAMT only if that key does not already exist.
    ///
    /// If the HAMT did not have this key present, `true` is returned and the key/value is added.
    ///
    /// If the HAMT did have this key present, this function will return false
    ///
    /// # Examples
    ///
    /// ```
    /// use hamt_ipld::Hamt;
    ///
    /// let store = db::MemoryDB::default();
    ///
    /// let mut map: Hamt<_, _, u64> = Hamt::new(&store);
    /// let a = map.set_if_absent(37, "a".to_string()).unwrap();
    /// assert_eq!(a, true);
    ///
    /// let b = map.set_if_absent(37, "b".to_string()).unwrap();
    /// assert_eq!(b, false);
    /// assert_eq!(map.get(&37).unwrap(), Some(&"a".to_string()));
    ///
    /// let c = map.set_if_absent(30, "c".to_string()).unwrap();
    /// assert_eq!(c, true);
    /// ```
    pub fn set_if_absent(&mut self, key: K, value: V) -> Result<bool, Error>
    where
        V: PartialEq,
    {
        let (store, bit_width) = (self.store, self.bit_width);
        self.root_mut()?
            .set(key, value, store, bit_width, false)
            .map(|(_, set)| set)
    }

    /// Returns a reference to the value corresponding to the key.
    ///
    /// The key may be any borrowed form of the map's key type, but
    /// `Hash` and `Eq` on the borrowed form *must* match those for
    /// the key type.
    ///
    /// # Examples
    ///
    /// ```
    /// use hamt_ipld::Hamt;
    ///
    /// let store = db::MemoryDB::default();
    ///
    /// let mut map: Hamt<_, _, u64> = Hamt::new(&store);
    /// map.set(1, "a".to_string()).unwrap();
    /// assert_eq!(map.get(&1).unwrap(), Some(&"a".to_string()));
    /// assert_eq!(map.get(&2).unwrap(), None);
    /// ```
    #[inline]
    pub fn get<Q: ?Sized>(&self, k: &Q) -> Result<Option<&V>, Error>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        self.root()?.get(k, self.store, self.bit_width)
    }

    /// Returns `true` if a value exists for the given key in the HAMT.
    ///
    /// The key may be any borrowed form of the map's key type, but
    /// `Hash` and `Eq` on the borrowed form *must* match those for
    /// the key type.
    ///
    /// # Examples
    ///
    /// ```
    /// use hamt_ipld::Hamt;
    ///
    /// let store = db::MemoryDB::default();
    ///
    /// let mut map: Hamt<_, _, u64> = Hamt::new(&store);
    /// map.set(1, "a".to_string()).unwrap();
    /// assert_eq!(map.contains_key(&1).unwrap(), true);
    /// assert_eq!(map.contains_key(&2).unwrap(), false);
    /// ```
    #[inline]
    pub fn contains_key<Q: ?Sized>(&self, k: &Q) -> Result<bool, Error>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        Ok(self.get(k)?.is_some())
    }

    /// Removes a key from the HAMT, returning the value at the key if the key
    /// was previously in the HAMT.
    ///
    /// The key may be any borrowed form of the HAMT's key type, but
    /// `Hash` and `Eq` on the borrowed form *must* match those for
    /// the key type.
    ///
    /// # Examples
    ///
    /// ```
    /// use hamt_ipld::Hamt;
    ///
    /// let store = db::MemoryDB::default();
    ///
    /// let mut map: Hamt<_, _, u64> = Hamt::new(&store);
    /// map.set(1, "a".to_string()).unwrap();
    /// assert_eq!(map.delete(&1).unwrap(), Some((1, "a".to_string())));
    /// assert_eq!(map.delete(&1).unwrap(), None);
    /// ```
    pub fn delete<Q: ?Sized>(&mut self, k: &Q) -> Result<Option<(K, V)>, Error>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        let (store, bit_width) = (self.store, self.bit_width);
        self.root_mut()?.remove_entry(k, store, bit_width)
    }

    /// Flush root and return Cid for hamt
    pub fn flush(&mut self) -> Result<Cid, Error> {
        let store = self.store;
        let root = self.root_mut()?;
        root.flush(store)?;
        let cid = store.put_raw(root.to_bytes()?, Blake2b256)?;
        self.root_cid = Some(cid);
        Ok(cid)
    }

    /// Returns true if the HAMT has no entries
    pub fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.root()?.is_empty())
    }

    /// Iterates over each KV in the Hamt and runs a function on the values.
    ///
    /// Entries are visited in node layout order: ascending slot index, then
    /// ascending key within a bucket. The first callback error aborts the
    /// iteration and is returned unchanged.
    ///
    /// # Examples
    ///
    /// ```
    /// use hamt_ipld::Hamt;
    ///
    /// let store = db::MemoryDB::default();
    ///
    /// let mut map: Hamt<_, _, u64> = Hamt::new(&store);
    /// map.set(1, 1u64).unwrap();
    /// map.set(4, 2u64).unwrap();
    ///
    /// let mut total = 0;
    /// map.for_each(|_, v: &u64| {
    ///    total += v;
    ///    Ok(())
    /// }).unwrap();
    /// assert_eq!(total, 3);
    /// ```
    #[inline]
    pub fn for_each<F>(&self, mut f: F) -> Result<(), Box<dyn StdError>>
    where
        F: FnMut(&K, &V) -> Result<(), Box<dyn StdError>>,
    {
        self.root()?.for_each(self.store, &mut f)
    }
}
