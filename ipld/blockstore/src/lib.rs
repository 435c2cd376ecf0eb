// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod tracking;

pub use self::tracking::{BSStats, TrackingBlockStore};

use cid::Cid;
use db::{Error, MemoryDB, Store};
use multihash_codetable::{Code, MultihashDigest};

/// Multicodec identifier for DAG-CBOR block payloads.
pub const DAG_CBOR: u64 = 0x71;

/// Wrapper for database to handle inserting and retrieving ipld data with Cids
pub trait BlockStore: Store {
    /// Get bytes from block store by Cid.
    fn get_bytes(&self, cid: &Cid) -> Result<Option<Vec<u8>>, Error> {
        self.read(cid.to_bytes())
    }

    /// Put raw bytes in the block store and return the Cid identifier. Writing
    /// the same bytes twice lands on the same key, so re-puts are idempotent.
    fn put_raw(&self, bytes: Vec<u8>, code: Code) -> Result<Cid, Error> {
        let cid = Cid::new_v1(DAG_CBOR, code.digest(&bytes));
        self.write(cid.to_bytes(), bytes)?;
        Ok(cid)
    }

    /// Returns `Ok(true)` if the block for this Cid is present in the store.
    fn contains(&self, cid: &Cid) -> Result<bool, Error> {
        self.exists(cid.to_bytes())
    }
}

impl BlockStore for MemoryDB {}

impl<BS: BlockStore> BlockStore for &BS {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_raw_returns_blake2b_dag_cbor_cid() {
        let store = MemoryDB::default();
        // empty HAMT node, a known dag-cbor fixture
        let bytes = hex::decode("824080").unwrap();
        let cid = store.put_raw(bytes.clone(), Code::Blake2b256).unwrap();
        assert_eq!(
            hex::encode(cid.to_bytes()),
            "0171a0e4022018fe6acc61a3a36b0c373c4a3a8ea64b812bf2ca9b528050909c78d408558a0c"
        );
        assert!(store.contains(&cid).unwrap());
        assert_eq!(store.get_bytes(&cid).unwrap(), Some(bytes));
    }

    #[test]
    fn get_bytes_missing_is_none() {
        let store = MemoryDB::default();
        let cid = Cid::new_v1(DAG_CBOR, Code::Blake2b256.digest(b"missing"));
        assert_eq!(store.get_bytes(&cid).unwrap(), None);
        assert!(!store.contains(&cid).unwrap());
    }

    #[test]
    fn put_raw_is_idempotent() {
        let mem = MemoryDB::default();
        let store = TrackingBlockStore::new(&mem);
        let c1 = store.put_raw(vec![0x01], Code::Blake2b256).unwrap();
        let c2 = store.put_raw(vec![0x01], Code::Blake2b256).unwrap();
        assert_eq!(c1, c2);
        assert_eq!(*store.stats.borrow(), BSStats { r: 0, w: 2, br: 0, bw: 2 });
    }
}
