// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use thiserror::Error;

/// HAMT Error
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    /// Maximum depth of the key hash reached
    #[error("maximum depth reached")]
    MaxDepth,
    /// A link pointer held a live child node where only a Cid can be written
    #[error("node contains unflushed children, flush the tree before encoding")]
    ExpectedCid,
    /// Block bytes are not a valid node encoding
    #[error("failed to decode node: {0}")]
    Decode(String),
    /// Decoded node violates a structural invariant
    #[error("malformed node: {0}")]
    MalformedNode(&'static str),
    /// Cid referenced by a link was not present in the block store
    #[error("cid {0} not found in block store")]
    CidNotFound(String),
    /// Cleanup of a child node found no pointers
    #[error("node has no pointers")]
    ZeroPointers,
    /// Error interacting with the underlying store
    #[error(transparent)]
    Db(#[from] db::Error),
}
