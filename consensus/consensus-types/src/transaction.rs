// Copyright © piChain Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::common::{pack_id, unpack_id, NodeId, SeqNum};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    hash::{Hash, Hasher},
};

/// Globally unique transaction identifier, packed from the creator id and the
/// creator-local sequence number.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct TxnId(u64);

impl TxnId {
    pub fn new(creator_id: NodeId, seq: SeqNum) -> Self {
        Self(pack_id(creator_id, seq))
    }

    pub fn creator_id(self) -> NodeId {
        unpack_id(self.0).0
    }

    pub fn seq(self) -> SeqNum {
        unpack_id(self.0).1
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (creator, seq) = unpack_id(self.0);
        write!(f, "T{}.{}", creator, seq)
    }
}

/// A client command opaque to consensus. Immutable after creation; equality
/// and hashing go through the identity, never the content.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Transaction {
    creator_id: NodeId,
    seq: SeqNum,
    #[serde(with = "serde_bytes")]
    content: Vec<u8>,
}

impl Transaction {
    pub fn new(creator_id: NodeId, seq: SeqNum, content: Vec<u8>) -> Self {
        Self {
            creator_id,
            seq,
            content,
        }
    }

    pub fn id(&self) -> TxnId {
        TxnId::new(self.creator_id, self.seq)
    }

    pub fn creator_id(&self) -> NodeId {
        self.creator_id
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Transaction {}

impl Hash for Transaction {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Txn[{}, {} bytes]", self.id(), self.content.len())
    }
}
