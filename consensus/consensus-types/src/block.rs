// Copyright © piChain Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::{
    common::{pack_id, unpack_id, NodeId, NodeMode, SeqNum, GENESIS_CREATOR},
    transaction::Transaction,
};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    hash::{Hash, Hasher},
};

static GENESIS: Lazy<Block> = Lazy::new(|| Block {
    creator_id: GENESIS_CREATOR,
    seq: 0,
    parent_id: None,
    creator_mode: NodeMode::Quick,
    txns: vec![],
    depth: Some(0),
});

/// Globally unique block identifier, packed from the creator id and the
/// creator-local sequence number.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct BlockId(u64);

impl BlockId {
    pub fn new(creator_id: NodeId, seq: SeqNum) -> Self {
        Self(pack_id(creator_id, seq))
    }

    pub fn genesis() -> Self {
        Block::genesis().id()
    }

    pub fn creator_id(self) -> NodeId {
        unpack_id(self.0).0
    }

    pub fn seq(self) -> SeqNum {
        unpack_id(self.0).1
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (creator, seq) = unpack_id(self.0);
        if creator == GENESIS_CREATOR {
            write!(f, "B-genesis")
        } else {
            write!(f, "B{}.{}", creator, seq)
        }
    }
}

/// A proposed extension of the chain: an ordered batch of transactions linked
/// to a parent block. Immutable once created, except that the block tree
/// stamps the authoritative `depth` when the block is linked.
///
/// `depth` received over the wire is the creator's claim and is only trusted
/// for the pre-link ranking check in the demotion rule; the tree recomputes
/// it from the parent chain on insertion.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Block {
    creator_id: NodeId,
    seq: SeqNum,
    parent_id: Option<BlockId>,
    creator_mode: NodeMode,
    txns: Vec<Transaction>,
    depth: Option<u64>,
}

impl Block {
    pub fn new(
        creator_id: NodeId,
        seq: SeqNum,
        parent_id: BlockId,
        creator_mode: NodeMode,
        txns: Vec<Transaction>,
        depth: u64,
    ) -> Self {
        Self {
            creator_id,
            seq,
            parent_id: Some(parent_id),
            creator_mode,
            txns,
            depth: Some(depth),
        }
    }

    /// The fixed sentinel every chain descends from.
    pub fn genesis() -> &'static Block {
        &GENESIS
    }

    pub fn id(&self) -> BlockId {
        BlockId::new(self.creator_id, self.seq)
    }

    pub fn creator_id(&self) -> NodeId {
        self.creator_id
    }

    pub fn seq(&self) -> SeqNum {
        self.seq
    }

    /// `None` only for the genesis block.
    pub fn parent_id(&self) -> Option<BlockId> {
        self.parent_id
    }

    pub fn creator_mode(&self) -> NodeMode {
        self.creator_mode
    }

    pub fn txns(&self) -> &[Transaction] {
        &self.txns
    }

    /// Number of ancestors plus one; genesis sits at depth 0. `None` until
    /// the block has been linked into a tree (or stamped by its creator).
    pub fn depth(&self) -> Option<u64> {
        self.depth
    }

    pub fn set_depth(&mut self, depth: u64) {
        self.depth = Some(depth);
    }

    pub fn is_genesis(&self) -> bool {
        self.creator_id == GENESIS_CREATOR
    }

    /// The total order driving head selection: deeper wins, ties go to the
    /// smaller creator id. A block whose depth is still unknown never
    /// outranks anything.
    pub fn ranks_above(&self, other: &Block) -> bool {
        match (self.depth, other.depth) {
            (Some(own), Some(theirs)) => {
                own > theirs || (own == theirs && self.creator_id < other.creator_id)
            }
            _ => false,
        }
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Block {}

impl Hash for Block {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[id: {}", self.id())?;
        match self.depth {
            Some(depth) => write!(f, ", depth: {}", depth)?,
            None => write!(f, ", depth: ?")?,
        }
        write!(f, ", txns: {}]", self.txns.len())
    }
}
