// Copyright © piChain Contributors
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt;

/// The identity of a node in the cluster, assigned at deployment time.
pub type NodeId = u16;

/// Per-creator sequence number used to derive unique block / transaction ids.
pub type SeqNum = u64;

/// Paxos voting round number, strictly increasing per node over the process
/// lifetime.
pub type RequestSeq = u64;

/// Creator id reserved for the genesis block. Real nodes are assigned ids
/// starting from zero, so the all-ones pattern can never collide.
pub const GENESIS_CREATOR: NodeId = NodeId::MAX;

/// Pack a creator id and a per-creator sequence number into a single 64-bit
/// identifier: the low 16 bits carry the creator, the remaining 48 the
/// sequence number. Unambiguous as long as `seq` is per-creator.
pub const fn pack_id(creator_id: NodeId, seq: SeqNum) -> u64 {
    (creator_id as u64) | (seq << 16)
}

/// Inverse of [`pack_id`].
pub const fn unpack_id(id: u64) -> (NodeId, SeqNum) {
    ((id & 0xffff) as NodeId, id >> 16)
}

/// The role a node currently plays, governing its patience before packing
/// pending transactions into a block. A quick node is the de-facto proposer.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum NodeMode {
    Quick,
    Medium,
    Slow,
}

impl NodeMode {
    /// One step toward `Quick`. Applied after a node successfully creates a
    /// block.
    pub fn promoted(self) -> Self {
        match self {
            NodeMode::Quick | NodeMode::Medium => NodeMode::Quick,
            NodeMode::Slow => NodeMode::Medium,
        }
    }

    pub fn is_quick(self) -> bool {
        matches!(self, NodeMode::Quick)
    }
}

impl fmt::Display for NodeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeMode::Quick => write!(f, "quick"),
            NodeMode::Medium => write!(f, "medium"),
            NodeMode::Slow => write!(f, "slow"),
        }
    }
}
