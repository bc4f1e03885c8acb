// Copyright © piChain Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::{
    block::{Block, BlockId},
    block_retrieval::{BlockRetrievalRequest, BlockRetrievalResponse},
    paxos_msg::PaxosMsg,
    transaction::Transaction,
};
use serde::{Deserialize, Serialize};

/// Broadcast once a node applies a commit, so an external garbage-collection
/// layer can prune branches every node has moved past.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct AckCommit {
    pub block_id: BlockId,
}

/// Everything peers exchange. The transport frames and ships these; consensus
/// only sees the structured form.
///
/// `Ping` / `Pong` belong to the transport's RTT estimator and are ignored by
/// the round manager; they live here so the codec covers the full taxonomy.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ConsensusMsg {
    Paxos(Box<PaxosMsg>),
    Block(Box<Block>),
    Transaction(Box<Transaction>),
    BlockRetrievalRequest(Box<BlockRetrievalRequest>),
    BlockRetrievalResponse(Box<BlockRetrievalResponse>),
    AckCommit(AckCommit),
    Ping { sent_at_us: u64 },
    Pong { sent_at_us: u64 },
}

impl ConsensusMsg {
    pub fn name(&self) -> &'static str {
        match self {
            ConsensusMsg::Paxos(_) => "Paxos",
            ConsensusMsg::Block(_) => "Block",
            ConsensusMsg::Transaction(_) => "Transaction",
            ConsensusMsg::BlockRetrievalRequest(_) => "BlockRetrievalRequest",
            ConsensusMsg::BlockRetrievalResponse(_) => "BlockRetrievalResponse",
            ConsensusMsg::AckCommit(_) => "AckCommit",
            ConsensusMsg::Ping { .. } => "Ping",
            ConsensusMsg::Pong { .. } => "Pong",
        }
    }
}
