// Copyright © piChain Contributors
// SPDX-License-Identifier: Apache-2.0

use pichain_consensus_types::{block::BlockId, common::NodeId, msg::ConsensusMsg};

/// A message delivered by the transport, tagged with the peer it came from so
/// handlers can respond point-to-point.
#[derive(Clone, Debug)]
pub struct IncomingMessage {
    pub sender: NodeId,
    pub msg: ConsensusMsg,
}

/// The outbound capability consensus holds on the transport. The transport
/// owns the inbound side (a channel of [`IncomingMessage`]); consensus never
/// owns the transport, breaking the reference cycle between the two.
///
/// All sends are best-effort and non-blocking: implementations enqueue and
/// return. Loss is repaired by the next Paxos round or an explicit block
/// retrieval.
pub trait ConsensusNetworkSender: Send + Sync {
    /// Deliver to every known peer. Broadcasts do not loop back to the
    /// sender.
    fn broadcast(&self, msg: ConsensusMsg);

    /// Deliver to the peer whose message triggered the current handler.
    fn respond(&self, peer: NodeId, msg: ConsensusMsg);

    /// Ask `peer` for a block this node only knows by id.
    fn request_block(&self, peer: NodeId, block_id: BlockId);
}
