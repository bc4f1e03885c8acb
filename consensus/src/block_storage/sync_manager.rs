// Copyright © piChain Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::{
    block_storage::{BlockTree, BlockTreeError, PendingBlocks},
    network::ConsensusNetworkSender,
};
use pichain_consensus_types::{
    block::{Block, BlockId},
    block_retrieval::{BlockRetrievalRequest, BlockRetrievalResponse},
    common::NodeId,
};
use std::{collections::HashSet, sync::Arc};
use tracing::{debug, warn};

/// Outcome of trying to link a block received from a peer.
pub enum InsertResult {
    /// The block linked; the vector holds it plus every stashed orphan that
    /// cascade-linked behind it, in link order.
    Linked(Vec<Arc<Block>>),
    /// An ancestor is missing; the block is stashed and a retrieval request
    /// is on its way.
    Pending,
}

/// Drives the recovery sub-protocol: stashes blocks whose ancestry is
/// incomplete, requests the missing ancestors from the peer that surfaced
/// them, and serves the mirror-image requests from other nodes out of the
/// observed side map.
pub struct SyncManager {
    pending: PendingBlocks,
    /// Ids already requested, so repeated references to the same missing
    /// block produce one request.
    requested: HashSet<BlockId>,
    max_retrieval_blocks: usize,
}

impl SyncManager {
    pub fn new(max_retrieval_blocks: usize) -> Self {
        Self {
            pending: PendingBlocks::new(),
            requested: HashSet::new(),
            max_retrieval_blocks,
        }
    }

    /// Link `block`, or stash it and ask `origin` for the missing parent.
    pub fn try_insert(
        &mut self,
        tree: &mut BlockTree,
        network: &dyn ConsensusNetworkSender,
        origin: NodeId,
        block: Arc<Block>,
    ) -> InsertResult {
        match tree.insert((*block).clone()) {
            Ok(linked) => {
                self.requested.remove(&linked.id());
                let mut all_linked = vec![linked.clone()];
                // Drain every orphan chain this link unblocked.
                let mut worklist = vec![linked.id()];
                while let Some(parent_id) = worklist.pop() {
                    for waiter in self.pending.take_waiters(parent_id) {
                        match tree.insert((*waiter).clone()) {
                            Ok(linked_waiter) => {
                                self.requested.remove(&linked_waiter.id());
                                worklist.push(linked_waiter.id());
                                all_linked.push(linked_waiter);
                            }
                            Err(error) => {
                                warn!(block = %waiter, error = %error, "stashed orphan failed to link");
                            }
                        }
                    }
                }
                InsertResult::Linked(all_linked)
            }
            Err(BlockTreeError::PendingAncestor {
                block_id,
                parent_id,
            }) => {
                debug!(block = %block_id, missing = %parent_id, "stashing block with unresolved ancestry");
                self.pending.wait_for(parent_id, block);
                if self.requested.insert(parent_id) {
                    network.request_block(origin, parent_id);
                }
                InsertResult::Pending
            }
            Err(error) => {
                warn!(block = %block, error = %error, "failed to link block");
                InsertResult::Pending
            }
        }
    }

    /// Insert a retrieval response, parent-first. Returns every block that
    /// became linked, including previously stashed orphans.
    pub fn process_retrieval_response(
        &mut self,
        tree: &mut BlockTree,
        network: &dyn ConsensusNetworkSender,
        origin: NodeId,
        response: BlockRetrievalResponse,
    ) -> Vec<Arc<Block>> {
        let mut newly_linked = Vec::new();
        for block in response.blocks {
            if block.is_genesis() {
                continue;
            }
            let block = tree.record_observed(block);
            if tree.is_linked(block.id()) {
                continue;
            }
            if let InsertResult::Linked(mut linked) =
                self.try_insert(tree, network, origin, block)
            {
                newly_linked.append(&mut linked);
            }
        }
        newly_linked
    }

    /// Serve a peer's retrieval request out of the observed side map.
    pub fn serve_retrieval(
        &self,
        tree: &BlockTree,
        request: BlockRetrievalRequest,
    ) -> BlockRetrievalResponse {
        let blocks = tree
            .retrieval_chain(request.block_id, self.max_retrieval_blocks)
            .iter()
            .map(|block| (**block).clone())
            .collect();
        BlockRetrievalResponse { blocks }
    }

    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
