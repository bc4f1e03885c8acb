// Copyright © piChain Contributors
// SPDX-License-Identifier: Apache-2.0

use pichain_consensus_types::{
    block::{Block, BlockId},
    transaction::{Transaction, TxnId},
};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use thiserror::Error;
use tracing::warn;

#[cfg(test)]
#[path = "block_tree_test.rs"]
mod block_tree_test;

#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum BlockTreeError {
    /// The id has never been linked into the tree.
    #[error("block {0} is not linked into the tree")]
    UnknownBlock(BlockId),
    /// The block's parent chain is incomplete; recovery has to fetch the
    /// missing ancestor before the block can be linked.
    #[error("block {block_id} is missing its ancestor {parent_id}")]
    PendingAncestor {
        block_id: BlockId,
        parent_id: BlockId,
    },
}

/// Transaction bookkeeping fallout of a head move: what fell off the old
/// branch and what the new branch already carries. The owner of the pending
/// queue applies this to keep the FIFO duplicate-free.
#[derive(Debug, Default)]
pub struct TxnReplay {
    /// Transactions on the abandoned branch only, ordered fork-point first
    /// and in-block order within each block, ready to be re-proposed.
    pub displaced: Vec<Transaction>,
    /// Ids of every transaction the new branch carries; any queued copy is
    /// now redundant.
    pub adopted: HashSet<TxnId>,
}

/// Result of advancing the committed pointer.
#[derive(Debug, Default)]
pub struct CommitOutcome {
    /// Blocks newly finalized by this commit, oldest first. Empty when the
    /// target was already covered.
    pub committed: Vec<Arc<Block>>,
    /// Head-move fallout, when the commit had to drag the head onto the
    /// committed branch.
    pub replay: TxnReplay,
}

struct LinkedBlock {
    block: Arc<Block>,
    children: Vec<BlockId>,
}

/// In-memory tree of blocks rooted at genesis.
///
/// Example structure based on parent links:
///
/// ```text
///                  ╭--> A3
/// Genesis--> B1--> B2
///             ╰--> C2--> C3
/// ```
///
/// Two pointers move through the tree: `head_id`, the tip of the branch this
/// node currently builds on (maximal under the depth-then-creator order among
/// blocks descending from the committed block), and `committed_id`, the
/// deepest block finalized by Paxos, which implicitly commits all its
/// ancestors. Alongside the linked tree sits a side map of every block ever
/// observed, including orphans and discarded forks, which serves retrieval
/// requests from lagging peers.
pub struct BlockTree {
    linked: HashMap<BlockId, LinkedBlock>,
    observed: HashMap<BlockId, Arc<Block>>,
    head_id: BlockId,
    committed_id: BlockId,
}

impl BlockTree {
    pub fn new() -> Self {
        let genesis = Arc::new(Block::genesis().clone());
        let genesis_id = genesis.id();
        let mut linked = HashMap::new();
        linked.insert(
            genesis_id,
            LinkedBlock {
                block: genesis.clone(),
                children: vec![],
            },
        );
        let mut observed = HashMap::new();
        observed.insert(genesis_id, genesis);
        Self {
            linked,
            observed,
            head_id: genesis_id,
            committed_id: genesis_id,
        }
    }

    pub fn head_id(&self) -> BlockId {
        self.head_id
    }

    pub fn committed_id(&self) -> BlockId {
        self.committed_id
    }

    pub fn head(&self) -> Arc<Block> {
        self.get_linked(self.head_id)
            .expect("head is always linked")
    }

    pub fn committed(&self) -> Arc<Block> {
        self.get_linked(self.committed_id)
            .expect("committed block is always linked")
    }

    pub fn is_linked(&self, id: BlockId) -> bool {
        self.linked.contains_key(&id)
    }

    pub fn get_linked(&self, id: BlockId) -> Option<Arc<Block>> {
        self.linked.get(&id).map(|linked| linked.block.clone())
    }

    /// Whether the block has ever been observed, linked or not.
    pub fn block_exists(&self, id: BlockId) -> bool {
        self.observed.contains_key(&id)
    }

    pub fn get_block(&self, id: BlockId) -> Option<Arc<Block>> {
        self.observed.get(&id).cloned()
    }

    /// Remember a block in the observed side map without linking it. Returns
    /// the shared copy, preferring an already stored one.
    pub fn record_observed(&mut self, block: Block) -> Arc<Block> {
        if let Some(existing) = self.observed.get(&block.id()) {
            return existing.clone();
        }
        let block = Arc::new(block);
        self.observed.insert(block.id(), block.clone());
        block
    }

    /// Link a block under its parent, stamping the authoritative depth.
    /// Duplicate inserts return the already linked copy. A missing parent is
    /// reported as [`BlockTreeError::PendingAncestor`]; the caller stashes
    /// the orphan and triggers recovery.
    pub fn insert(&mut self, block: Block) -> Result<Arc<Block>, BlockTreeError> {
        let id = block.id();
        if let Some(existing) = self.linked.get(&id) {
            return Ok(existing.block.clone());
        }
        let parent_id = block.parent_id().ok_or(BlockTreeError::UnknownBlock(id))?;
        let parent_depth = match self.linked.get(&parent_id) {
            Some(parent) => parent
                .block
                .depth()
                .expect("linked blocks always carry a depth"),
            None => {
                return Err(BlockTreeError::PendingAncestor {
                    block_id: id,
                    parent_id,
                })
            }
        };
        let mut block = block;
        block.set_depth(parent_depth + 1);
        let block = Arc::new(block);
        self.linked.insert(
            id,
            LinkedBlock {
                block: block.clone(),
                children: vec![],
            },
        );
        self.linked
            .get_mut(&parent_id)
            .expect("parent presence checked above")
            .children
            .push(id);
        // The linked copy supersedes any wire copy: it carries the true depth.
        self.observed.insert(id, block.clone());
        Ok(block)
    }

    /// Whether `a` is a strict ancestor of `b`. `b` must be linked.
    pub fn ancestor(&self, a: BlockId, b: BlockId) -> Result<bool, BlockTreeError> {
        let mut cursor = self
            .get_linked(b)
            .ok_or(BlockTreeError::UnknownBlock(b))?;
        while let Some(parent_id) = cursor.parent_id() {
            if parent_id == a {
                return Ok(true);
            }
            cursor = self
                .get_linked(parent_id)
                .ok_or(BlockTreeError::UnknownBlock(parent_id))?;
        }
        Ok(false)
    }

    pub fn is_ancestor_or_equal(&self, a: BlockId, b: BlockId) -> Result<bool, BlockTreeError> {
        if a == b {
            return Ok(true);
        }
        self.ancestor(a, b)
    }

    /// A block is worth adopting as head iff it descends from the committed
    /// block and outranks the current head. Blocks on discarded forks stay in
    /// the observed side map but are never linked onto the canonical branch.
    pub fn valid_block(&self, id: BlockId) -> Result<bool, BlockTreeError> {
        let block = self
            .get_linked(id)
            .ok_or(BlockTreeError::UnknownBlock(id))?;
        if !self.is_ancestor_or_equal(self.committed_id, id)? {
            return Ok(false);
        }
        Ok(block.ranks_above(&self.head()))
    }

    /// Depth of an arbitrary block: the stamped value when linked, otherwise
    /// a walk down the observed parent chain until a linked ancestor.
    pub fn depth(&self, block: &Block) -> Result<u64, BlockTreeError> {
        if let Some(linked) = self.get_linked(block.id()) {
            return Ok(linked.depth().expect("linked blocks always carry a depth"));
        }
        let mut steps: u64 = 1;
        let mut parent_id = block
            .parent_id()
            .ok_or(BlockTreeError::UnknownBlock(block.id()))?;
        loop {
            if let Some(linked) = self.get_linked(parent_id) {
                return Ok(linked.depth().expect("linked blocks always carry a depth") + steps);
            }
            let parent = self
                .observed
                .get(&parent_id)
                .ok_or(BlockTreeError::PendingAncestor {
                    block_id: block.id(),
                    parent_id,
                })?;
            steps += 1;
            parent_id = parent
                .parent_id()
                .ok_or(BlockTreeError::UnknownBlock(parent.id()))?;
        }
    }

    /// Re-point the head at `target` and report the transaction fallout: the
    /// symmetric difference between the old and new branches below their
    /// lowest common ancestor.
    pub fn move_to_block(&mut self, target: BlockId) -> Result<TxnReplay, BlockTreeError> {
        if !self.is_linked(target) {
            return Err(BlockTreeError::UnknownBlock(target));
        }
        if target == self.head_id {
            return Ok(TxnReplay::default());
        }
        let (old_path, new_path) = self.paths_to_lca(self.head_id, target)?;
        let mut adopted = HashSet::new();
        for block in &new_path {
            for txn in block.txns() {
                adopted.insert(txn.id());
            }
        }
        let mut displaced = Vec::new();
        for block in old_path.iter().rev() {
            for txn in block.txns() {
                if !adopted.contains(&txn.id()) {
                    displaced.push(txn.clone());
                }
            }
        }
        self.head_id = target;
        Ok(TxnReplay { displaced, adopted })
    }

    /// Advance the committed pointer to `target`, unless `target` is already
    /// covered by it. Drags the head onto the committed branch when the head
    /// sits on a fork.
    pub fn commit(&mut self, target: BlockId) -> Result<CommitOutcome, BlockTreeError> {
        if !self.is_linked(target) {
            return Err(BlockTreeError::UnknownBlock(target));
        }
        if self.is_ancestor_or_equal(target, self.committed_id)? {
            return Ok(CommitOutcome::default());
        }
        let mut committed = Vec::new();
        let mut cursor = self
            .get_linked(target)
            .ok_or(BlockTreeError::UnknownBlock(target))?;
        while cursor.id() != self.committed_id {
            committed.push(cursor.clone());
            match cursor.parent_id() {
                Some(parent_id) => {
                    cursor = self
                        .get_linked(parent_id)
                        .ok_or(BlockTreeError::UnknownBlock(parent_id))?;
                }
                None => {
                    // Reached genesis without meeting the committed pointer:
                    // the target forks a committed block. Paxos safety rules
                    // this out among correct nodes.
                    warn!(
                        target = %target,
                        committed = %self.committed_id,
                        "commit target is not a descendant of the committed block"
                    );
                    break;
                }
            }
        }
        committed.reverse();
        let replay = if self.is_ancestor_or_equal(target, self.head_id)? {
            // The head already extends the newly committed block.
            TxnReplay::default()
        } else {
            self.move_to_block(target)?
        };
        self.committed_id = target;
        Ok(CommitOutcome { committed, replay })
    }

    /// Up to `limit` observed blocks walking from `from` toward genesis,
    /// returned parent-first so the requester can link them in one pass.
    pub fn retrieval_chain(&self, from: BlockId, limit: usize) -> Vec<Arc<Block>> {
        let mut chain = Vec::new();
        let mut cursor = self.observed.get(&from).cloned();
        while let Some(block) = cursor {
            if chain.len() == limit {
                break;
            }
            cursor = block
                .parent_id()
                .and_then(|parent_id| self.observed.get(&parent_id).cloned());
            chain.push(block);
        }
        chain.reverse();
        chain
    }

    /// Tip-first paths from `a` and `b` down to (exclusive of) their lowest
    /// common ancestor.
    fn paths_to_lca(
        &self,
        a: BlockId,
        b: BlockId,
    ) -> Result<(Vec<Arc<Block>>, Vec<Arc<Block>>), BlockTreeError> {
        let depth_of = |block: &Arc<Block>| -> u64 {
            block.depth().expect("linked blocks always carry a depth")
        };
        let mut left = self.get_linked(a).ok_or(BlockTreeError::UnknownBlock(a))?;
        let mut right = self.get_linked(b).ok_or(BlockTreeError::UnknownBlock(b))?;
        let mut left_path = Vec::new();
        let mut right_path = Vec::new();
        while depth_of(&left) > depth_of(&right) {
            left_path.push(left.clone());
            left = self.parent_of(&left)?;
        }
        while depth_of(&right) > depth_of(&left) {
            right_path.push(right.clone());
            right = self.parent_of(&right)?;
        }
        while left.id() != right.id() {
            left_path.push(left.clone());
            right_path.push(right.clone());
            left = self.parent_of(&left)?;
            right = self.parent_of(&right)?;
        }
        Ok((left_path, right_path))
    }

    fn parent_of(&self, block: &Arc<Block>) -> Result<Arc<Block>, BlockTreeError> {
        let parent_id = block
            .parent_id()
            .ok_or(BlockTreeError::UnknownBlock(block.id()))?;
        self.get_linked(parent_id)
            .ok_or(BlockTreeError::UnknownBlock(parent_id))
    }
}

#[cfg(test)]
impl BlockTree {
    /// Number of linked blocks, genesis included.
    pub(crate) fn len(&self) -> usize {
        self.linked.len()
    }

    /// Number of parent-child links.
    pub(crate) fn child_links(&self) -> usize {
        self.linked
            .values()
            .map(|linked| linked.children.len())
            .sum()
    }

    pub(crate) fn observed_len(&self) -> usize {
        self.observed.len()
    }
}
