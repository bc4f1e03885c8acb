// Copyright © piChain Contributors
// SPDX-License-Identifier: Apache-2.0

use pichain_consensus_types::block::{Block, BlockId};
use std::{collections::HashMap, sync::Arc};

/// Blocks that arrived before their ancestry, indexed by the parent they are
/// waiting for. Orphans are held, never dropped: once the awaited parent
/// links, the waiters link right behind it, possibly unblocking further
/// waiters of their own.
pub struct PendingBlocks {
    waiting: HashMap<BlockId, Vec<Arc<Block>>>,
}

impl PendingBlocks {
    pub fn new() -> Self {
        Self {
            waiting: HashMap::new(),
        }
    }

    pub fn wait_for(&mut self, parent_id: BlockId, block: Arc<Block>) {
        let waiters = self.waiting.entry(parent_id).or_default();
        if waiters.iter().all(|waiter| waiter.id() != block.id()) {
            waiters.push(block);
        }
    }

    /// All blocks that were waiting for `parent_id`, removed from the stash.
    pub fn take_waiters(&mut self, parent_id: BlockId) -> Vec<Arc<Block>> {
        self.waiting.remove(&parent_id).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }

    pub fn len(&self) -> usize {
        self.waiting.values().map(Vec::len).sum()
    }
}
