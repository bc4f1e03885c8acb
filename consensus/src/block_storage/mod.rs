// Copyright © piChain Contributors
// SPDX-License-Identifier: Apache-2.0

mod block_tree;
mod pending_blocks;
mod sync_manager;

pub use block_tree::{BlockTree, BlockTreeError, CommitOutcome, TxnReplay};
pub use pending_blocks::PendingBlocks;
pub use sync_manager::{InsertResult, SyncManager};
