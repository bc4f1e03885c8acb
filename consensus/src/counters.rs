// Copyright © piChain Contributors
// SPDX-License-Identifier: Apache-2.0

use once_cell::sync::Lazy;
use prometheus::{register_int_counter, register_int_gauge, IntCounter, IntGauge};

/// Blocks finalized by a Paxos commit on this node.
pub static COMMITTED_BLOCKS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "pichain_committed_blocks_total",
        "Blocks finalized by a Paxos commit on this node."
    )
    .unwrap()
});

/// Depth of the deepest committed block.
pub static LAST_COMMITTED_DEPTH: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "pichain_last_committed_depth",
        "Depth of the deepest committed block."
    )
    .unwrap()
});

/// Blocks created locally from pending transactions.
pub static CREATED_BLOCKS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "pichain_created_blocks_total",
        "Blocks created locally from pending transactions."
    )
    .unwrap()
});

/// Transactions waiting to be packed into a block.
pub static PENDING_TXNS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "pichain_pending_txns",
        "Transactions waiting to be packed into a block."
    )
    .unwrap()
});

/// Paxos instances this node opened as proposer.
pub static PAXOS_ROUNDS_OPENED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "pichain_paxos_rounds_opened_total",
        "Paxos instances this node opened as proposer."
    )
    .unwrap()
});

/// Block-retrieval requests served for peers.
pub static BLOCK_RETRIEVAL_REQUESTS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "pichain_block_retrieval_requests_total",
        "Block-retrieval requests served for peers."
    )
    .unwrap()
});
