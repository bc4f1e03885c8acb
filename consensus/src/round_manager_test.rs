// Copyright © piChain Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::test_utils::{test_txn, Destination, NetworkPlayground, TestNode, TEST_RTT};
use pichain_consensus_types::{
    block::{Block, BlockId},
    common::{NodeId, NodeMode},
    msg::ConsensusMsg,
    paxos_msg::{CommitMsg, PaxosMsg},
    transaction::Transaction,
};

// A client id outside the cluster; transactions carry their creator's id.
const CLIENT: NodeId = 100;

fn head_of(node: &TestNode) -> BlockId {
    node.manager.block_tree().head_id()
}

fn committed_of(node: &TestNode) -> BlockId {
    node.manager.block_tree().committed_id()
}

fn pending_of(node: &TestNode) -> Vec<Transaction> {
    node.manager.pending_txns().cloned().collect()
}

#[test_log::test]
fn happy_path_commits_on_every_node() {
    let playground = NetworkPlayground::new();
    let mut quick = playground.build_node(0, 3, NodeMode::Quick);
    let mut slow_1 = playground.build_node(1, 3, NodeMode::Slow);
    let mut slow_2 = playground.build_node(2, 3, NodeMode::Slow);

    let txn = test_txn(CLIENT, 0, b"x");
    quick.process(CLIENT, ConsensusMsg::Transaction(Box::new(txn.clone())));
    assert_eq!(pending_of(&quick), vec![txn.clone()]);

    // Quick patience is zero; firing it packs the block and opens a round.
    quick.fire_patience();
    assert!(pending_of(&quick).is_empty());

    // BLK + TRY, then TRY_OK x2, PROPOSE, PROPOSE_ACK x2, COMMIT, ACM.
    playground.deliver_all(&mut [&mut quick, &mut slow_1, &mut slow_2]);

    let committed = committed_of(&quick);
    assert_ne!(committed, BlockId::genesis());
    for node in [&quick, &slow_1, &slow_2] {
        assert_eq!(committed_of(node), committed);
        assert_eq!(head_of(node), committed);
        let block = node
            .manager
            .block_tree()
            .get_linked(committed)
            .expect("committed block is linked everywhere");
        assert_eq!(block.depth(), Some(1));
        assert_eq!(block.txns(), [txn.clone()]);
    }

    // Each application saw exactly one commit, carrying exactly `x`.
    for node in [&mut quick, &mut slow_1, &mut slow_2] {
        let commits = node.commits();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].block_id, committed);
        assert_eq!(commits[0].transactions, vec![txn.clone()]);
    }

    // Opened round, proposed, committed: one bump each.
    assert_eq!(quick.manager.paxos().request_seq(), 3);
    assert!(!quick.manager.paxos().commit_in_flight());
}

#[test_log::test]
fn equal_depth_fork_resolves_to_the_smaller_creator() {
    let playground = NetworkPlayground::new();
    let mut node_0 = playground.build_node(0, 3, NodeMode::Medium);
    let mut node_1 = playground.build_node(1, 3, NodeMode::Medium);

    let txn_x = test_txn(CLIENT, 0, b"x");
    let txn_y = test_txn(CLIENT, 1, b"y");
    node_0.process(CLIENT, ConsensusMsg::Transaction(Box::new(txn_x.clone())));
    node_1.process(CLIENT, ConsensusMsg::Transaction(Box::new(txn_y.clone())));

    // Identical patience on both: each creates its own depth-1 block before
    // hearing from the other.
    node_0.fire_patience();
    node_1.fire_patience();
    let block_0 = head_of(&node_0);
    let block_1 = head_of(&node_1);
    assert_ne!(block_0, block_1);

    playground.deliver_all(&mut [&mut node_0, &mut node_1]);

    // The tie breaks toward creator 0 on both nodes.
    assert_eq!(head_of(&node_0), block_0);
    assert_eq!(head_of(&node_1), block_0);

    // Both demoted: node 1 by the outranking block, node 0 by a block whose
    // creator had just promoted itself to quick.
    assert_eq!(node_0.manager.mode(), NodeMode::Slow);
    assert_eq!(node_1.manager.mode(), NodeMode::Slow);

    // The displaced `y` is back in node 1's queue, ready to be re-proposed.
    assert!(pending_of(&node_0).is_empty());
    assert_eq!(pending_of(&node_1), vec![txn_y.clone()]);

    // And the next block node 1 creates indeed carries it, on top of the
    // canonical branch.
    node_1.fire_patience();
    let next = node_1
        .manager
        .block_tree()
        .get_linked(head_of(&node_1))
        .expect("own block is linked");
    assert_eq!(next.parent_id(), Some(block_0));
    assert_eq!(next.depth(), Some(2));
    assert_eq!(next.txns(), [txn_y]);
}

#[test_log::test]
fn missing_ancestor_triggers_retrieval_and_deferred_linking() {
    let playground = NetworkPlayground::new();
    let mut node_1 = playground.build_node(1, 3, NodeMode::Quick);
    let mut node_2 = playground.build_node(2, 3, NodeMode::Slow);

    // Node 1 builds a two-block chain on its own; nothing is delivered.
    node_1.process(CLIENT, ConsensusMsg::Transaction(Box::new(test_txn(CLIENT, 0, b"a"))));
    node_1.fire_patience();
    node_1.process(CLIENT, ConsensusMsg::Transaction(Box::new(test_txn(CLIENT, 1, b"b"))));
    node_1.fire_patience();
    while playground.pop().is_some() {}

    let b2 = node_1
        .manager
        .block_tree()
        .get_linked(head_of(&node_1))
        .expect("node 1's head is linked");
    assert_eq!(b2.depth(), Some(2));
    let b1_id = b2.parent_id().expect("depth-2 block has a parent");

    // Node 2 hears only about the tip.
    node_2.process(1, ConsensusMsg::Block(Box::new((*b2).clone())));
    assert_eq!(head_of(&node_2), BlockId::genesis());

    // It must have asked node 1 for the missing parent.
    let request = playground.pop().expect("a retrieval request was sent");
    assert_eq!(request.from, 2);
    assert_eq!(request.to, Destination::Peer(1));
    match &request.msg {
        ConsensusMsg::BlockRetrievalRequest(req) => assert_eq!(req.block_id, b1_id),
        other => panic!("expected a retrieval request, got {}", other.name()),
    }

    // Serving the request links both the parent and the stashed tip.
    node_1.process(2, request.msg);
    playground.deliver_all(&mut [&mut node_1, &mut node_2]);
    assert_eq!(head_of(&node_2), b2.id());
    assert!(node_2.manager.block_tree().is_linked(b1_id));
}

#[test_log::test]
fn quick_creator_demotes_a_medium_node_into_the_slow_range() {
    let playground = NetworkPlayground::new();
    let mut node = playground.build_node(1, 3, NodeMode::Medium);

    let block = Block::new(0, 0, BlockId::genesis(), NodeMode::Quick, vec![], 1);
    node.process(0, ConsensusMsg::Block(Box::new(block)));
    assert_eq!(node.manager.mode(), NodeMode::Slow);

    // The next transaction arms the timer with a slow-range draw.
    node.process(CLIENT, ConsensusMsg::Transaction(Box::new(test_txn(CLIENT, 0, b"z"))));
    let delays = node.time.scheduled_delays();
    assert_eq!(delays.len(), 1);
    let low = TEST_RTT.mul_f64(2.0 + 1e-3);
    let high = low + TEST_RTT.mul_f64(3.0 / 2.0);
    assert!(
        delays[0] >= low && delays[0] <= high,
        "slow patience {:?} outside [{:?}, {:?}]",
        delays[0],
        low,
        high
    );
}

#[test_log::test]
fn duplicate_transactions_are_buffered_once() {
    let playground = NetworkPlayground::new();
    let mut node = playground.build_node(0, 3, NodeMode::Slow);

    let txn = test_txn(CLIENT, 0, b"once");
    node.process(CLIENT, ConsensusMsg::Transaction(Box::new(txn.clone())));
    node.process(CLIENT, ConsensusMsg::Transaction(Box::new(txn.clone())));
    node.process(2, ConsensusMsg::Transaction(Box::new(txn)));
    assert_eq!(pending_of(&node).len(), 1);
}

#[test_log::test]
fn superseded_patience_deadline_is_inert() {
    let playground = NetworkPlayground::new();
    let mut node = playground.build_node(2, 3, NodeMode::Slow);

    let txn = test_txn(CLIENT, 0, b"x");
    node.process(CLIENT, ConsensusMsg::Transaction(Box::new(txn.clone())));
    assert_eq!(node.time.scheduled_delays().len(), 1);

    // A peer's block carrying the same transaction lands first: the queue
    // drains and the armed deadline is superseded.
    let block = Block::new(
        0,
        0,
        BlockId::genesis(),
        NodeMode::Slow,
        vec![txn],
        1,
    );
    node.process(0, ConsensusMsg::Block(Box::new(block)));
    assert!(pending_of(&node).is_empty());

    // The old deadline fires into the void: no block gets created.
    node.fire_patience();
    assert!(playground.is_quiet());
    assert_eq!(
        node.manager
            .block_tree()
            .get_linked(head_of(&node))
            .expect("head is linked")
            .creator_id(),
        0
    );
}

#[test_log::test]
fn commit_received_before_the_block_is_deferred_until_recovery() {
    let playground = NetworkPlayground::new();
    let mut node_1 = playground.build_node(1, 3, NodeMode::Quick);
    let mut node_2 = playground.build_node(2, 3, NodeMode::Slow);

    // Node 1 builds a two-block chain on its own; nothing is delivered.
    node_1.process(CLIENT, ConsensusMsg::Transaction(Box::new(test_txn(CLIENT, 0, b"a"))));
    node_1.fire_patience();
    node_1.process(CLIENT, ConsensusMsg::Transaction(Box::new(test_txn(CLIENT, 1, b"b"))));
    node_1.fire_patience();
    while playground.pop().is_some() {}
    let tip = node_1
        .manager
        .block_tree()
        .get_linked(head_of(&node_1))
        .expect("node 1's head is linked");
    assert_eq!(tip.depth(), Some(2));

    // Node 2 sees the COMMIT of the tip before ever seeing either block's
    // broadcast. The commit must wait for retrieval rather than apply
    // against a hole in the ancestry.
    node_2.process(
        1,
        ConsensusMsg::Paxos(Box::new(PaxosMsg::Commit(CommitMsg {
            request_seq: 3,
            com_block: (*tip).clone(),
        }))),
    );
    assert_eq!(committed_of(&node_2), BlockId::genesis());

    // Route the retrieval request to node 1 and the response back; the
    // deferred commit then lands, finalizing the whole chain.
    playground.deliver_all(&mut [&mut node_1, &mut node_2]);
    assert_eq!(committed_of(&node_2), tip.id());
    assert_eq!(head_of(&node_2), tip.id());
    let commits = node_2.commits();
    assert_eq!(commits.len(), 2);
    assert_eq!(commits[1].block_id, tip.id());
}
