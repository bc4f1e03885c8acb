// Copyright © piChain Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::{
    config::ConsensusConfig,
    liveness::patience::RttEstimate,
    network::{ConsensusNetworkSender, IncomingMessage},
    round_manager::{PatienceDeadline, RoundManager},
    state_replication::{
        commit_notification_channel, CommitNotification, CommitNotificationReceiver,
    },
    util::mock_time_service::SimulatedTimeService,
};
use futures_channel::mpsc::UnboundedReceiver;
use pichain_consensus_types::{
    block::BlockId,
    block_retrieval::BlockRetrievalRequest,
    common::{NodeId, NodeMode},
    msg::ConsensusMsg,
    transaction::Transaction,
};
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

pub const TEST_RTT: Duration = Duration::from_millis(1_000);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Destination {
    Broadcast,
    Peer(NodeId),
}

#[derive(Debug)]
pub struct OutboundMessage {
    pub from: NodeId,
    pub to: Destination,
    pub msg: ConsensusMsg,
}

/// Network capability that records every send into a queue shared with the
/// playground instead of hitting wires.
pub struct MockNetwork {
    node_id: NodeId,
    queue: Arc<Mutex<VecDeque<OutboundMessage>>>,
}

impl MockNetwork {
    fn push(&self, to: Destination, msg: ConsensusMsg) {
        self.queue.lock().unwrap().push_back(OutboundMessage {
            from: self.node_id,
            to,
            msg,
        });
    }
}

impl ConsensusNetworkSender for MockNetwork {
    fn broadcast(&self, msg: ConsensusMsg) {
        self.push(Destination::Broadcast, msg);
    }

    fn respond(&self, peer: NodeId, msg: ConsensusMsg) {
        self.push(Destination::Peer(peer), msg);
    }

    fn request_block(&self, peer: NodeId, block_id: BlockId) {
        self.push(
            Destination::Peer(peer),
            ConsensusMsg::BlockRetrievalRequest(Box::new(BlockRetrievalRequest { block_id })),
        );
    }
}

/// One node under test: the round manager plus the handles the runtime would
/// normally own.
pub struct TestNode {
    pub manager: RoundManager,
    pub time: Arc<SimulatedTimeService>,
    pub timeout_rx: UnboundedReceiver<PatienceDeadline>,
    pub commit_rx: CommitNotificationReceiver,
}

impl TestNode {
    pub fn process(&mut self, sender: NodeId, msg: ConsensusMsg) {
        self.manager.process_message(IncomingMessage { sender, msg });
    }

    /// Fire every scheduled timer task and feed the resulting deadlines
    /// through the manager.
    pub fn fire_patience(&mut self) {
        self.time.fire_all();
        while let Ok(Some(deadline)) = self.timeout_rx.try_next() {
            self.manager.process_patience_deadline(deadline);
        }
    }

    /// Drain the commit notifications delivered to the application so far.
    pub fn commits(&mut self) -> Vec<CommitNotification> {
        let mut commits = Vec::new();
        while let Ok(Some(notification)) = self.commit_rx.try_next() {
            commits.push(notification);
        }
        commits
    }
}

/// Wires a handful of round managers to one shared message queue and routes
/// messages between them deterministically, in FIFO order.
pub struct NetworkPlayground {
    queue: Arc<Mutex<VecDeque<OutboundMessage>>>,
}

impl NetworkPlayground {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn sender(&self, node_id: NodeId) -> Arc<MockNetwork> {
        Arc::new(MockNetwork {
            node_id,
            queue: self.queue.clone(),
        })
    }

    pub fn build_node(
        &self,
        node_id: NodeId,
        cluster_size: usize,
        initial_mode: NodeMode,
    ) -> TestNode {
        let config = ConsensusConfig {
            node_id,
            cluster_size,
            initial_mode,
            ..ConsensusConfig::default()
        };
        let time = Arc::new(SimulatedTimeService::new());
        let (commit_tx, commit_rx) = commit_notification_channel();
        let (manager, timeout_rx) = RoundManager::new(
            config,
            self.sender(node_id),
            time.clone(),
            RttEstimate::new(TEST_RTT),
            commit_tx,
        )
        .expect("test config is valid");
        TestNode {
            manager,
            time,
            timeout_rx,
            commit_rx,
        }
    }

    pub fn pop(&self) -> Option<OutboundMessage> {
        self.queue.lock().unwrap().pop_front()
    }

    pub fn is_quiet(&self) -> bool {
        self.queue.lock().unwrap().is_empty()
    }

    /// Route queued messages between the given nodes until the queue drains.
    /// Broadcasts fan out to everyone but the sender; messages addressed to
    /// absent nodes are dropped, like a partitioned peer.
    pub fn deliver_all(&self, nodes: &mut [&mut TestNode]) {
        while let Some(outbound) = self.pop() {
            match outbound.to {
                Destination::Broadcast => {
                    for node in nodes.iter_mut() {
                        if node.manager.node_id() != outbound.from {
                            node.process(outbound.from, outbound.msg.clone());
                        }
                    }
                }
                Destination::Peer(peer) => {
                    if let Some(node) = nodes
                        .iter_mut()
                        .find(|node| node.manager.node_id() == peer)
                    {
                        node.process(outbound.from, outbound.msg.clone());
                    }
                }
            }
        }
    }
}

pub fn test_txn(creator_id: NodeId, seq: u64, content: &[u8]) -> Transaction {
    Transaction::new(creator_id, seq, content.to_vec())
}
