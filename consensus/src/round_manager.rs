// Copyright © piChain Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::{
    block_storage::{BlockTree, InsertResult, SyncManager, TxnReplay},
    config::ConsensusConfig,
    counters,
    liveness::patience::{Patience, RttEstimate},
    network::{ConsensusNetworkSender, IncomingMessage},
    paxos::PaxosEngine,
    state_replication::{CommitNotification, CommitNotificationSender},
    util::time_service::TimeService,
};
use futures::StreamExt;
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use pichain_consensus_types::{
    block::{Block, BlockId},
    block_retrieval::{BlockRetrievalRequest, BlockRetrievalResponse},
    common::{NodeId, NodeMode, SeqNum},
    msg::{AckCommit, ConsensusMsg},
    paxos_msg::PaxosMsg,
    transaction::{Transaction, TxnId},
};
use rand::{rngs::StdRng, SeedableRng};
use std::{
    collections::{HashSet, VecDeque},
    sync::Arc,
};
use tracing::{debug, info, warn};

/// Wakeup pushed into the round manager's event channel when an armed
/// patience interval elapses. The generation makes superseded deadlines
/// inert: every re-arm bumps the counter.
#[derive(Clone, Copy, Debug)]
pub struct PatienceDeadline {
    generation: u64,
}

/// The per-node consensus state machine. Owns the block tree, the pending
/// transaction queue, the Paxos engine and the patience timer, and reacts to
/// the three kinds of events the transport can deliver: transactions, blocks
/// and protocol messages.
///
/// All handlers are synchronous and run to completion; [`Self::start`] is the
/// only suspension point, so the state needs no locks.
pub struct RoundManager {
    node_id: NodeId,
    mode: NodeMode,
    /// Local sequence counter for blocks this node creates.
    next_block_seq: SeqNum,
    /// Every transaction id ever seen, for dedup. Pruned on commit.
    known_txs: HashSet<TxnId>,
    /// Transactions not yet packed into a block, FIFO.
    new_txs: VecDeque<Transaction>,
    /// The transaction whose arrival armed the running patience timer.
    oldest_txn: Option<TxnId>,
    timer_generation: u64,
    patience: Patience,
    rtt: RttEstimate,
    block_tree: BlockTree,
    sync: SyncManager,
    paxos: PaxosEngine,
    /// Commits that arrived before their block's ancestry; retried whenever
    /// new blocks link.
    deferred_commits: VecDeque<BlockId>,
    network: Arc<dyn ConsensusNetworkSender>,
    time_service: Arc<dyn TimeService>,
    timeout_tx: UnboundedSender<PatienceDeadline>,
    commit_tx: CommitNotificationSender,
    rng: StdRng,
}

impl RoundManager {
    pub fn new(
        config: ConsensusConfig,
        network: Arc<dyn ConsensusNetworkSender>,
        time_service: Arc<dyn TimeService>,
        rtt: RttEstimate,
        commit_tx: CommitNotificationSender,
    ) -> anyhow::Result<(Self, UnboundedReceiver<PatienceDeadline>)> {
        config.sanitize()?;
        let (timeout_tx, timeout_rx) = unbounded();
        let manager = Self {
            node_id: config.node_id,
            mode: config.initial_mode,
            next_block_seq: 0,
            known_txs: HashSet::new(),
            new_txs: VecDeque::new(),
            oldest_txn: None,
            timer_generation: 0,
            patience: Patience::new(config.epsilon, config.cluster_size),
            rtt,
            block_tree: BlockTree::new(),
            sync: SyncManager::new(config.max_retrieval_blocks),
            paxos: PaxosEngine::new(config.cluster_size),
            deferred_commits: VecDeque::new(),
            network,
            time_service,
            timeout_tx,
            commit_tx,
            rng: StdRng::from_entropy(),
        };
        Ok((manager, timeout_rx))
    }

    /// The node's cooperative loop: handlers run to completion between the
    /// two kinds of wakeups.
    pub async fn start(
        mut self,
        mut network_rx: UnboundedReceiver<IncomingMessage>,
        mut timeout_rx: UnboundedReceiver<PatienceDeadline>,
    ) {
        info!(node = self.node_id, mode = %self.mode, "consensus started");
        loop {
            tokio::select! {
                Some(incoming) = network_rx.next() => self.process_message(incoming),
                Some(deadline) = timeout_rx.next() => self.process_patience_deadline(deadline),
                else => break,
            }
        }
        info!(node = self.node_id, "consensus stopped");
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn mode(&self) -> NodeMode {
        self.mode
    }

    pub fn block_tree(&self) -> &BlockTree {
        &self.block_tree
    }

    pub fn paxos(&self) -> &PaxosEngine {
        &self.paxos
    }

    pub fn pending_txns(&self) -> impl Iterator<Item = &Transaction> {
        self.new_txs.iter()
    }

    pub fn process_message(&mut self, incoming: IncomingMessage) {
        let IncomingMessage { sender, msg } = incoming;
        match msg {
            ConsensusMsg::Transaction(txn) => self.process_transaction(*txn),
            ConsensusMsg::Block(block) => self.process_block(sender, *block),
            ConsensusMsg::Paxos(paxos_msg) => self.process_paxos(sender, *paxos_msg),
            ConsensusMsg::BlockRetrievalRequest(request) => {
                self.process_block_retrieval(sender, *request)
            }
            ConsensusMsg::BlockRetrievalResponse(response) => {
                self.process_retrieval_response(sender, *response)
            }
            ConsensusMsg::AckCommit(ack) => {
                // Input to the garbage-collection layer, not to consensus.
                debug!(from = sender, block = %ack.block_id, "peer acknowledged commit");
            }
            ConsensusMsg::Ping { .. } | ConsensusMsg::Pong { .. } => {
                // The transport's RTT estimator consumes these.
            }
        }
    }

    /// Buffer a fresh transaction; the first pending one arms the patience
    /// timer.
    pub fn process_transaction(&mut self, txn: Transaction) {
        if !self.known_txs.insert(txn.id()) {
            debug!(txn = %txn, "duplicate transaction ignored");
            return;
        }
        debug!(txn = %txn, "buffered transaction");
        self.new_txs.push_back(txn);
        counters::PENDING_TXNS.set(self.new_txs.len() as i64);
        if self.new_txs.len() == 1 {
            self.oldest_txn = self.new_txs.front().map(Transaction::id);
            self.arm_patience_timer();
        }
    }

    /// React to a block from a peer: demote if it outranks us or came from a
    /// quick node, link it (recovering ancestors if needed), and adopt it as
    /// head when it wins the fork race.
    pub fn process_block(&mut self, sender: NodeId, block: Block) {
        if block.ranks_above(&self.block_tree.head()) || block.creator_mode().is_quick() {
            if self.mode != NodeMode::Slow {
                info!(node = self.node_id, was = %self.mode, "demoted to slow");
            }
            self.mode = NodeMode::Slow;
        }
        let block = self.block_tree.record_observed(block);
        match self
            .sync
            .try_insert(&mut self.block_tree, self.network.as_ref(), sender, block)
        {
            InsertResult::Pending => {
                // Processing resumes when the retrieval response arrives.
            }
            InsertResult::Linked(newly_linked) => self.finish_linked_blocks(newly_linked),
        }
    }

    pub fn process_paxos(&mut self, sender: NodeId, msg: PaxosMsg) {
        debug!(from = sender, msg = %msg, "processing paxos message");
        match msg {
            PaxosMsg::Try(try_msg) => {
                // Catch up to the proposer's committed pointer before voting.
                self.apply_commit(sender, try_msg.last_committed_block.clone());
                if let Some(try_ok) = self.paxos.process_try(try_msg) {
                    self.network
                        .respond(sender, ConsensusMsg::Paxos(Box::new(PaxosMsg::TryOk(try_ok))));
                }
            }
            PaxosMsg::TryOk(try_ok) => {
                if let Some(propose) = self.paxos.process_try_ok(try_ok) {
                    self.network
                        .broadcast(ConsensusMsg::Paxos(Box::new(PaxosMsg::Propose(propose))));
                }
            }
            PaxosMsg::Propose(propose) => {
                if let Some(ack) = self.paxos.process_propose(propose) {
                    self.network.respond(
                        sender,
                        ConsensusMsg::Paxos(Box::new(PaxosMsg::ProposeAck(ack))),
                    );
                }
            }
            PaxosMsg::ProposeAck(ack) => {
                if let Some(commit) = self.paxos.process_propose_ack(ack) {
                    let block = commit.com_block.clone();
                    self.network
                        .broadcast(ConsensusMsg::Paxos(Box::new(PaxosMsg::Commit(commit))));
                    // Broadcasts do not loop back; apply the decision locally.
                    // A compromise block this node never received as BLK is
                    // recovered from the acking peer, who just accepted it.
                    self.paxos.process_commit();
                    self.apply_commit(sender, block);
                }
            }
            PaxosMsg::Commit(commit) => {
                self.paxos.process_commit();
                self.apply_commit(sender, commit.com_block);
            }
        }
    }

    pub fn process_block_retrieval(&mut self, sender: NodeId, request: BlockRetrievalRequest) {
        counters::BLOCK_RETRIEVAL_REQUESTS.inc();
        let response = self.sync.serve_retrieval(&self.block_tree, request);
        debug!(to = sender, response = %response, "serving block retrieval");
        self.network.respond(
            sender,
            ConsensusMsg::BlockRetrievalResponse(Box::new(response)),
        );
    }

    pub fn process_retrieval_response(&mut self, sender: NodeId, response: BlockRetrievalResponse) {
        let newly_linked = self.sync.process_retrieval_response(
            &mut self.block_tree,
            self.network.as_ref(),
            sender,
            response,
        );
        if !newly_linked.is_empty() {
            self.finish_linked_blocks(newly_linked);
        }
    }

    /// A patience interval elapsed. If it is still the live one and its
    /// arming transaction is still queued, pack everything pending into a
    /// block.
    pub fn process_patience_deadline(&mut self, deadline: PatienceDeadline) {
        if deadline.generation != self.timer_generation {
            debug!("superseded patience deadline ignored");
            return;
        }
        match (self.oldest_txn, self.new_txs.front().map(Transaction::id)) {
            (Some(armed), Some(front)) if armed == front => self.create_and_broadcast_block(),
            // The arming transaction left the queue in the meantime; arm for
            // whatever is pending now.
            _ => self.readjust_patience_timer(),
        }
    }

    fn create_and_broadcast_block(&mut self) {
        let parent = self.block_tree.head();
        let parent_depth = parent.depth().expect("linked head always has a depth");
        let txns: Vec<Transaction> = self.new_txs.drain(..).collect();
        self.oldest_txn = None;
        counters::PENDING_TXNS.set(0);

        // Promote first: the block advertises the mode its creator holds
        // after creating it.
        self.mode = self.mode.promoted();
        let seq = self.next_block_seq;
        self.next_block_seq += 1;
        let block = Block::new(
            self.node_id,
            seq,
            parent.id(),
            self.mode,
            txns,
            parent_depth + 1,
        );
        counters::CREATED_BLOCKS.inc();
        info!(node = self.node_id, block = %block, mode = %self.mode, "created block");

        if let Err(error) = self.block_tree.insert(block.clone()) {
            warn!(block = %block, error = %error, "created block failed to link");
            return;
        }
        // Move onto our own block right away so its transactions are off the
        // pending queue before any competing block arrives.
        match self.block_tree.move_to_block(block.id()) {
            Ok(replay) => self.apply_replay(replay),
            Err(error) => warn!(block = %block, error = %error, "failed to adopt own block"),
        }
        self.network
            .broadcast(ConsensusMsg::Block(Box::new(block.clone())));

        if self.mode.is_quick() {
            let last_committed = self.block_tree.committed().as_ref().clone();
            if let Some(try_msg) = self.paxos.open_round(block, last_committed) {
                counters::PAXOS_ROUNDS_OPENED.inc();
                self.network
                    .broadcast(ConsensusMsg::Paxos(Box::new(PaxosMsg::Try(try_msg))));
            }
        }
    }

    /// Post-link work shared by the block and retrieval handlers: adopt any
    /// newly linked block that wins the fork race, retry commits that were
    /// waiting on ancestry, and re-evaluate the patience timer.
    fn finish_linked_blocks(&mut self, newly_linked: Vec<Arc<Block>>) {
        for block in newly_linked {
            match self.block_tree.valid_block(block.id()) {
                Ok(true) => match self.block_tree.move_to_block(block.id()) {
                    Ok(replay) => self.apply_replay(replay),
                    Err(error) => warn!(block = %block, error = %error, "failed to move head"),
                },
                Ok(false) => {
                    // Stays in the observed set; a discarded fork or not
                    // deeper than the current head.
                    debug!(block = %block, "block not adopted as head");
                }
                Err(error) => warn!(block = %block, error = %error, "validity check failed"),
            }
        }
        self.retry_deferred_commits();
        self.readjust_patience_timer();
    }

    /// Apply a committed block to the tree, or defer until its ancestry is
    /// recovered. `origin` is the peer to ask for missing blocks.
    fn apply_commit(&mut self, origin: NodeId, block: Block) {
        if block.is_genesis() {
            return;
        }
        let block = self.block_tree.record_observed(block);
        let id = block.id();
        if !self.block_tree.is_linked(id) {
            match self
                .sync
                .try_insert(&mut self.block_tree, self.network.as_ref(), origin, block)
            {
                InsertResult::Pending => {
                    if !self.deferred_commits.contains(&id) {
                        debug!(block = %id, "deferring commit until ancestry is recovered");
                        self.deferred_commits.push_back(id);
                    }
                    return;
                }
                InsertResult::Linked(newly_linked) => {
                    // Cascade-linked descendants still compete for the head.
                    self.finish_linked_blocks(newly_linked);
                }
            }
        }
        self.finalize_commit(id);
    }

    fn finalize_commit(&mut self, id: BlockId) {
        let outcome = match self.block_tree.commit(id) {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(block = %id, error = %error, "commit failed");
                return;
            }
        };
        if outcome.committed.is_empty() {
            return;
        }
        self.apply_replay(outcome.replay);
        for block in &outcome.committed {
            counters::COMMITTED_BLOCKS.inc();
            for txn in block.txns() {
                self.known_txs.remove(&txn.id());
            }
            let notification = CommitNotification {
                block_id: block.id(),
                transactions: block.txns().to_vec(),
            };
            if self.commit_tx.unbounded_send(notification).is_err() {
                warn!("application receiver dropped; commit notification lost");
            }
        }
        let committed = self.block_tree.committed();
        counters::LAST_COMMITTED_DEPTH.set(committed.depth().unwrap_or(0) as i64);
        info!(node = self.node_id, committed = %committed, "committed block");
        self.network
            .broadcast(ConsensusMsg::AckCommit(AckCommit { block_id: id }));
        // The commit may have replayed or drained pending transactions.
        self.readjust_patience_timer();
    }

    fn retry_deferred_commits(&mut self) {
        let mut still_deferred = VecDeque::new();
        while let Some(id) = self.deferred_commits.pop_front() {
            if self.block_tree.is_linked(id) {
                self.finalize_commit(id);
            } else {
                still_deferred.push_back(id);
            }
        }
        self.deferred_commits = still_deferred;
    }

    /// Repair the pending queue after a head move: drop transactions the new
    /// branch already carries, requeue the ones the old branch loses.
    fn apply_replay(&mut self, replay: TxnReplay) {
        if !replay.adopted.is_empty() {
            self.new_txs.retain(|txn| !replay.adopted.contains(&txn.id()));
        }
        for txn in replay.displaced {
            if self.new_txs.iter().all(|queued| queued.id() != txn.id()) {
                debug!(txn = %txn, "requeueing displaced transaction");
                // The displaced transaction may have reached this node only
                // inside the abandoned block.
                self.known_txs.insert(txn.id());
                self.new_txs.push_back(txn);
            }
        }
        counters::PENDING_TXNS.set(self.new_txs.len() as i64);
    }

    fn arm_patience_timer(&mut self) {
        self.timer_generation += 1;
        let generation = self.timer_generation;
        let patience = self
            .patience
            .next_patience(self.mode, self.rtt.get(), &mut self.rng);
        debug!(
            node = self.node_id,
            mode = %self.mode,
            patience_ms = patience.as_millis() as u64,
            "arming patience timer"
        );
        let timeout_tx = self.timeout_tx.clone();
        self.time_service.run_after(
            patience,
            Box::new(move || {
                let _ = timeout_tx.unbounded_send(PatienceDeadline { generation });
            }),
        );
    }

    /// Re-evaluate the timer after the pending queue changed: disarm when
    /// drained, re-arm with a fresh patience when the queue head moved.
    fn readjust_patience_timer(&mut self) {
        match self.new_txs.front().map(Transaction::id) {
            None => {
                if self.oldest_txn.take().is_some() {
                    // Invalidate the running deadline.
                    self.timer_generation += 1;
                }
            }
            Some(front) if self.oldest_txn != Some(front) => {
                self.oldest_txn = Some(front);
                self.arm_patience_timer();
            }
            Some(_) => {}
        }
    }
}
