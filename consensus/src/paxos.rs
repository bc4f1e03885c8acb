// Copyright © piChain Contributors
// SPDX-License-Identifier: Apache-2.0

use pichain_consensus_types::{
    block::Block,
    common::RequestSeq,
    paxos_msg::{CommitMsg, ProposeAckMsg, ProposeMsg, TryMsg, TryOkMsg},
};
use tracing::debug;

/// Acceptor-side Paxos state. `max_block` is the deepest candidate seen in
/// round 1; `prop_block` / `supp_block` remember a proposal this acceptor
/// promised to support in round 2, shipped back to later proposers so they
/// compromise on it.
struct AcceptorState {
    max_block: Block,
    prop_block: Option<Block>,
    supp_block: Option<Block>,
}

impl Default for AcceptorState {
    fn default() -> Self {
        Self {
            // Genesis, not "nothing": the next round's TRY has to have a
            // block to rank against.
            max_block: Block::genesis().clone(),
            prop_block: None,
            supp_block: None,
        }
    }
}

/// Proposer-side Paxos state for the one instance this node may have in
/// flight.
#[derive(Default)]
struct ProposerState {
    new_block: Option<Block>,
    prop_block: Option<Block>,
    supp_block: Option<Block>,
    request_seq: RequestSeq,
    votes: usize,
    commit_in_flight: bool,
}

/// The two-round commit protocol, pure state only: handlers take a message
/// and return the reply (if any) for the caller to send. Every node plays
/// both roles at once. Replies are gated on `request_seq` so reordered or
/// stale messages die here instead of corrupting a newer round.
pub struct PaxosEngine {
    cluster_size: usize,
    acceptor: AcceptorState,
    proposer: ProposerState,
}

impl PaxosEngine {
    pub fn new(cluster_size: usize) -> Self {
        Self {
            cluster_size,
            acceptor: AcceptorState::default(),
            proposer: ProposerState::default(),
        }
    }

    pub fn commit_in_flight(&self) -> bool {
        self.proposer.commit_in_flight
    }

    pub fn request_seq(&self) -> RequestSeq {
        self.proposer.request_seq
    }

    /// Start a new instance to commit `new_block`. Returns the TRY to
    /// broadcast, or `None` while a previous instance is still in flight.
    pub fn open_round(&mut self, new_block: Block, last_committed: Block) -> Option<TryMsg> {
        if self.proposer.commit_in_flight {
            debug!("commit already in flight, not opening a new round");
            return None;
        }
        self.proposer.commit_in_flight = true;
        self.proposer.votes = 0;
        self.proposer.request_seq += 1;
        self.proposer.new_block = Some(new_block.clone());
        self.proposer.prop_block = None;
        self.proposer.supp_block = None;
        Some(TryMsg {
            request_seq: self.proposer.request_seq,
            new_block,
            last_committed_block: last_committed,
        })
    }

    /// Round 1, acceptor side. The caller has already applied the sender's
    /// committed pointer to the local tree.
    pub fn process_try(&mut self, msg: TryMsg) -> Option<TryOkMsg> {
        if !msg.new_block.ranks_above(&self.acceptor.max_block) {
            debug!(candidate = %msg.new_block, "TRY candidate does not outrank the deepest seen, ignoring");
            return None;
        }
        self.acceptor.max_block = msg.new_block;
        Some(TryOkMsg {
            request_seq: msg.request_seq,
            prop_block: self.acceptor.prop_block.clone(),
            supp_block: self.acceptor.supp_block.clone(),
        })
    }

    /// Round 1, proposer side. On a majority, move to round 2: propose the
    /// compromise block, which is the deepest-supported prior proposal any
    /// acceptor reported, or our own candidate if none did.
    pub fn process_try_ok(&mut self, msg: TryOkMsg) -> Option<ProposeMsg> {
        if msg.request_seq != self.proposer.request_seq {
            debug!(
                got = msg.request_seq,
                current = self.proposer.request_seq,
                "stale TRY_OK dropped"
            );
            return None;
        }
        if let Some(supp_block) = msg.supp_block {
            let deeper = match &self.proposer.supp_block {
                Some(current) => supp_block.ranks_above(current),
                None => true,
            };
            if deeper {
                self.proposer.supp_block = Some(supp_block);
                self.proposer.prop_block = msg.prop_block;
            }
        }
        self.proposer.votes += 1;
        if !self.majority() {
            return None;
        }
        self.proposer.votes = 0;
        self.proposer.request_seq += 1;
        let new_block = self.proposer.new_block.clone()?;
        let com_block = self
            .proposer
            .prop_block
            .clone()
            .unwrap_or_else(|| new_block.clone());
        Some(ProposeMsg {
            request_seq: self.proposer.request_seq,
            com_block,
            new_block,
        })
    }

    /// Round 2, acceptor side. Only accept while the proposer's candidate is
    /// still the deepest this acceptor saw in round 1; a deeper TRY arriving
    /// in between invalidates the proposal.
    pub fn process_propose(&mut self, msg: ProposeMsg) -> Option<ProposeAckMsg> {
        let still_deepest = match (msg.new_block.depth(), self.acceptor.max_block.depth()) {
            (Some(proposed), Some(max)) => proposed == max,
            _ => false,
        };
        if !still_deepest {
            debug!(proposed = %msg.new_block, "out-of-order PROPOSE dropped");
            return None;
        }
        self.acceptor.prop_block = Some(msg.com_block.clone());
        self.acceptor.supp_block = Some(msg.new_block);
        Some(ProposeAckMsg {
            request_seq: msg.request_seq,
            com_block: msg.com_block,
        })
    }

    /// Round 2, proposer side. On a majority the instance is decided: the
    /// caller broadcasts the returned COMMIT and applies it locally too,
    /// since broadcasts do not loop back.
    pub fn process_propose_ack(&mut self, msg: ProposeAckMsg) -> Option<CommitMsg> {
        if msg.request_seq != self.proposer.request_seq {
            debug!(
                got = msg.request_seq,
                current = self.proposer.request_seq,
                "stale PROPOSE_ACK dropped"
            );
            return None;
        }
        self.proposer.votes += 1;
        if !self.majority() {
            return None;
        }
        self.proposer.request_seq += 1;
        self.proposer.commit_in_flight = false;
        self.proposer.new_block = None;
        Some(CommitMsg {
            request_seq: self.proposer.request_seq,
            com_block: msg.com_block,
        })
    }

    /// A COMMIT was applied: reset the acceptor for the next instance. The
    /// decision also releases any round this node still had in flight; its
    /// replies are dead by request_seq from here on, and the next locally
    /// created block may open a fresh instance.
    pub fn process_commit(&mut self) {
        self.acceptor = AcceptorState::default();
        self.proposer.commit_in_flight = false;
        self.proposer.new_block = None;
    }

    fn majority(&self) -> bool {
        2 * self.proposer.votes > self.cluster_size
    }
}
