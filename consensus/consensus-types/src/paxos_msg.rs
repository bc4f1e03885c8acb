// Copyright © piChain Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::{block::Block, common::RequestSeq};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Round 1 opener, broadcast by a quick node that wants to commit
/// `new_block`. Carries the sender's committed pointer so lagging acceptors
/// catch up before voting.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TryMsg {
    pub request_seq: RequestSeq,
    pub new_block: Block,
    pub last_committed_block: Block,
}

/// Round 1 vote. If the acceptor has already promised support for an earlier
/// proposal, it ships that proposal (and its support block) back so the
/// proposer can compromise on it.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TryOkMsg {
    pub request_seq: RequestSeq,
    pub prop_block: Option<Block>,
    pub supp_block: Option<Block>,
}

/// Round 2 opener. `com_block` is what the proposer now asks the cluster to
/// accept; `new_block` is its original candidate, kept alongside so acceptors
/// can check it is still the deepest they promised on.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ProposeMsg {
    pub request_seq: RequestSeq,
    pub com_block: Block,
    pub new_block: Block,
}

/// Round 2 vote.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ProposeAckMsg {
    pub request_seq: RequestSeq,
    pub com_block: Block,
}

/// Finalizes `com_block` on every receiver.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CommitMsg {
    pub request_seq: RequestSeq,
    pub com_block: Block,
}

/// The five Paxos round-trip payloads.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum PaxosMsg {
    Try(TryMsg),
    TryOk(TryOkMsg),
    Propose(ProposeMsg),
    ProposeAck(ProposeAckMsg),
    Commit(CommitMsg),
}

impl PaxosMsg {
    pub fn request_seq(&self) -> RequestSeq {
        match self {
            PaxosMsg::Try(msg) => msg.request_seq,
            PaxosMsg::TryOk(msg) => msg.request_seq,
            PaxosMsg::Propose(msg) => msg.request_seq,
            PaxosMsg::ProposeAck(msg) => msg.request_seq,
            PaxosMsg::Commit(msg) => msg.request_seq,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PaxosMsg::Try(_) => "Try",
            PaxosMsg::TryOk(_) => "TryOk",
            PaxosMsg::Propose(_) => "Propose",
            PaxosMsg::ProposeAck(_) => "ProposeAck",
            PaxosMsg::Commit(_) => "Commit",
        }
    }
}

impl fmt::Display for PaxosMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(seq: {})", self.name(), self.request_seq())
    }
}
