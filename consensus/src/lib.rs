// Copyright © piChain Contributors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! The piChain consensus core: a crash-fault-tolerant replicated log that
//! orders client transactions into a committed chain of blocks.
//!
//! Blocks form a tree rooted at a fixed genesis; forks are resolved by a
//! depth-then-creator total order, and finality comes from a two-round Paxos
//! commit opened by whichever node currently holds the quick role. Roles are
//! not elected: they emerge from round-trip-time patience heuristics, so the
//! fastest producer naturally becomes the de-facto proposer.
//!
//! The transport, the application state machine consuming committed
//! transactions, and the RTT estimator are external collaborators; this crate
//! exchanges structured [`pichain_consensus_types::msg::ConsensusMsg`] values
//! with the transport and pushes commit notifications upward.

pub mod block_storage;
pub mod config;
pub mod counters;
pub mod liveness;
pub mod network;
pub mod paxos;
pub mod round_manager;
pub mod state_replication;
pub mod util;

#[cfg(test)]
mod round_manager_test;
#[cfg(test)]
mod test_utils;
