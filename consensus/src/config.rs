// Copyright © piChain Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::{ensure, Result};
use pichain_consensus_types::common::{NodeId, NodeMode, GENESIS_CREATOR};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// This node's identity within the cluster.
    pub node_id: NodeId,
    /// Total number of nodes; majorities are computed against this.
    pub cluster_size: usize,
    /// Role at startup. The role adjusts itself at runtime: block creation
    /// promotes, deeper or quick-creator blocks demote.
    pub initial_mode: NodeMode,
    /// Round-trip estimate used until the transport's estimator reports a
    /// measured value.
    pub expected_rtt_ms: u64,
    /// Patience slack factor.
    pub epsilon: f64,
    /// Maximum number of blocks returned for one block-retrieval request.
    pub max_retrieval_blocks: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            node_id: 0,
            cluster_size: 3,
            initial_mode: NodeMode::Slow,
            expected_rtt_ms: 1_000,
            epsilon: 1e-3,
            max_retrieval_blocks: 5,
        }
    }
}

impl ConsensusConfig {
    pub fn expected_rtt(&self) -> Duration {
        Duration::from_millis(self.expected_rtt_ms)
    }

    pub fn sanitize(&self) -> Result<()> {
        ensure!(self.cluster_size >= 1, "cluster must have at least one node");
        ensure!(
            self.node_id != GENESIS_CREATOR,
            "node id {} is reserved for genesis",
            GENESIS_CREATOR
        );
        ensure!(self.epsilon > 0.0, "epsilon must be positive");
        ensure!(
            self.max_retrieval_blocks >= 1,
            "retrieval must return at least one block"
        );
        Ok(())
    }
}
