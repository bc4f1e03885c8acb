// Copyright © piChain Contributors
// SPDX-License-Identifier: Apache-2.0

use pichain_consensus_types::common::NodeMode;
use rand::Rng;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

/// Shared handle on the round-trip estimate. The transport's ping/pong loop
/// refreshes it; consensus only reads.
#[derive(Clone)]
pub struct RttEstimate {
    micros: Arc<AtomicU64>,
}

impl RttEstimate {
    pub fn new(initial: Duration) -> Self {
        Self {
            micros: Arc::new(AtomicU64::new(initial.as_micros() as u64)),
        }
    }

    pub fn get(&self) -> Duration {
        Duration::from_micros(self.micros.load(Ordering::Relaxed))
    }

    pub fn update(&self, rtt: Duration) {
        self.micros.store(rtt.as_micros() as u64, Ordering::Relaxed);
    }
}

/// How long a node waits after the first pending transaction arrives before
/// packing a block. A quick node fires immediately and so keeps the proposer
/// role; a medium node waits just over one round trip, long enough for a
/// quick node's block to arrive first; slow nodes spread themselves over an
/// interval so that at most one of them is likely to step up if the quick
/// node stays silent.
pub struct Patience {
    epsilon: f64,
    cluster_size: usize,
    /// The slow draw happens once per process lifetime and is reused.
    slow_patience: Option<Duration>,
}

impl Patience {
    pub fn new(epsilon: f64, cluster_size: usize) -> Self {
        Self {
            epsilon,
            cluster_size,
            slow_patience: None,
        }
    }

    pub fn next_patience<R: Rng>(&mut self, mode: NodeMode, rtt: Duration, rng: &mut R) -> Duration {
        match mode {
            NodeMode::Quick => Duration::ZERO,
            NodeMode::Medium => rtt.mul_f64(1.0 + self.epsilon),
            NodeMode::Slow => {
                let epsilon = self.epsilon;
                let cluster_size = self.cluster_size as f64;
                *self.slow_patience.get_or_insert_with(|| {
                    let rtt_secs = rtt.as_secs_f64();
                    let low = (2.0 + epsilon) * rtt_secs;
                    let high = low + cluster_size * rtt_secs / 2.0;
                    let drawn = if high > low {
                        rng.gen_range(low, high)
                    } else {
                        low
                    };
                    Duration::from_secs_f64(drawn)
                })
            }
        }
    }
}
