// Copyright © piChain Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::util::time_service::{ScheduledTask, TimeService};
use std::{sync::Mutex, time::Duration};

/// Test-only timer: records scheduled tasks instead of sleeping, so tests
/// fire deadlines deterministically and can inspect the requested delays.
pub struct SimulatedTimeService {
    pending: Mutex<Vec<(Duration, ScheduledTask)>>,
}

impl SimulatedTimeService {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Delays of all tasks scheduled so far, in scheduling order.
    pub fn scheduled_delays(&self) -> Vec<Duration> {
        self.pending
            .lock()
            .unwrap()
            .iter()
            .map(|(delay, _)| *delay)
            .collect()
    }

    /// Run every pending task, including ones scheduled by the tasks
    /// themselves.
    pub fn fire_all(&self) {
        loop {
            let batch: Vec<_> = self.pending.lock().unwrap().drain(..).collect();
            if batch.is_empty() {
                return;
            }
            for (_, task) in batch {
                task();
            }
        }
    }
}

impl TimeService for SimulatedTimeService {
    fn run_after(&self, delay: Duration, task: ScheduledTask) {
        self.pending.lock().unwrap().push((delay, task));
    }
}
