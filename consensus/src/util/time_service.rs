// Copyright © piChain Contributors
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// A task scheduled for a later point on the node's cooperative loop.
/// Typically a closure that pushes a wakeup into the round manager's event
/// channel, so firing never interleaves with a running handler.
pub type ScheduledTask = Box<dyn FnOnce() + Send + 'static>;

/// Abstraction over the timer so tests can drive deadlines manually.
pub trait TimeService: Send + Sync {
    /// Run `task` once `delay` has elapsed.
    fn run_after(&self, delay: Duration, task: ScheduledTask);
}

/// Production implementation backed by the tokio timer.
pub struct ClockTimeService {
    executor: tokio::runtime::Handle,
}

impl ClockTimeService {
    pub fn new(executor: tokio::runtime::Handle) -> Self {
        Self { executor }
    }
}

impl TimeService for ClockTimeService {
    fn run_after(&self, delay: Duration, task: ScheduledTask) {
        self.executor.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            task();
        });
    }
}
