// Copyright © piChain Contributors
// SPDX-License-Identifier: Apache-2.0

use futures_channel::mpsc;
use pichain_consensus_types::{block::BlockId, transaction::Transaction};

/// Sent upward once per newly committed block, in chain order. The
/// transactions appear in their in-block order; walking the notifications
/// replays the exact committed log, with no duplicates.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommitNotification {
    pub block_id: BlockId,
    pub transactions: Vec<Transaction>,
}

pub type CommitNotificationSender = mpsc::UnboundedSender<CommitNotification>;
pub type CommitNotificationReceiver = mpsc::UnboundedReceiver<CommitNotification>;

pub fn commit_notification_channel() -> (CommitNotificationSender, CommitNotificationReceiver) {
    mpsc::unbounded()
}
