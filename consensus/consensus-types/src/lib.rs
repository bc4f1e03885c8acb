// Copyright © piChain Contributors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

pub mod block;
pub mod block_retrieval;
pub mod common;
pub mod msg;
pub mod paxos_msg;
pub mod transaction;
