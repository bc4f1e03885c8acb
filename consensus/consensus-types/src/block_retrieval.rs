// Copyright © piChain Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::block::{Block, BlockId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Point-to-point request for a block (and a few of its ancestors) this node
/// heard about but never received.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct BlockRetrievalRequest {
    pub block_id: BlockId,
}

/// Response carrying up to the responder's retrieval limit of blocks on the
/// path from the requested block toward genesis, parent-first so the
/// requester can link them in one pass. Empty when the responder has never
/// seen the requested id either.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct BlockRetrievalResponse {
    pub blocks: Vec<Block>,
}

impl fmt::Display for BlockRetrievalRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockRetrievalRequest({})", self.block_id)
    }
}

impl fmt::Display for BlockRetrievalResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockRetrievalResponse({} blocks)", self.blocks.len())
    }
}
