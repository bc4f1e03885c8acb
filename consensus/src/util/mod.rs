// Copyright © piChain Contributors
// SPDX-License-Identifier: Apache-2.0

#[cfg(test)]
pub mod mock_time_service;
pub mod time_service;
