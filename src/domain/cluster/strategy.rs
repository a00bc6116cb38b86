// Copyright 2025 JiangLong.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::infrastructure::kubernetes::ClusterHandle;
use crate::shared::error::Result;
use std::fmt;

/// Where a connection strategy currently is in reaching its cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectState {
    Uninitialized,
    ProbingExisting,
    Recreating,
    Connected,
    ConnectFailed,
}

impl fmt::Display for ConnectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            ConnectState::Uninitialized => "uninitialized",
            ConnectState::ProbingExisting => "probing existing cluster",
            ConnectState::Recreating => "recreating cluster",
            ConnectState::Connected => "connected",
            ConnectState::ConnectFailed => "connect failed",
        };
        f.write_str(state)
    }
}

/// Produces a connected cluster handle. Composed into `TestCluster`.
#[async_trait::async_trait]
pub trait ConnectionStrategy: Send + Sync {
    /// Short name used in logs, e.g. "local-k3d".
    fn kind(&self) -> &'static str;

    fn state(&self) -> ConnectState;

    async fn connect(&self) -> Result<ClusterHandle>;
}
