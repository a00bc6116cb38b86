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

use crate::infrastructure::constants::{
    DEFAULT_AGENTS, DEFAULT_FIRST_NODE_PORT, DEFAULT_K3D_TAG, DEFAULT_NODE_PORT_COUNT,
};
use crate::shared::error::ClusterError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Settings for the local k3d-backed cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct K3dConf {
    /// Exact release tag of k3d to install and require, e.g. "v3.0.2"
    pub version_tag: String,
    /// Command-line dialect; inferred from `version_tag` when unset
    pub dialect: Option<CliDialect>,
    pub agents: u32,
    pub first_node_port: u16,
    pub node_port_count: u16,
    /// Registries config mounted into the nodes; an embedded default is used when unset
    pub registries_file: Option<PathBuf>,
}

impl Default for K3dConf {
    fn default() -> Self {
        Self {
            version_tag: DEFAULT_K3D_TAG.to_string(),
            dialect: None,
            agents: DEFAULT_AGENTS,
            first_node_port: DEFAULT_FIRST_NODE_PORT,
            node_port_count: DEFAULT_NODE_PORT_COUNT,
            registries_file: None,
        }
    }
}

impl K3dConf {
    pub fn dialect(&self) -> CliDialect {
        self.dialect
            .unwrap_or_else(|| CliDialect::for_tag(&self.version_tag))
    }

    pub fn port_range(&self) -> PortRange {
        PortRange::new(self.first_node_port, self.node_port_count)
    }
}

/// The flag syntax spoken by a given k3d release line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CliDialect {
    /// k3d v3 and v4: `--port 31001:31001@agent[0]`
    V3,
    /// k3d v5 and later: `--port 31001:31001@agent:0`
    V5,
}

impl CliDialect {
    pub fn for_tag(tag: &str) -> Self {
        let major = tag
            .trim_start_matches('v')
            .split('.')
            .next()
            .and_then(|m| m.parse::<u32>().ok());

        match major {
            Some(m) if m < 5 => CliDialect::V3,
            _ => CliDialect::V5,
        }
    }

    pub fn agent_node_filter(&self, agent: u32) -> String {
        match self {
            CliDialect::V3 => format!("agent[{}]", agent),
            CliDialect::V5 => format!("agent:{}", agent),
        }
    }
}

impl std::str::FromStr for CliDialect {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "v3" => Ok(CliDialect::V3),
            "v5" => Ok(CliDialect::V5),
            _ => Err(ClusterError::ConfigError(format!(
                "Invalid k3d dialect: {}",
                s
            ))),
        }
    }
}

/// Node ports published one-to-one from the first agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub first: u16,
    pub count: u16,
}

impl PortRange {
    pub fn new(first: u16, count: u16) -> Self {
        Self { first, count }
    }

    pub fn last(&self) -> u16 {
        self.first.saturating_add(self.count.saturating_sub(1))
    }

    pub fn ports(&self) -> impl Iterator<Item = u16> {
        let first = self.first;
        (0..self.count).map(move |offset| first + offset)
    }
}
