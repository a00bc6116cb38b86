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

use crate::domain::config::k3d::K3dConf;
use crate::infrastructure::constants::{
    BOOTSTRAP_CLUSTER_NAME, BOOTSTRAP_CLUSTER_NAME_KEY, BOOTSTRAP_CONFIG_MAP,
    DEFAULT_CLUSTER_NAME, DEFAULT_NAMESPACE, NODE_PORT_MAX, NODE_PORT_MIN, PROFILE_ENV_VAR,
    RESOURCES_DIR_NAME,
};
use crate::shared::error::{ClusterError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Immutable description of the test cluster a `TestCluster` manages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClusterConfig {
    pub cluster_name: String,
    pub namespace: String,
    pub fail_on_existing_namespace: bool,
    /// Use this kubeconfig instead of a local k3d cluster
    pub kubeconfig: Option<PathBuf>,
    pub resources_dir: Option<PathBuf>,
    pub k3d: K3dConf,
    pub timeouts: TimeoutConf,
    pub bootstrap: BootstrapConf,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cluster_name: DEFAULT_CLUSTER_NAME.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            fail_on_existing_namespace: true,
            kubeconfig: None,
            resources_dir: None,
            k3d: K3dConf::default(),
            timeouts: TimeoutConf::default(),
            bootstrap: BootstrapConf::default(),
        }
    }
}

impl ClusterConfig {
    pub fn builder() -> ClusterConfigBuilder {
        ClusterConfigBuilder::default()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClusterError::config_error(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let conf: Self = toml::from_str(&content)?;
        conf.validate()?;
        Ok(conf)
    }

    pub fn is_local(&self) -> bool {
        self.kubeconfig.is_none()
    }

    /// The private per-user directory holding k3d, its assets and credentials.
    pub fn resources_dir(&self) -> Result<PathBuf> {
        match &self.resources_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::home_dir()
                .map(|home| home.join(RESOURCES_DIR_NAME))
                .ok_or_else(|| {
                    ClusterError::config_error("Cannot determine the home directory")
                }),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !is_valid_dns_label(&self.namespace) {
            return Err(ClusterError::ConfigError(format!(
                "Invalid namespace: {}",
                self.namespace
            )));
        }

        if !is_valid_dns_label(&self.cluster_name) {
            return Err(ClusterError::ConfigError(format!(
                "Invalid cluster_name: {}",
                self.cluster_name
            )));
        }

        if self.k3d.agents == 0 {
            return Err(ClusterError::ConfigError(
                "k3d.agents must be > 0".to_string(),
            ));
        }

        let ports = self.k3d.port_range();
        if ports.first < NODE_PORT_MIN || ports.last() > NODE_PORT_MAX {
            return Err(ClusterError::ConfigError(format!(
                "Published ports {}-{} fall outside the NodePort range {}-{}",
                ports.first,
                ports.last(),
                NODE_PORT_MIN,
                NODE_PORT_MAX
            )));
        }

        if self.timeouts.poll_interval_ms == 0 {
            return Err(ClusterError::ConfigError(
                "timeouts.poll_interval_ms must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Every bound the orchestrator waits under.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConf {
    /// Budget for reusing a cluster left over from a previous run
    pub probe_existing_ms: u64,
    /// Budget for a freshly created cluster to become reachable
    pub cluster_ready_secs: u64,
    pub poll_interval_ms: u64,
    pub install_secs: u64,
    pub create_secs: u64,
    pub delete_secs: u64,
    pub credentials_secs: u64,
    pub version_secs: u64,
    pub namespace_delete_secs: u64,
    pub namespace_create_secs: u64,
    pub readiness_secs: u64,
}

impl Default for TimeoutConf {
    fn default() -> Self {
        Self {
            probe_existing_ms: 1_000,
            cluster_ready_secs: 30,
            poll_interval_ms: 500,
            install_secs: 45,
            create_secs: 30,
            delete_secs: 10,
            credentials_secs: 10,
            version_secs: 10,
            namespace_delete_secs: 60,
            namespace_create_secs: 30,
            readiness_secs: 60,
        }
    }
}

impl TimeoutConf {
    pub fn probe_existing(&self) -> Duration {
        Duration::from_millis(self.probe_existing_ms)
    }

    pub fn cluster_ready(&self) -> Duration {
        Duration::from_secs(self.cluster_ready_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn install(&self) -> Duration {
        Duration::from_secs(self.install_secs)
    }

    pub fn create(&self) -> Duration {
        Duration::from_secs(self.create_secs)
    }

    pub fn delete(&self) -> Duration {
        Duration::from_secs(self.delete_secs)
    }

    pub fn credentials(&self) -> Duration {
        Duration::from_secs(self.credentials_secs)
    }

    pub fn version(&self) -> Duration {
        Duration::from_secs(self.version_secs)
    }

    pub fn namespace_delete(&self) -> Duration {
        Duration::from_secs(self.namespace_delete_secs)
    }

    pub fn namespace_create(&self) -> Duration {
        Duration::from_secs(self.namespace_create_secs)
    }

    pub fn readiness(&self) -> Duration {
        Duration::from_secs(self.readiness_secs)
    }
}

/// The config map seeded into the test namespace for workloads to consume.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BootstrapConf {
    pub config_map: String,
    pub data: BTreeMap<String, String>,
    /// Env var injected into pods; sourced from `profile_key` unless a profile is given
    pub profile_env: String,
    pub profile_key: String,
}

impl Default for BootstrapConf {
    fn default() -> Self {
        let mut data = BTreeMap::new();
        data.insert(
            BOOTSTRAP_CLUSTER_NAME_KEY.to_string(),
            BOOTSTRAP_CLUSTER_NAME.to_string(),
        );

        Self {
            config_map: BOOTSTRAP_CONFIG_MAP.to_string(),
            data,
            profile_env: PROFILE_ENV_VAR.to_string(),
            profile_key: BOOTSTRAP_CLUSTER_NAME_KEY.to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ClusterConfigBuilder {
    config: ClusterConfig,
}

impl ClusterConfigBuilder {
    /// Connect to the cluster described by this kubeconfig instead of a local one.
    pub fn kubeconfig(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.kubeconfig = Some(path.into());
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    pub fn fail_on_existing_namespace(mut self, fail: bool) -> Self {
        self.config.fail_on_existing_namespace = fail;
        self
    }

    pub fn cluster_name(mut self, name: impl Into<String>) -> Self {
        self.config.cluster_name = name.into();
        self
    }

    pub fn resources_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.resources_dir = Some(dir.into());
        self
    }

    pub fn k3d(mut self, k3d: K3dConf) -> Self {
        self.config.k3d = k3d;
        self
    }

    pub fn timeouts(mut self, timeouts: TimeoutConf) -> Self {
        self.config.timeouts = timeouts;
        self
    }

    pub fn bootstrap(mut self, bootstrap: BootstrapConf) -> Self {
        self.config.bootstrap = bootstrap;
        self
    }

    pub fn build(self) -> Result<ClusterConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// RFC 1123 label: lowercase alphanumerics and '-', at most 63 chars.
pub(crate) fn is_valid_dns_label(name: &str) -> bool {
    if name.is_empty() || name.len() > 63 {
        return false;
    }

    if !name.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return false;
    }
    if !name.ends_with(|c: char| c.is_ascii_alphanumeric()) {
        return false;
    }

    name.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}
