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

use crate::domain::config::{CliDialect, PortRange, TimeoutConf};
use crate::infrastructure::constants::{
    ENV_K3D_INSTALL_DIR, ENV_K3D_TAG, ENV_PATH, K3D_DIR_NAME, K3D_INSTALL_SCRIPT_NAME,
    K3S_REGISTRIES_PATH, REGISTRIES_FILE_NAME,
};
use crate::infrastructure::kubernetes::credentials::CredentialsArtifact;
use crate::infrastructure::process::{CommandRunner, CommandSpec, ProcessOutput};
use crate::infrastructure::resources_dir::ResourcesDir;
use crate::shared::error::{ClusterError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const INSTALL_SCRIPT: &str = include_str!("../../../assets/k3d-install.sh");
const DEFAULT_REGISTRIES: &str = include_str!("../../../assets/k3s-registries.yaml");
const VERSION_PATTERN: &str = r"k3d version (v\S+)";

/// Typed operations over the cluster-management CLI.
#[async_trait::async_trait]
pub trait ClusterCli: Send + Sync {
    /// True only if the binary exists and reports exactly `expected_tag`.
    async fn is_tool_installed(&self, expected_tag: &str) -> bool;

    async fn install_tool(&self, version_tag: &str) -> Result<()>;

    /// Write the registries config into the resources directory, from `custom`
    /// when given, otherwise from the embedded default.
    fn prepare_registries(&self, custom: Option<&Path>) -> Result<PathBuf>;

    async fn create_cluster(&self, name: &str, ports: PortRange, registries: &Path) -> Result<()>;

    async fn delete_cluster(&self, name: &str) -> Result<()>;

    /// Fails with `CredentialsUnavailable` while the cluster does not exist.
    async fn fetch_credentials(&self, name: &str) -> Result<CredentialsArtifact>;
}

pub struct K3dCommands {
    runner: Arc<dyn CommandRunner>,
    resources: ResourcesDir,
    dialect: CliDialect,
    agents: u32,
    timeouts: TimeoutConf,
}

impl K3dCommands {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        resources: ResourcesDir,
        dialect: CliDialect,
        agents: u32,
        timeouts: TimeoutConf,
    ) -> Self {
        Self {
            runner,
            resources,
            dialect,
            agents,
            timeouts,
        }
    }

    pub fn exec(&self) -> PathBuf {
        self.resources.k3d_exec()
    }

    /// The tag reported by the installed binary, if any.
    pub async fn installed_version(&self) -> Option<String> {
        let exec = self.exec();
        if !exec.exists() {
            return None;
        }

        let spec = CommandSpec::new(&exec)
            .arg("version")
            .timeout(self.timeouts.version());
        match self.runner.run(&spec).await {
            Ok(output) if output.success() => parse_version(&output.stdout),
            Ok(output) => {
                warn!(reason = %output.failure_reason(), "k3d version failed");
                None
            }
            Err(e) => {
                warn!(error = %e, "k3d version failed");
                None
            }
        }
    }

    pub fn create_args(&self, name: &str, ports: PortRange, registries: &Path) -> Vec<String> {
        create_args(self.dialect, self.agents, name, ports, registries)
    }

    async fn run_k3d(&self, args: Vec<String>, timeout: std::time::Duration) -> Result<ProcessOutput> {
        let spec = CommandSpec::new(self.exec()).args(args).timeout(timeout);
        self.runner.run(&spec).await
    }
}

#[async_trait::async_trait]
impl ClusterCli for K3dCommands {
    async fn is_tool_installed(&self, expected_tag: &str) -> bool {
        match self.installed_version().await {
            Some(version) if version == expected_tag => true,
            Some(version) => {
                info!(installed = %version, expected = %expected_tag, "k3d version mismatch");
                false
            }
            None => false,
        }
    }

    async fn install_tool(&self, version_tag: &str) -> Result<()> {
        self.resources.ensure()?;
        let script = self.resources.write_file(
            Path::new(K3D_DIR_NAME).join(K3D_INSTALL_SCRIPT_NAME),
            INSTALL_SCRIPT,
            true,
        )?;

        let k3d_dir = self.resources.k3d_dir();
        let mut paths: Vec<PathBuf> = std::env::var_os(ENV_PATH)
            .map(|p| std::env::split_paths(&p).collect())
            .unwrap_or_default();
        paths.push(k3d_dir.clone());
        let path = std::env::join_paths(paths)
            .map_err(|e| ClusterError::ToolInstall(format!("Cannot build PATH: {}", e)))?;

        info!(tag = %version_tag, dir = %k3d_dir.display(), "running k3d install script");
        let spec = CommandSpec::new("bash")
            .arg(script.display().to_string())
            .arg("--no-sudo")
            .env(ENV_K3D_INSTALL_DIR, k3d_dir.display().to_string())
            .env(ENV_K3D_TAG, version_tag)
            .env(ENV_PATH, path.to_string_lossy())
            .timeout(self.timeouts.install());

        match self.runner.run(&spec).await {
            Ok(output) if output.success() => {}
            Ok(output) => return Err(ClusterError::ToolInstall(output.failure_reason())),
            Err(e) => return Err(ClusterError::ToolInstall(e.to_string())),
        }

        match self.installed_version().await {
            Some(version) => info!(version = %version, "k3d installed successfully"),
            None => warn!("k3d installed but does not report a version"),
        }
        Ok(())
    }

    fn prepare_registries(&self, custom: Option<&Path>) -> Result<PathBuf> {
        match custom {
            Some(source) => self.resources.copy_in(source, REGISTRIES_FILE_NAME, false),
            None => self
                .resources
                .write_file(REGISTRIES_FILE_NAME, DEFAULT_REGISTRIES, false),
        }
    }

    async fn create_cluster(&self, name: &str, ports: PortRange, registries: &Path) -> Result<()> {
        info!(cluster = %name, "creating local k3s cluster");
        let args = self.create_args(name, ports, registries);

        match self.run_k3d(args, self.timeouts.create()).await {
            Ok(output) if output.success() => Ok(()),
            Ok(output) => Err(ClusterError::ClusterCreate {
                cluster: name.to_string(),
                reason: output.failure_reason(),
            }),
            Err(e) => Err(ClusterError::ClusterCreate {
                cluster: name.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn delete_cluster(&self, name: &str) -> Result<()> {
        info!(cluster = %name, "deleting local k3s cluster");
        let args = vec!["cluster".to_string(), "delete".to_string(), name.to_string()];

        match self.run_k3d(args, self.timeouts.delete()).await {
            Ok(output) if output.success() => Ok(()),
            Ok(output) => Err(ClusterError::ClusterDelete {
                cluster: name.to_string(),
                reason: output.failure_reason(),
            }),
            Err(e) => Err(ClusterError::ClusterDelete {
                cluster: name.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn fetch_credentials(&self, name: &str) -> Result<CredentialsArtifact> {
        let args = vec!["kubeconfig".to_string(), "get".to_string(), name.to_string()];
        let unavailable = |reason: String| ClusterError::CredentialsUnavailable {
            cluster: name.to_string(),
            reason,
        };

        let output = self
            .run_k3d(args, self.timeouts.credentials())
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        if !output.success() {
            return Err(unavailable(output.failure_reason()));
        }
        if output.stdout.trim().is_empty() {
            return Err(unavailable("k3d printed an empty kubeconfig".to_string()));
        }

        let relative = self
            .resources
            .kubeconfig_for(name)
            .strip_prefix(self.resources.root())
            .map(Path::to_path_buf)
            .map_err(|e| unavailable(e.to_string()))?;
        let path = self
            .resources
            .write_file(relative, &format!("{}\n", output.stdout), false)?;
        debug!(path = %path.display(), "kubeconfig written");
        Ok(CredentialsArtifact::new(path))
    }
}

pub(crate) fn create_args(
    dialect: CliDialect,
    agents: u32,
    name: &str,
    ports: PortRange,
    registries: &Path,
) -> Vec<String> {
    let mut args = vec![
        "cluster".to_string(),
        "create".to_string(),
        name.to_string(),
        "--agents".to_string(),
        agents.to_string(),
    ];

    let node = dialect.agent_node_filter(0);
    for port in ports.ports() {
        args.push("--port".to_string());
        args.push(format!("{}:{}@{}", port, port, node));
    }

    args.push("--volume".to_string());
    args.push(format!("{}:{}", registries.display(), K3S_REGISTRIES_PATH));
    args
}

pub(crate) fn parse_version(output: &str) -> Option<String> {
    let re = Regex::new(VERSION_PATTERN).ok()?;
    re.captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
