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

use crate::cli::display::{TableRenderer, WorkloadRow};
use crate::domain::cluster::TestCluster;
use crate::domain::config::ClusterConfig;
use crate::infrastructure::constants::EXTERNAL_KUBECONFIG_NAME;
use crate::infrastructure::k3d::{ClusterCli, K3dCommands};
use crate::infrastructure::kubernetes::{TestKubeClient, TestKubeClientImpl};
use crate::infrastructure::process::ProcessRunner;
use crate::infrastructure::ResourcesDir;
use clap::{Args, Parser};
use std::path::PathBuf;
use std::sync::Arc;

/// Options shared by every command for locating the cluster
#[derive(Args, Debug, Clone, Default)]
pub struct ClusterArgs {
    /// Path to a TOML configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Test namespace (default: k8s-test)
    #[arg(long, short = 'n')]
    pub namespace: Option<String>,

    /// Use an existing cluster through this kubeconfig instead of a local k3d cluster
    #[arg(long, value_name = "PATH")]
    pub kubeconfig: Option<PathBuf>,

    /// Name of the local k3d cluster (default: k3s-test-cluster)
    #[arg(long)]
    pub cluster_name: Option<String>,
}

impl ClusterArgs {
    /// The config file (or defaults) with command-line overrides applied
    pub fn load_config(&self) -> anyhow::Result<ClusterConfig> {
        let mut config = match &self.config {
            Some(path) => ClusterConfig::from_file(path)
                .map_err(|e| anyhow::anyhow!("Failed to load {}: {}", path.display(), e))?,
            None => ClusterConfig::default(),
        };

        if let Some(namespace) = &self.namespace {
            config.namespace = namespace.clone();
        }
        if let Some(kubeconfig) = &self.kubeconfig {
            config.kubeconfig = Some(kubeconfig.clone());
        }
        if let Some(name) = &self.cluster_name {
            config.cluster_name = name.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

fn k3d_commands(config: &ClusterConfig) -> anyhow::Result<K3dCommands> {
    Ok(K3dCommands::new(
        Arc::new(ProcessRunner::new()),
        ResourcesDir::new(config.resources_dir()?),
        config.k3d.dialect(),
        config.k3d.agents,
        config.timeouts.clone(),
    ))
}

/// Client for a cluster brought up earlier, without touching the namespace
async fn existing_client(config: &ClusterConfig) -> anyhow::Result<TestKubeClientImpl> {
    let resources = ResourcesDir::new(config.resources_dir()?);
    let kubeconfig = if config.is_local() {
        resources.kubeconfig_for(&config.cluster_name)
    } else {
        resources.root().join(EXTERNAL_KUBECONFIG_NAME)
    };

    if !kubeconfig.exists() {
        anyhow::bail!(
            "No credentials at {}. Run 'kube-testcluster up' first",
            kubeconfig.display()
        );
    }

    TestKubeClientImpl::new_with_config(&kubeconfig)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect: {}", e))
}

#[derive(Parser, Debug)]
pub struct UpCommand {
    #[command(flatten)]
    pub cluster: ClusterArgs,

    /// Delete and recreate an existing test namespace instead of failing
    #[arg(long)]
    pub allow_existing_namespace: bool,
}

impl UpCommand {
    pub async fn execute(&self) -> anyhow::Result<()> {
        let mut config = self.cluster.load_config()?;
        if self.allow_existing_namespace {
            config.fail_on_existing_namespace = false;
        }

        let cluster = TestCluster::new(config)?;
        println!("Setting up test cluster...");
        let handle = cluster.setup().await?;

        let workloads = cluster.workloads()?;
        let deployments = workloads.deployments().await.unwrap_or_default();
        let images = workloads.images().await.unwrap_or_default();

        let renderer = TableRenderer::new();
        println!(
            "{}",
            renderer.render_setup_summary(
                &handle.cluster_url(),
                cluster.strategy().kind(),
                cluster.namespace(),
                &deployments,
                &images,
            )
        );
        println!("Kubeconfig: {}", handle.credentials().path().display());
        Ok(())
    }
}

#[derive(Parser, Debug)]
pub struct StatusCommand {
    #[command(flatten)]
    pub cluster: ClusterArgs,
}

impl StatusCommand {
    pub async fn execute(&self) -> anyhow::Result<()> {
        let config = self.cluster.load_config()?;
        let client = existing_client(&config).await?;

        let mut rows: Vec<WorkloadRow> = client
            .list_deployments_all()
            .await?
            .iter()
            .filter(|d| d.metadata.namespace.as_deref() == Some(config.namespace.as_str()))
            .map(WorkloadRow::from_deployment)
            .collect();
        rows.extend(
            client
                .list_pods(&config.namespace)
                .await?
                .iter()
                .map(WorkloadRow::from_pod),
        );

        let renderer = TableRenderer::new();
        println!("{}", renderer.render_workloads(&config.namespace, &rows));
        Ok(())
    }
}

#[derive(Parser, Debug)]
pub struct DownCommand {
    #[command(flatten)]
    pub cluster: ClusterArgs,
}

impl DownCommand {
    pub async fn execute(&self) -> anyhow::Result<()> {
        let config = self.cluster.load_config()?;
        let client = existing_client(&config).await?;

        client
            .delete_namespace(&config.namespace)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to delete namespace: {}", e))?;

        println!("Namespace {} is being deleted", config.namespace);
        Ok(())
    }
}

#[derive(Parser, Debug)]
pub struct InstallCommand {
    #[command(flatten)]
    pub cluster: ClusterArgs,

    /// Reinstall even when the pinned version is already present
    #[arg(long)]
    pub force: bool,
}

impl InstallCommand {
    pub async fn execute(&self) -> anyhow::Result<()> {
        let config = self.cluster.load_config()?;
        let k3d = k3d_commands(&config)?;
        let tag = &config.k3d.version_tag;

        if !self.force && k3d.is_tool_installed(tag).await {
            println!("k3d {} already installed at {}", tag, k3d.exec().display());
            return Ok(());
        }

        k3d.install_tool(tag).await?;
        println!("k3d {} installed at {}", tag, k3d.exec().display());
        Ok(())
    }
}

#[derive(Parser, Debug)]
pub struct DeleteClusterCommand {
    #[command(flatten)]
    pub cluster: ClusterArgs,
}

impl DeleteClusterCommand {
    pub async fn execute(&self) -> anyhow::Result<()> {
        let config = self.cluster.load_config()?;
        if !config.is_local() {
            anyhow::bail!("Refusing to delete a cluster reached through an external kubeconfig");
        }

        let k3d = k3d_commands(&config)?;
        k3d.delete_cluster(&config.cluster_name).await?;
        println!("Cluster {} deleted", config.cluster_name);
        Ok(())
    }
}
