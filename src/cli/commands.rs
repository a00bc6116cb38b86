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

// CLI command definitions

use super::cluster::{
    DeleteClusterCommand, DownCommand, InstallCommand, StatusCommand, UpCommand,
};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "kube-testcluster",
    version,
    about = "Ephemeral Kubernetes test clusters",
    long_about = "Provision a local k3d cluster (or use an existing kubeconfig) and a fresh test namespace for integration tests"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Ensure a healthy cluster and a fresh test namespace
    Up(UpCommand),

    /// Show deployments and pods in the test namespace
    Status(StatusCommand),

    /// Delete the test namespace without waiting
    Down(DownCommand),

    /// Install the pinned k3d release into the resources directory
    Install(InstallCommand),

    /// Delete the local k3d cluster
    DeleteCluster(DeleteClusterCommand),
}
