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

//! The local ephemeral cluster strategy.
//!
//! A cluster left behind by an earlier run is reused when it answers within the
//! short probe budget. Otherwise it is deleted (ignoring errors, it may not
//! exist) and created again, then polled for up to the longer ready budget.

use crate::domain::cluster::strategy::{ConnectState, ConnectionStrategy};
use crate::domain::config::{K3dConf, TimeoutConf};
use crate::infrastructure::k3d::ClusterCli;
use crate::infrastructure::kubernetes::{ClusterConnector, ClusterHandle};
use crate::shared::error::{ClusterError, Result};
use crate::shared::poll::poll_until;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct LocalK3dStrategy {
    cluster_name: String,
    k3d: K3dConf,
    timeouts: TimeoutConf,
    cli: Arc<dyn ClusterCli>,
    connector: Arc<dyn ClusterConnector>,
    state: Mutex<ConnectState>,
}

impl LocalK3dStrategy {
    pub fn new(
        cluster_name: impl Into<String>,
        k3d: K3dConf,
        timeouts: TimeoutConf,
        cli: Arc<dyn ClusterCli>,
        connector: Arc<dyn ClusterConnector>,
    ) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            k3d,
            timeouts,
            cli,
            connector,
            state: Mutex::new(ConnectState::Uninitialized),
        }
    }

    fn set_state(&self, state: ConnectState) {
        debug!(cluster = %self.cluster_name, state = %state, "connection state");
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    async fn ensure_tool(&self) -> Result<()> {
        let tag = &self.k3d.version_tag;
        if self.cli.is_tool_installed(tag).await {
            debug!(tag = %tag, "k3d already installed");
            return Ok(());
        }

        info!(tag = %tag, "installing k3d");
        self.cli.install_tool(tag).await
    }

    /// One fetch-connect-probe round. `Ok(None)` means reachable credentials
    /// but a failed probe.
    async fn attempt(&self) -> Result<Option<ClusterHandle>> {
        let credentials = self.cli.fetch_credentials(&self.cluster_name).await?;
        let handle = self.connector.connect(&credentials).await?;
        if self.connector.probe(&handle).await {
            Ok(Some(handle))
        } else {
            Ok(None)
        }
    }

    async fn reach(&self, budget: Duration) -> std::result::Result<ClusterHandle, String> {
        poll_until(budget, self.timeouts.poll_interval(), move || self.attempt())
            .await
            .map_err(|timeout| timeout.to_string())
    }

    async fn recreate(&self) -> Result<()> {
        let registries = self
            .cli
            .prepare_registries(self.k3d.registries_file.as_deref())?;

        if let Err(e) = self.cli.delete_cluster(&self.cluster_name).await {
            debug!(error = %e, "ignoring delete failure before recreate");
        }

        self.cli
            .create_cluster(&self.cluster_name, self.k3d.port_range(), &registries)
            .await
    }

    async fn run(&self) -> Result<ClusterHandle> {
        self.set_state(ConnectState::Uninitialized);
        self.ensure_tool().await?;

        self.set_state(ConnectState::ProbingExisting);
        match self.reach(self.timeouts.probe_existing()).await {
            Ok(handle) => {
                info!(cluster = %self.cluster_name, "reusing existing cluster");
                return Ok(handle);
            }
            Err(reason) => {
                info!(cluster = %self.cluster_name, reason = %reason, "no usable cluster, recreating");
            }
        }

        self.set_state(ConnectState::Recreating);
        self.recreate().await?;

        self.reach(self.timeouts.cluster_ready())
            .await
            .map_err(|reason| {
                ClusterError::ConnectFailed(format!(
                    "cluster '{}' not reachable after creation: {}",
                    self.cluster_name, reason
                ))
            })
    }
}

#[async_trait::async_trait]
impl ConnectionStrategy for LocalK3dStrategy {
    fn kind(&self) -> &'static str {
        "local-k3d"
    }

    fn state(&self) -> ConnectState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn connect(&self) -> Result<ClusterHandle> {
        match self.run().await {
            Ok(handle) => {
                self.set_state(ConnectState::Connected);
                info!(url = %handle.cluster_url(), "connected to local cluster");
                Ok(handle)
            }
            Err(e) => {
                warn!(cluster = %self.cluster_name, error = %e, "unable to connect to local cluster");
                self.set_state(ConnectState::ConnectFailed);
                Err(e)
            }
        }
    }
}
