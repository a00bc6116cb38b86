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

use crate::domain::cluster::strategy::{ConnectState, ConnectionStrategy};
use crate::infrastructure::constants::EXTERNAL_KUBECONFIG_NAME;
use crate::infrastructure::kubernetes::{ClusterConnector, ClusterHandle, CredentialsArtifact};
use crate::infrastructure::ResourcesDir;
use crate::shared::error::{ClusterError, Result};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

/// Connects to an existing cluster through a caller-supplied kubeconfig.
///
/// The file is copied into the resources directory first. No probing and no
/// recreation: any failure is final.
pub struct ExternalStrategy {
    kubeconfig: PathBuf,
    resources: ResourcesDir,
    connector: Arc<dyn ClusterConnector>,
    state: Mutex<ConnectState>,
}

impl ExternalStrategy {
    pub fn new(
        kubeconfig: impl Into<PathBuf>,
        resources: ResourcesDir,
        connector: Arc<dyn ClusterConnector>,
    ) -> Self {
        Self {
            kubeconfig: kubeconfig.into(),
            resources,
            connector,
            state: Mutex::new(ConnectState::Uninitialized),
        }
    }

    fn set_state(&self, state: ConnectState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    async fn try_connect(&self) -> Result<ClusterHandle> {
        let path = self
            .resources
            .copy_in(&self.kubeconfig, EXTERNAL_KUBECONFIG_NAME, false)
            .map_err(|e| ClusterError::ConnectFailed(e.to_string()))?;

        self.connector
            .connect(&CredentialsArtifact::new(path))
            .await
            .map_err(|e| match e {
                ClusterError::ConnectFailed(_) => e,
                other => ClusterError::ConnectFailed(other.to_string()),
            })
    }
}

#[async_trait::async_trait]
impl ConnectionStrategy for ExternalStrategy {
    fn kind(&self) -> &'static str {
        "external"
    }

    fn state(&self) -> ConnectState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn connect(&self) -> Result<ClusterHandle> {
        info!(kubeconfig = %self.kubeconfig.display(), "connecting to external cluster");
        match self.try_connect().await {
            Ok(handle) => {
                self.set_state(ConnectState::Connected);
                Ok(handle)
            }
            Err(e) => {
                self.set_state(ConnectState::ConnectFailed);
                Err(e)
            }
        }
    }
}
