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

//! Cluster client factory.
//!
//! Turns a credentials file into a connected [`ClusterHandle`] and probes it.
//! Probing never fails: any client error means "not reachable".

use crate::infrastructure::constants::PROBE_NAMESPACE;
use crate::infrastructure::kubernetes::client::{TestKubeClient, TestKubeClientImpl};
use crate::infrastructure::kubernetes::credentials::CredentialsArtifact;
use crate::shared::error::Result;
use kube::Client;
use std::sync::Arc;
use tracing::debug;

/// A live connection to one cluster. Cheap to clone; clones share the client.
#[derive(Clone)]
pub struct ClusterHandle {
    api: Arc<dyn TestKubeClient>,
    credentials: CredentialsArtifact,
}

impl ClusterHandle {
    pub fn new(api: Arc<dyn TestKubeClient>, credentials: CredentialsArtifact) -> Self {
        Self { api, credentials }
    }

    pub fn client(&self) -> Client {
        self.api.client()
    }

    pub fn api(&self) -> Arc<dyn TestKubeClient> {
        self.api.clone()
    }

    pub fn credentials(&self) -> &CredentialsArtifact {
        &self.credentials
    }

    pub fn cluster_url(&self) -> String {
        self.api.cluster_url()
    }
}

impl std::fmt::Debug for ClusterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterHandle")
            .field("cluster_url", &self.api.cluster_url())
            .field("credentials", &self.credentials)
            .finish()
    }
}

#[async_trait::async_trait]
pub trait ClusterConnector: Send + Sync {
    async fn connect(&self, credentials: &CredentialsArtifact) -> Result<ClusterHandle>;

    /// True if a lightweight read against the cluster succeeds.
    async fn probe(&self, handle: &ClusterHandle) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct KubeConnector;

#[async_trait::async_trait]
impl ClusterConnector for KubeConnector {
    async fn connect(&self, credentials: &CredentialsArtifact) -> Result<ClusterHandle> {
        let client = TestKubeClientImpl::new_with_config(credentials.path()).await?;
        debug!(url = %client.cluster_url(), "kubernetes client created");
        Ok(ClusterHandle::new(Arc::new(client), credentials.clone()))
    }

    async fn probe(&self, handle: &ClusterHandle) -> bool {
        probe_namespace(handle.api().as_ref()).await
    }
}

pub(crate) async fn probe_namespace(api: &dyn TestKubeClient) -> bool {
    match api.get_namespace(PROBE_NAMESPACE).await {
        Ok(Some(_)) => true,
        Ok(None) => {
            debug!(namespace = PROBE_NAMESPACE, "probe namespace missing");
            false
        }
        Err(e) => {
            debug!(error = %e, "cluster probe failed");
            false
        }
    }
}
