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

//! The test cluster lifecycle.
//!
//! `setup` moves through Idle, ResourcesDirReady, ClientConnected,
//! NamespaceReady and Ready. Any failure on the way leaves the instance in
//! Failed, after which it must be discarded. `tear_down` deletes the test
//! namespace without waiting, but only a namespace this instance created.

use crate::domain::cluster::external::ExternalStrategy;
use crate::domain::cluster::local::LocalK3dStrategy;
use crate::domain::cluster::strategy::ConnectionStrategy;
use crate::domain::config::ClusterConfig;
use crate::domain::workload::readiness::{namespace_phase, NamespacePhase};
use crate::domain::workload::Workloads;
use crate::infrastructure::k3d::K3dCommands;
use crate::infrastructure::kubernetes::resources::{ConfigMapBuilder, NamespaceBuilder};
use crate::infrastructure::kubernetes::{ClusterConnector, ClusterHandle, KubeConnector, TestKubeClient};
use crate::infrastructure::process::ProcessRunner;
use crate::infrastructure::ResourcesDir;
use crate::shared::error::{ClusterError, Result, SetupStep};
use crate::shared::poll::poll_until;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Idle,
    ResourcesDirReady,
    ClientConnected,
    NamespaceReady,
    Ready,
    TearingDown,
    Failed,
}

struct LifecycleState {
    phase: LifecyclePhase,
    handle: Option<ClusterHandle>,
    /// Set once this instance has created the test namespace
    namespace_owner: Option<ClusterHandle>,
}

pub struct TestCluster {
    config: ClusterConfig,
    resources: ResourcesDir,
    strategy: Box<dyn ConnectionStrategy>,
    setup_guard: tokio::sync::Mutex<()>,
    state: RwLock<LifecycleState>,
}

impl TestCluster {
    /// A local k3d cluster, or an external one when `config.kubeconfig` is set.
    pub fn new(config: ClusterConfig) -> Result<Self> {
        config.validate()?;
        let resources = ResourcesDir::new(config.resources_dir()?);
        let connector: Arc<dyn ClusterConnector> = Arc::new(KubeConnector);

        let strategy: Box<dyn ConnectionStrategy> = match &config.kubeconfig {
            Some(kubeconfig) => Box::new(ExternalStrategy::new(
                kubeconfig.clone(),
                resources.clone(),
                connector,
            )),
            None => {
                let cli = K3dCommands::new(
                    Arc::new(ProcessRunner::new()),
                    resources.clone(),
                    config.k3d.dialect(),
                    config.k3d.agents,
                    config.timeouts.clone(),
                );
                Box::new(LocalK3dStrategy::new(
                    config.cluster_name.clone(),
                    config.k3d.clone(),
                    config.timeouts.clone(),
                    Arc::new(cli),
                    connector,
                ))
            }
        };

        Ok(Self::with_strategy(config, resources, strategy))
    }

    pub fn with_strategy(
        config: ClusterConfig,
        resources: ResourcesDir,
        strategy: Box<dyn ConnectionStrategy>,
    ) -> Self {
        Self {
            config,
            resources,
            strategy,
            setup_guard: tokio::sync::Mutex::new(()),
            state: RwLock::new(LifecycleState {
                phase: LifecyclePhase::Idle,
                handle: None,
                namespace_owner: None,
            }),
        }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    pub fn strategy(&self) -> &dyn ConnectionStrategy {
        self.strategy.as_ref()
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.state.read().unwrap_or_else(PoisonError::into_inner).phase
    }

    fn set_phase(&self, phase: LifecyclePhase) {
        debug!(namespace = %self.config.namespace, phase = ?phase, "lifecycle phase");
        self.state.write().unwrap_or_else(PoisonError::into_inner).phase = phase;
    }

    /// Ensure a reachable cluster and a fresh test namespace.
    ///
    /// Calling it again on a ready instance returns the same handle.
    pub async fn setup(&self) -> Result<ClusterHandle> {
        let _guard = self.setup_guard.lock().await;

        match self.phase() {
            LifecyclePhase::Failed => return Err(ClusterError::SetupPoisoned),
            LifecyclePhase::Ready => return self.handle(),
            _ => {}
        }

        info!(
            strategy = self.strategy.kind(),
            namespace = %self.config.namespace,
            "setting up test cluster"
        );
        match self.run_setup().await {
            Ok(handle) => {
                let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
                state.phase = LifecyclePhase::Ready;
                state.handle = Some(handle.clone());
                Ok(handle)
            }
            Err(e) => {
                warn!(error = %e, "test cluster setup failed");
                let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
                state.phase = LifecyclePhase::Failed;
                state.handle = None;
                Err(e)
            }
        }
    }

    async fn run_setup(&self) -> Result<ClusterHandle> {
        self.resources
            .ensure()
            .map_err(|e| ClusterError::setup(SetupStep::ResourcesDir, e))?;
        self.set_phase(LifecyclePhase::ResourcesDirReady);

        let handle = self
            .strategy
            .connect()
            .await
            .map_err(|e| ClusterError::setup(SetupStep::Connect, e))?;
        self.set_phase(LifecyclePhase::ClientConnected);

        let api = handle.api();
        self.ensure_namespace(&handle)
            .await
            .map_err(|e| ClusterError::setup(SetupStep::Namespace, e))?;
        self.set_phase(LifecyclePhase::NamespaceReady);

        self.create_bootstrap_config(api.as_ref())
            .await
            .map_err(|e| ClusterError::setup(SetupStep::Bootstrap, e))?;

        self.log_cluster_info(&handle).await;
        Ok(handle)
    }

    async fn ensure_namespace(&self, handle: &ClusterHandle) -> Result<()> {
        let name = &self.config.namespace;
        let client = handle.api();
        let api = client.as_ref();

        if let Some(existing) = api.get_namespace(name).await? {
            if self.config.fail_on_existing_namespace {
                return Err(ClusterError::NamespaceConflict {
                    namespace: name.clone(),
                });
            }

            if namespace_phase(Some(&existing)) == NamespacePhase::Terminating {
                info!(namespace = %name, "waiting for terminating namespace to go away");
            } else {
                info!(namespace = %name, "deleting existing test namespace");
                api.delete_namespace(name).await?;
            }
            self.wait_for_namespace(api, NamespacePhase::Absent, self.config.timeouts.namespace_delete())
                .await?;
        }

        info!(namespace = %name, "creating test namespace");
        api.apply_namespace(&NamespaceBuilder::new(name.clone()).build())
            .await?;
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .namespace_owner = Some(handle.clone());

        self.wait_for_namespace(api, NamespacePhase::Active, self.config.timeouts.namespace_create())
            .await
    }

    async fn wait_for_namespace(
        &self,
        api: &dyn TestKubeClient,
        wanted: NamespacePhase,
        budget: std::time::Duration,
    ) -> Result<()> {
        let name = &self.config.namespace;
        poll_until(budget, self.config.timeouts.poll_interval(), move || async move {
            let namespace = api.get_namespace(name).await?;
            Ok((namespace_phase(namespace.as_ref()) == wanted).then_some(()))
        })
        .await
        .map_err(|timeout| {
            debug!(namespace = %name, wanted = ?wanted, reason = %timeout, "namespace wait expired");
            ClusterError::readiness_timeout(format!("Namespace ({:?})", wanted), name, name, budget)
        })
    }

    async fn create_bootstrap_config(&self, api: &dyn TestKubeClient) -> Result<()> {
        let configmap = ConfigMapBuilder::new(self.config.bootstrap.clone(), &self.config.namespace).build();
        let created = api.apply_configmap(&self.config.namespace, &configmap).await?;
        info!(
            name = ?created.metadata.name,
            data = ?created.data,
            "created environment config map"
        );
        Ok(())
    }

    async fn log_cluster_info(&self, handle: &ClusterHandle) {
        let workloads = self.workloads_for(handle);
        info!(url = %handle.cluster_url(), "connected to cluster");
        info!(namespace = %self.config.namespace, "test namespace");
        match workloads.deployments().await {
            Ok(deployments) => info!(deployments = ?deployments, "deployments"),
            Err(e) => warn!(error = %e, "unable to list deployments"),
        }
        match workloads.images().await {
            Ok(images) => info!(images = ?images, "images"),
            Err(e) => warn!(error = %e, "unable to list images"),
        }
    }

    /// Delete the test namespace without waiting. Never fails; calling it
    /// twice is a no-op.
    ///
    /// A namespace this instance did not create (a conflicting one) is left
    /// alone. A failed instance stays Failed.
    pub async fn tear_down(&self) {
        let _guard = self.setup_guard.lock().await;

        let (owner, failed) = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let failed = state.phase == LifecyclePhase::Failed;
            if !failed {
                state.phase = LifecyclePhase::TearingDown;
            }
            state.handle = None;
            (state.namespace_owner.take(), failed)
        };

        if let Some(handle) = owner {
            let name = &self.config.namespace;
            info!(namespace = %name, "deleting test namespace");
            match tokio::time::timeout(self.config.timeouts.delete(), handle.api().delete_namespace(name)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(namespace = %name, error = %e, "failed to delete test namespace"),
                Err(_) => warn!(namespace = %name, "timed out deleting test namespace"),
            }
        }

        if !failed {
            self.set_phase(LifecyclePhase::Idle);
        }
    }

    /// The active handle. Fails with `NotSetUp` unless `setup` completed.
    pub fn handle(&self) -> Result<ClusterHandle> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        match (&state.phase, &state.handle) {
            (LifecyclePhase::Ready, Some(handle)) => Ok(handle.clone()),
            _ => Err(ClusterError::NotSetUp),
        }
    }

    pub fn client(&self) -> Result<kube::Client> {
        self.handle().map(|handle| handle.client())
    }

    /// Resource operations scoped to the test namespace.
    pub fn workloads(&self) -> Result<Workloads> {
        let handle = self.handle()?;
        Ok(self.workloads_for(&handle))
    }

    fn workloads_for(&self, handle: &ClusterHandle) -> Workloads {
        Workloads::new(
            handle.api(),
            self.config.namespace.clone(),
            self.config.bootstrap.clone(),
            self.config.timeouts.readiness(),
            self.config.timeouts.poll_interval(),
        )
    }
}
