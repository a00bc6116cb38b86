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

//! Create-and-wait operations in the test namespace.
//!
//! Every create submits the resource as create-or-replace before returning,
//! so submission errors surface immediately. The readiness wait then runs on a
//! separate task behind a [`PendingResource`].

use crate::domain::config::BootstrapConf;
use crate::domain::workload::pending::PendingResource;
use crate::domain::workload::readiness::{is_deployment_ready, is_object_ready, is_pod_ready};
use crate::infrastructure::kubernetes::manifest::{load_manifests, Placeholders};
use crate::infrastructure::kubernetes::resources::{
    DeploymentBuilder, PodBuilder, ServiceBuilder, ServiceType,
};
use crate::infrastructure::kubernetes::TestKubeClient;
use crate::shared::error::{ClusterError, Result};
use crate::shared::poll::poll_until;
use futures::future::try_join_all;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::api::DynamicObject;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Clone)]
pub struct Workloads {
    api: Arc<dyn TestKubeClient>,
    namespace: String,
    bootstrap: BootstrapConf,
    readiness: Duration,
    poll_interval: Duration,
}

impl Workloads {
    pub fn new(
        api: Arc<dyn TestKubeClient>,
        namespace: String,
        bootstrap: BootstrapConf,
        readiness: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            api,
            namespace,
            bootstrap,
            readiness,
            poll_interval,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub async fn create_pod(&self, name: &str, image: &str) -> Result<PendingResource<Pod>> {
        self.create_pod_with_profile(name, image, None).await
    }

    /// Like `create_pod`, with the profile env var set to `profile` instead of
    /// being read from the bootstrap config map.
    pub async fn create_pod_with_profile(
        &self,
        name: &str,
        image: &str,
        profile: Option<&str>,
    ) -> Result<PendingResource<Pod>> {
        info!(name = %name, image = %image, "creating pod");
        let pod = PodBuilder::new(name, &self.namespace, image, self.bootstrap.clone())
            .with_profile(profile.map(str::to_string))
            .build();
        self.api.apply_pod(&self.namespace, &pod).await?;

        let api = self.api.clone();
        let namespace = self.namespace.clone();
        let pod_name = name.to_string();
        Ok(self.wait_until_ready("Pod", name, is_pod_ready, move || {
            let api = api.clone();
            let namespace = namespace.clone();
            let pod_name = pod_name.clone();
            async move { api.get_pod(&namespace, &pod_name).await }
        }))
    }

    pub async fn create_deployment(
        &self,
        name: &str,
        image: &str,
    ) -> Result<PendingResource<Deployment>> {
        info!(name = %name, image = %image, "creating deployment");
        let deployment =
            DeploymentBuilder::new(name, &self.namespace, image, self.bootstrap.clone()).build();
        self.api.apply_deployment(&self.namespace, &deployment).await?;

        let api = self.api.clone();
        let namespace = self.namespace.clone();
        let deployment_name = name.to_string();
        Ok(self.wait_until_ready("Deployment", name, is_deployment_ready, move || {
            let api = api.clone();
            let namespace = namespace.clone();
            let deployment_name = deployment_name.clone();
            async move { api.get_deployment(&namespace, &deployment_name).await }
        }))
    }

    /// Expose pods labelled `app=<app>` as `<app>-svc`. A node port makes it a
    /// NodePort service, otherwise it is cluster-internal. Services are not
    /// waited on.
    pub async fn create_service(
        &self,
        app: &str,
        port: i32,
        target_port: i32,
        node_port: Option<i32>,
    ) -> Result<Service> {
        info!(app = %app, port, target_port, node_port = ?node_port, "creating service");
        let service = ServiceBuilder::new(
            app,
            &self.namespace,
            port,
            target_port,
            ServiceType::from_node_port(node_port),
        )
        .build();
        self.api.apply_service(&self.namespace, &service).await
    }

    /// Apply every manifest under `dir` in path order, then wait for the whole
    /// set to become ready.
    pub async fn create_from_manifests(
        &self,
        dir: &Path,
        placeholders: &Placeholders,
    ) -> Result<PendingResource<Vec<DynamicObject>>> {
        info!(dir = %dir.display(), "creating from manifests");
        let objects = load_manifests(dir, placeholders, &self.namespace)?;

        let mut applied = Vec::with_capacity(objects.len());
        for object in &objects {
            applied.push(self.api.apply_manifest(&self.namespace, object).await?);
        }

        let api = self.api.clone();
        let namespace = self.namespace.clone();
        let budget = self.readiness;
        let interval = self.poll_interval;
        let set_name = placeholders.name.clone();
        Ok(PendingResource::spawn(async move {
            let applied = &applied;
            let api = &api;
            let namespace = namespace.as_str();
            poll_until(budget, interval, move || async move {
                let current = try_join_all(
                    applied
                        .iter()
                        .map(|object| api.get_manifest(namespace, object)),
                )
                .await?;

                let ready: Option<Vec<DynamicObject>> = current.into_iter().collect();
                Ok(ready.filter(|objects| objects.iter().all(is_object_ready)))
            })
            .await
            .map_err(|timeout| {
                debug!(set = %set_name, reason = %timeout, "manifest set never became ready");
                ClusterError::readiness_timeout("ResourceSet", set_name.clone(), namespace, budget)
            })
        }))
    }

    pub async fn pods(&self) -> Result<Vec<Pod>> {
        self.api.list_pods(&self.namespace).await
    }

    /// Names of deployments in every namespace.
    pub async fn deployments(&self) -> Result<Vec<String>> {
        Ok(self
            .api
            .list_deployments_all()
            .await?
            .into_iter()
            .filter_map(|d| d.metadata.name)
            .collect())
    }

    /// Container images of the pods in the test namespace.
    pub async fn images(&self) -> Result<Vec<String>> {
        Ok(self
            .pods()
            .await?
            .into_iter()
            .filter_map(|pod| pod.spec)
            .flat_map(|spec| spec.containers)
            .filter_map(|container| container.image)
            .collect())
    }

    fn wait_until_ready<T, G, Fut>(
        &self,
        kind: &'static str,
        name: &str,
        is_ready: fn(&T) -> bool,
        get: G,
    ) -> PendingResource<T>
    where
        T: Send + 'static,
        G: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<T>>> + Send + 'static,
    {
        let budget = self.readiness;
        let interval = self.poll_interval;
        let namespace = self.namespace.clone();
        let name = name.to_string();

        debug!(kind, name = %name, "waiting for readiness");
        PendingResource::spawn(async move {
            poll_until(budget, interval, || {
                let fetch = get();
                async move { Ok(fetch.await?.filter(|resource| is_ready(resource))) }
            })
            .await
            .map_err(|timeout| {
                debug!(kind, name = %name, reason = %timeout, "resource never became ready");
                ClusterError::readiness_timeout(kind, name, namespace, budget)
            })
        })
    }
}
