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

use crate::infrastructure::constants::FIELD_MANAGER;
use crate::shared::error::{ClusterError, Result};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Pod, Service};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{
    DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams, PropagationPolicy,
};
use kube::core::GroupVersionKind;
use kube::discovery::{self, ApiResource, Scope};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::path::Path;

/// The narrow slice of the Kubernetes API the test cluster needs.
#[async_trait::async_trait]
pub trait TestKubeClient: Send + Sync {
    fn client(&self) -> Client;

    fn cluster_url(&self) -> String;

    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>>;

    async fn apply_namespace(&self, namespace: &Namespace) -> Result<Namespace>;

    /// Delete with a zero grace period. A missing namespace is not an error.
    async fn delete_namespace(&self, name: &str) -> Result<()>;

    async fn apply_configmap(&self, namespace: &str, configmap: &ConfigMap) -> Result<ConfigMap>;

    async fn apply_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod>;

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>>;

    async fn apply_deployment(&self, namespace: &str, deployment: &Deployment)
        -> Result<Deployment>;

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>>;

    async fn apply_service(&self, namespace: &str, service: &Service) -> Result<Service>;

    /// Server-side apply of an arbitrary manifest object into `namespace`.
    async fn apply_manifest(&self, namespace: &str, object: &DynamicObject)
        -> Result<DynamicObject>;

    /// Re-read a previously applied manifest object.
    async fn get_manifest(&self, namespace: &str, object: &DynamicObject)
        -> Result<Option<DynamicObject>>;

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>>;

    async fn list_deployments_all(&self) -> Result<Vec<Deployment>>;
}

pub struct TestKubeClientImpl {
    client: Client,
    cluster_url: String,
}

impl TestKubeClientImpl {
    pub fn new(client: Client, cluster_url: impl Into<String>) -> Self {
        Self {
            client,
            cluster_url: cluster_url.into(),
        }
    }

    /// Build a client from a kubeconfig file, using its current context.
    pub async fn new_with_config(kubeconfig_path: &Path) -> Result<Self> {
        use kube::config::{KubeConfigOptions, Kubeconfig};

        let kubeconfig = Kubeconfig::read_from(kubeconfig_path).map_err(|e| {
            ClusterError::ConnectFailed(format!(
                "Failed to load kubeconfig {}: {}",
                kubeconfig_path.display(),
                e
            ))
        })?;

        let config = kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| {
                ClusterError::ConnectFailed(format!("Failed to create Kubernetes config: {}", e))
            })?;
        let cluster_url = config.cluster_url.to_string();

        let client = Client::try_from(config).map_err(|e| {
            ClusterError::ConnectFailed(format!("Failed to create Kubernetes client: {}", e))
        })?;

        Ok(Self::new(client, cluster_url))
    }

    async fn resolve(&self, object: &DynamicObject) -> Result<(ApiResource, Scope)> {
        let gvk = gvk_of(object)?;
        let (resource, caps) = discovery::pinned_kind(&self.client, &gvk).await?;
        Ok((resource, caps.scope))
    }

    fn dynamic_api(&self, namespace: &str, resource: &ApiResource, scope: Scope) -> Api<DynamicObject> {
        match scope {
            Scope::Namespaced => Api::namespaced_with(self.client.clone(), namespace, resource),
            Scope::Cluster => Api::all_with(self.client.clone(), resource),
        }
    }
}

/// Create-or-replace: server-side apply when the object exists, create otherwise.
async fn apply<K>(api: &Api<K>, object: &K) -> Result<K>
where
    K: Resource + Clone + Debug + Serialize + DeserializeOwned,
    <K as Resource>::DynamicType: Default,
{
    let name = object.meta().name.as_deref().ok_or_else(|| {
        ClusterError::InvalidResource(format!("{} name is required", K::kind(&Default::default())))
    })?;

    match api.get_opt(name).await? {
        Some(_) => {
            let patch = serde_json::to_value(object)?;
            let patch_params = PatchParams::apply(FIELD_MANAGER).force();
            Ok(api.patch(name, &patch_params, &Patch::Apply(patch)).await?)
        }
        None => Ok(api.create(&PostParams::default(), object).await?),
    }
}

fn namespaced<K>(client: &Client, namespace: &str) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    <K as Resource>::DynamicType: Default,
{
    Api::namespaced(client.clone(), namespace)
}

pub(crate) fn gvk_of(object: &DynamicObject) -> Result<GroupVersionKind> {
    let types = object.types.as_ref().ok_or_else(|| {
        ClusterError::InvalidResource(format!(
            "manifest object {:?} has no apiVersion/kind",
            object.metadata.name
        ))
    })?;

    let (group, version) = match types.api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", types.api_version.as_str()),
    };
    Ok(GroupVersionKind::gvk(group, version, &types.kind))
}

#[async_trait::async_trait]
impl TestKubeClient for TestKubeClientImpl {
    fn client(&self) -> Client {
        self.client.clone()
    }

    fn cluster_url(&self) -> String {
        self.cluster_url.clone()
    }

    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }

    async fn apply_namespace(&self, namespace: &Namespace) -> Result<Namespace> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        apply(&api, namespace).await
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let dp = DeleteParams {
            grace_period_seconds: Some(0),
            propagation_policy: Some(PropagationPolicy::Foreground),
            ..DeleteParams::default()
        };

        match api.delete(name, &dp).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn apply_configmap(&self, namespace: &str, configmap: &ConfigMap) -> Result<ConfigMap> {
        apply(&namespaced(&self.client, namespace), configmap).await
    }

    async fn apply_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod> {
        apply(&namespaced(&self.client, namespace), pod).await
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>> {
        let api: Api<Pod> = namespaced(&self.client, namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn apply_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment> {
        apply(&namespaced(&self.client, namespace), deployment).await
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>> {
        let api: Api<Deployment> = namespaced(&self.client, namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn apply_service(&self, namespace: &str, service: &Service) -> Result<Service> {
        let api: Api<Service> = namespaced(&self.client, namespace);
        let name = service
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| ClusterError::InvalidResource("Service name is required".to_string()))?;

        // The allocated cluster IP is immutable, carry it over on replace.
        let mut service = service.clone();
        if let Some(existing) = api.get_opt(name).await? {
            if let (Some(existing_spec), Some(new_spec)) = (&existing.spec, service.spec.as_mut()) {
                new_spec.cluster_ip = existing_spec.cluster_ip.clone();
                new_spec.cluster_ips = existing_spec.cluster_ips.clone();
            }
        }
        apply(&api, &service).await
    }

    async fn apply_manifest(
        &self,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject> {
        let (resource, scope) = self.resolve(object).await?;
        let name = object.metadata.name.as_deref().ok_or_else(|| {
            ClusterError::InvalidResource(format!("{} manifest has no name", resource.kind))
        })?;

        let mut object = object.clone();
        if scope == Scope::Namespaced {
            object.metadata.namespace = Some(namespace.to_string());
        }

        let api = self.dynamic_api(namespace, &resource, scope);
        let patch = serde_json::to_value(&object)?;
        let patch_params = PatchParams::apply(FIELD_MANAGER).force();
        Ok(api.patch(name, &patch_params, &Patch::Apply(patch)).await?)
    }

    async fn get_manifest(
        &self,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<Option<DynamicObject>> {
        let (resource, scope) = self.resolve(object).await?;
        let name = object.metadata.name.as_deref().ok_or_else(|| {
            ClusterError::InvalidResource(format!("{} manifest has no name", resource.kind))
        })?;

        let api = self.dynamic_api(namespace, &resource, scope);
        Ok(api.get_opt(name).await?)
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>> {
        let api: Api<Pod> = namespaced(&self.client, namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn list_deployments_all(&self) -> Result<Vec<Deployment>> {
        let api: Api<Deployment> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }
}
