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

//! In-memory stand-ins for k3d, the client factory and the Kubernetes API.
//!
//! A [`World`] models one machine: whether the k3d cluster exists, whether it
//! answers, and the objects stored in it.

#![allow(dead_code)]

use chrono::Utc;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus};
use k8s_openapi::api::core::v1::{
    ConfigMap, Namespace, NamespaceStatus, Pod, PodCondition, PodStatus, Service,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::DynamicObject;
use kube_testcluster::{
    ClusterCli, ClusterConfig, ClusterConnector, ClusterError, ClusterHandle, CredentialsArtifact,
    PortRange, Result, TestKubeClient, TimeoutConf,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Short bounds so failure paths finish quickly.
pub fn fast_timeouts() -> TimeoutConf {
    TimeoutConf {
        probe_existing_ms: 200,
        cluster_ready_secs: 1,
        poll_interval_ms: 20,
        namespace_delete_secs: 1,
        namespace_create_secs: 1,
        readiness_secs: 1,
        ..TimeoutConf::default()
    }
}

pub fn test_config(resources: &Path) -> ClusterConfig {
    ClusterConfig::builder()
        .cluster_name("it-cluster")
        .namespace("it")
        .resources_dir(resources)
        .timeouts(fast_timeouts())
        .build()
        .unwrap()
}

#[derive(Default)]
pub struct World {
    pub cluster_exists: AtomicBool,
    /// An existing cluster that never answers probes
    pub cluster_broken: AtomicBool,
    /// Newly created clusters never answer probes
    pub create_yields_broken: AtomicBool,
    pub fail_create: AtomicBool,
    pub installed_tag: Mutex<Option<String>>,
    pub install_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub kube: FakeKube,
}

impl World {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A healthy cluster left over from an earlier run, with k3d installed.
    pub fn with_running_cluster(tag: &str) -> Arc<Self> {
        let world = Self::new();
        world.cluster_exists.store(true, Ordering::SeqCst);
        *world.installed_tag.lock().unwrap() = Some(tag.to_string());
        world
    }

    pub fn reachable(&self) -> bool {
        self.cluster_exists.load(Ordering::SeqCst) && !self.cluster_broken.load(Ordering::SeqCst)
    }

    pub fn creates(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }
}

pub struct FakeCli {
    world: Arc<World>,
    resources: PathBuf,
}

impl FakeCli {
    pub fn new(world: Arc<World>, resources: &Path) -> Self {
        Self {
            world,
            resources: resources.to_path_buf(),
        }
    }
}

#[async_trait::async_trait]
impl ClusterCli for FakeCli {
    async fn is_tool_installed(&self, expected_tag: &str) -> bool {
        self.world.installed_tag.lock().unwrap().as_deref() == Some(expected_tag)
    }

    async fn install_tool(&self, version_tag: &str) -> Result<()> {
        self.world.install_calls.fetch_add(1, Ordering::SeqCst);
        *self.world.installed_tag.lock().unwrap() = Some(version_tag.to_string());
        Ok(())
    }

    fn prepare_registries(&self, _custom: Option<&Path>) -> Result<PathBuf> {
        Ok(self.resources.join("k3s-registries.yaml"))
    }

    async fn create_cluster(&self, name: &str, _ports: PortRange, _registries: &Path) -> Result<()> {
        self.world.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.world.fail_create.load(Ordering::SeqCst) {
            return Err(ClusterError::ClusterCreate {
                cluster: name.to_string(),
                reason: "docker is not running".to_string(),
            });
        }

        self.world.cluster_exists.store(true, Ordering::SeqCst);
        let broken = self.world.create_yields_broken.load(Ordering::SeqCst);
        self.world.cluster_broken.store(broken, Ordering::SeqCst);
        self.world.kube.reset();
        Ok(())
    }

    async fn delete_cluster(&self, name: &str) -> Result<()> {
        self.world.delete_calls.fetch_add(1, Ordering::SeqCst);
        if !self.world.cluster_exists.swap(false, Ordering::SeqCst) {
            return Err(ClusterError::ClusterDelete {
                cluster: name.to_string(),
                reason: "No nodes found for given cluster".to_string(),
            });
        }
        Ok(())
    }

    async fn fetch_credentials(&self, name: &str) -> Result<CredentialsArtifact> {
        if !self.world.cluster_exists.load(Ordering::SeqCst) {
            return Err(ClusterError::CredentialsUnavailable {
                cluster: name.to_string(),
                reason: "cluster not found".to_string(),
            });
        }
        Ok(CredentialsArtifact::new(
            self.resources.join(format!("{}-kubeconfig.yaml", name)),
        ))
    }
}

pub struct FakeConnector {
    world: Arc<World>,
}

impl FakeConnector {
    pub fn new(world: Arc<World>) -> Self {
        Self { world }
    }
}

#[async_trait::async_trait]
impl ClusterConnector for FakeConnector {
    async fn connect(&self, credentials: &CredentialsArtifact) -> Result<ClusterHandle> {
        Ok(ClusterHandle::new(
            Arc::new(WorldClient(self.world.clone())),
            credentials.clone(),
        ))
    }

    async fn probe(&self, handle: &ClusterHandle) -> bool {
        matches!(handle.api().get_namespace("default").await, Ok(Some(_)))
    }
}

/// Objects stored in the fake API server.
#[derive(Default)]
pub struct FakeKube {
    pub namespaces: Mutex<BTreeMap<String, Namespace>>,
    pub configmaps: Mutex<BTreeMap<String, ConfigMap>>,
    pub pods: Mutex<BTreeMap<String, Pod>>,
    pub deployments: Mutex<BTreeMap<String, Deployment>>,
    pub services: Mutex<BTreeMap<String, Service>>,
    pub manifests: Mutex<BTreeMap<String, DynamicObject>>,
    /// Workloads never report ready when set
    pub workloads_stuck: AtomicBool,
    /// Namespace deletions are observed but never complete when set
    pub namespaces_stuck_terminating: AtomicBool,
    /// Config map writes are rejected when set
    pub reject_configmaps: AtomicBool,
    pub apply_calls: AtomicUsize,
    uid: AtomicUsize,
}

impl FakeKube {
    pub fn reset(&self) {
        self.namespaces.lock().unwrap().clear();
        self.configmaps.lock().unwrap().clear();
        self.pods.lock().unwrap().clear();
        self.deployments.lock().unwrap().clear();
        self.services.lock().unwrap().clear();
        self.manifests.lock().unwrap().clear();
    }

    pub fn insert_namespace(&self, name: &str) -> Namespace {
        let mut namespace = Namespace::default();
        namespace.metadata.name = Some(name.to_string());
        self.store_namespace(namespace)
    }

    /// Store a submitted namespace as the API server would: keep its
    /// metadata, assign a fresh uid and timestamp, mark it Active.
    pub fn store_namespace(&self, mut namespace: Namespace) -> Namespace {
        let name = namespace.metadata.name.clone().unwrap_or_default();
        namespace.metadata.uid = Some(format!("uid-{}", self.uid.fetch_add(1, Ordering::SeqCst)));
        namespace.metadata.creation_timestamp = Some(Time(Utc::now()));
        namespace.status = Some(NamespaceStatus {
            phase: Some("Active".to_string()),
            ..Default::default()
        });
        self.namespaces
            .lock()
            .unwrap()
            .insert(name, namespace.clone());
        namespace
    }

    pub fn mark_terminating(&self, name: &str) {
        if let Some(namespace) = self.namespaces.lock().unwrap().get_mut(name) {
            namespace.status = Some(NamespaceStatus {
                phase: Some("Terminating".to_string()),
                ..Default::default()
            });
        }
    }

    pub fn namespace(&self, name: &str) -> Option<Namespace> {
        self.namespaces.lock().unwrap().get(name).cloned()
    }

    fn ready(&self) -> bool {
        !self.workloads_stuck.load(Ordering::SeqCst)
    }

    fn key(namespace: &str, name: &str) -> String {
        format!("{}/{}", namespace, name)
    }
}

/// The fake API of one world. Fails like a dead endpoint while unreachable.
pub struct WorldClient(pub Arc<World>);

impl WorldClient {
    fn kube(&self) -> Result<&FakeKube> {
        if self.0.reachable() {
            Ok(&self.0.kube)
        } else {
            Err(ClusterError::Kube("connection refused".to_string()))
        }
    }
}

#[async_trait::async_trait]
impl TestKubeClient for WorldClient {
    fn client(&self) -> kube::Client {
        let config = kube::Config::new("http://127.0.0.1:9".parse().unwrap());
        kube::Client::try_from(config).unwrap()
    }

    fn cluster_url(&self) -> String {
        "https://0.0.0.0:6443".to_string()
    }

    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>> {
        let kube = self.kube()?;
        if name == "default" {
            let mut namespace = Namespace::default();
            namespace.metadata.name = Some("default".to_string());
            return Ok(Some(namespace));
        }
        Ok(kube.namespace(name))
    }

    async fn apply_namespace(&self, namespace: &Namespace) -> Result<Namespace> {
        let kube = self.kube()?;
        kube.apply_calls.fetch_add(1, Ordering::SeqCst);
        Ok(kube.store_namespace(namespace.clone()))
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        let kube = self.kube()?;
        let mut namespaces = kube.namespaces.lock().unwrap();
        if kube.namespaces_stuck_terminating.load(Ordering::SeqCst) {
            if let Some(namespace) = namespaces.get_mut(name) {
                namespace.status = Some(NamespaceStatus {
                    phase: Some("Terminating".to_string()),
                    ..Default::default()
                });
            }
        } else {
            namespaces.remove(name);
        }
        Ok(())
    }

    async fn apply_configmap(&self, namespace: &str, configmap: &ConfigMap) -> Result<ConfigMap> {
        let kube = self.kube()?;
        if kube.reject_configmaps.load(Ordering::SeqCst) {
            return Err(ClusterError::Kube("configmaps is forbidden".to_string()));
        }
        let name = configmap.metadata.name.clone().unwrap_or_default();
        kube.configmaps
            .lock()
            .unwrap()
            .insert(FakeKube::key(namespace, &name), configmap.clone());
        Ok(configmap.clone())
    }

    async fn apply_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod> {
        let kube = self.kube()?;
        kube.apply_calls.fetch_add(1, Ordering::SeqCst);
        let mut pod = pod.clone();
        pod.metadata.namespace = Some(namespace.to_string());
        let name = pod.metadata.name.clone().unwrap_or_default();
        kube.pods
            .lock()
            .unwrap()
            .insert(FakeKube::key(namespace, &name), pod.clone());
        Ok(pod)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>> {
        let kube = self.kube()?;
        let ready = kube.ready();
        Ok(kube
            .pods
            .lock()
            .unwrap()
            .get(&FakeKube::key(namespace, name))
            .cloned()
            .map(|mut pod| {
                if ready {
                    pod.status = Some(PodStatus {
                        conditions: Some(vec![PodCondition {
                            type_: "Ready".to_string(),
                            status: "True".to_string(),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    });
                }
                pod
            }))
    }

    async fn apply_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<Deployment> {
        let kube = self.kube()?;
        kube.apply_calls.fetch_add(1, Ordering::SeqCst);
        let mut deployment = deployment.clone();
        deployment.metadata.namespace = Some(namespace.to_string());
        let name = deployment.metadata.name.clone().unwrap_or_default();
        kube.deployments
            .lock()
            .unwrap()
            .insert(FakeKube::key(namespace, &name), deployment.clone());
        Ok(deployment)
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>> {
        let kube = self.kube()?;
        let ready = kube.ready();
        Ok(kube
            .deployments
            .lock()
            .unwrap()
            .get(&FakeKube::key(namespace, name))
            .cloned()
            .map(|mut deployment| {
                if ready {
                    let replicas = deployment.spec.as_ref().and_then(|s| s.replicas);
                    deployment.status = Some(DeploymentStatus {
                        ready_replicas: replicas,
                        ..Default::default()
                    });
                }
                deployment
            }))
    }

    async fn apply_service(&self, namespace: &str, service: &Service) -> Result<Service> {
        let kube = self.kube()?;
        let mut service = service.clone();
        service.metadata.namespace = Some(namespace.to_string());
        let name = service.metadata.name.clone().unwrap_or_default();
        kube.services
            .lock()
            .unwrap()
            .insert(FakeKube::key(namespace, &name), service.clone());
        Ok(service)
    }

    async fn apply_manifest(&self, namespace: &str, object: &DynamicObject) -> Result<DynamicObject> {
        let kube = self.kube()?;
        let mut object = object.clone();
        object.metadata.namespace = Some(namespace.to_string());
        let kind = object.types.as_ref().map(|t| t.kind.clone()).unwrap_or_default();
        let name = object.metadata.name.clone().unwrap_or_default();
        kube.manifests
            .lock()
            .unwrap()
            .insert(format!("{}/{}", kind, name), object.clone());
        Ok(object)
    }

    async fn get_manifest(&self, _namespace: &str, object: &DynamicObject) -> Result<Option<DynamicObject>> {
        let kube = self.kube()?;
        let ready = kube.ready();
        let kind = object.types.as_ref().map(|t| t.kind.clone()).unwrap_or_default();
        let name = object.metadata.name.clone().unwrap_or_default();
        Ok(kube
            .manifests
            .lock()
            .unwrap()
            .get(&format!("{}/{}", kind, name))
            .cloned()
            .map(|mut stored| {
                if ready && kind == "Deployment" {
                    let replicas = stored.data["spec"]["replicas"].as_i64().unwrap_or(1);
                    stored.data["status"] = serde_json::json!({ "readyReplicas": replicas });
                }
                stored
            }))
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>> {
        let kube = self.kube()?;
        let prefix = format!("{}/", namespace);
        Ok(kube
            .pods
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(_, pod)| pod.clone())
            .collect())
    }

    async fn list_deployments_all(&self) -> Result<Vec<Deployment>> {
        let kube = self.kube()?;
        Ok(kube.deployments.lock().unwrap().values().cloned().collect())
    }
}
