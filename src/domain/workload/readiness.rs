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

//! When the cluster considers a resource ready.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Pod};
use kube::api::DynamicObject;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespacePhase {
    Absent,
    Creating,
    Active,
    Terminating,
}

pub fn namespace_phase(namespace: Option<&Namespace>) -> NamespacePhase {
    let Some(namespace) = namespace else {
        return NamespacePhase::Absent;
    };

    match namespace
        .status
        .as_ref()
        .and_then(|status| status.phase.as_deref())
    {
        Some("Active") => NamespacePhase::Active,
        Some("Terminating") => NamespacePhase::Terminating,
        _ if namespace.metadata.deletion_timestamp.is_some() => NamespacePhase::Terminating,
        _ => NamespacePhase::Creating,
    }
}

/// A pod is ready when its `Ready` condition is `True`.
pub fn is_pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}

pub fn is_deployment_ready(deployment: &Deployment) -> bool {
    let wanted = deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or(1);
    let ready = deployment
        .status
        .as_ref()
        .and_then(|status| status.ready_replicas)
        .unwrap_or(0);
    ready >= wanted
}

/// Readiness of an arbitrary manifest object, judged from its kind and status.
/// Kinds without a readiness notion are ready as soon as they exist.
pub fn is_object_ready(object: &DynamicObject) -> bool {
    let kind = object
        .types
        .as_ref()
        .map(|types| types.kind.as_str())
        .unwrap_or_default();
    let data = &object.data;

    match kind {
        "Pod" => data["status"]["conditions"]
            .as_array()
            .is_some_and(|conditions| {
                conditions
                    .iter()
                    .any(|c| c["type"] == "Ready" && c["status"] == "True")
            }),
        "Deployment" | "StatefulSet" | "ReplicaSet" => {
            let wanted = int(&data["spec"]["replicas"]).unwrap_or(1);
            int(&data["status"]["readyReplicas"]).unwrap_or(0) >= wanted
        }
        "DaemonSet" => match int(&data["status"]["desiredNumberScheduled"]) {
            Some(desired) => int(&data["status"]["numberReady"]).unwrap_or(0) >= desired,
            None => false,
        },
        "Job" => int(&data["status"]["succeeded"]).unwrap_or(0) >= 1,
        "Namespace" => data["status"]["phase"] == "Active",
        _ => true,
    }
}

fn int(value: &Value) -> Option<i64> {
    value.as_i64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::{DeploymentSpec, DeploymentStatus};
    use k8s_openapi::api::core::v1::{NamespaceStatus, PodCondition, PodStatus};
    use serde_json::json;

    fn object(value: Value) -> DynamicObject {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_namespace_phases() {
        assert_eq!(namespace_phase(None), NamespacePhase::Absent);

        let mut ns = Namespace::default();
        assert_eq!(namespace_phase(Some(&ns)), NamespacePhase::Creating);

        ns.status = Some(NamespaceStatus {
            phase: Some("Active".to_string()),
            ..Default::default()
        });
        assert_eq!(namespace_phase(Some(&ns)), NamespacePhase::Active);

        ns.status = Some(NamespaceStatus {
            phase: Some("Terminating".to_string()),
            ..Default::default()
        });
        assert_eq!(namespace_phase(Some(&ns)), NamespacePhase::Terminating);
    }

    #[test]
    fn test_pod_ready_condition() {
        let mut pod = Pod::default();
        assert!(!is_pod_ready(&pod));

        pod.status = Some(PodStatus {
            conditions: Some(vec![PodCondition {
                type_: "Ready".to_string(),
                status: "False".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        });
        assert!(!is_pod_ready(&pod));

        pod.status = Some(PodStatus {
            conditions: Some(vec![PodCondition {
                type_: "Ready".to_string(),
                status: "True".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        });
        assert!(is_pod_ready(&pod));
    }

    #[test]
    fn test_deployment_replicas() {
        let mut deployment = Deployment {
            spec: Some(DeploymentSpec {
                replicas: Some(2),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(!is_deployment_ready(&deployment));

        deployment.status = Some(DeploymentStatus {
            ready_replicas: Some(2),
            ..Default::default()
        });
        assert!(is_deployment_ready(&deployment));
    }

    #[test]
    fn test_dynamic_objects() {
        let pending = object(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": { "name": "web" },
            "spec": { "replicas": 1 },
            "status": {}
        }));
        assert!(!is_object_ready(&pending));

        let ready = object(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": { "name": "web" },
            "spec": { "replicas": 1 },
            "status": { "readyReplicas": 1 }
        }));
        assert!(is_object_ready(&ready));

        let daemonset = object(json!({
            "apiVersion": "apps/v1",
            "kind": "DaemonSet",
            "metadata": { "name": "agent" },
            "status": { "desiredNumberScheduled": 2, "numberReady": 1 }
        }));
        assert!(!is_object_ready(&daemonset));

        let job = object(json!({
            "apiVersion": "batch/v1",
            "kind": "Job",
            "metadata": { "name": "migrate" },
            "status": { "succeeded": 1 }
        }));
        assert!(is_object_ready(&job));

        let configmap = object(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": { "name": "settings" }
        }));
        assert!(is_object_ready(&configmap));
    }
}
