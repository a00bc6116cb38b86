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

use crate::infrastructure::constants::{
    LABEL_APP, PROTOCOL_TCP, SERVICE_PORT_NAME, SERVICE_SUFFIX,
};
use crate::infrastructure::kubernetes::resources::pod::app_labels;
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

/// How the service is exposed: cluster-internal, or on a fixed node port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceType {
    ClusterIP,
    NodePort(i32),
}

impl ServiceType {
    pub fn from_node_port(node_port: Option<i32>) -> Self {
        match node_port {
            Some(port) => ServiceType::NodePort(port),
            None => ServiceType::ClusterIP,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::ClusterIP => "ClusterIP",
            ServiceType::NodePort(_) => "NodePort",
        }
    }
}

pub struct ServiceBuilder {
    app: String,
    namespace: String,
    port: i32,
    target_port: i32,
    service_type: ServiceType,
}

impl ServiceBuilder {
    pub fn new(
        app: impl Into<String>,
        namespace: impl Into<String>,
        port: i32,
        target_port: i32,
        service_type: ServiceType,
    ) -> Self {
        Self {
            app: app.into(),
            namespace: namespace.into(),
            port,
            target_port,
            service_type,
        }
    }

    pub fn service_name(app: &str) -> String {
        format!("{}{}", app, SERVICE_SUFFIX)
    }

    pub fn build(&self) -> Service {
        let node_port = match self.service_type {
            ServiceType::NodePort(port) => Some(port),
            ServiceType::ClusterIP => None,
        };

        let port = ServicePort {
            name: Some(SERVICE_PORT_NAME.to_string()),
            port: self.port,
            target_port: Some(IntOrString::Int(self.target_port)),
            node_port,
            protocol: Some(PROTOCOL_TCP.to_string()),
            ..Default::default()
        };

        Service {
            metadata: ObjectMeta {
                name: Some(Self::service_name(&self.app)),
                namespace: Some(self.namespace.clone()),
                labels: Some(self.get_labels()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                type_: Some(self.service_type.as_str().to_string()),
                ports: Some(vec![port]),
                selector: Some(app_labels(&self.app)),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub fn get_labels(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert(LABEL_APP.to_string(), self.app.clone());
        labels
    }
}
