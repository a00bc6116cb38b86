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

//! Pod and container builders for test workloads.
//!
//! Every container gets the profile env var. With an explicit profile the value
//! is set literally; otherwise it is read from the bootstrap config map, marked
//! optional so a missing map never blocks the pod from starting.

use crate::domain::config::BootstrapConf;
use crate::infrastructure::constants::LABEL_APP;
use k8s_openapi::api::core::v1::{
    ConfigMapKeySelector, Container, EnvVar, EnvVarSource, Pod, PodSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

pub struct PodBuilder {
    name: String,
    namespace: String,
    image: String,
    bootstrap: BootstrapConf,
    profile: Option<String>,
}

impl PodBuilder {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        image: impl Into<String>,
        bootstrap: BootstrapConf,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            image: image.into(),
            bootstrap,
            profile: None,
        }
    }

    pub fn with_profile(mut self, profile: Option<String>) -> Self {
        self.profile = profile;
        self
    }

    pub fn build(&self) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(app_labels(&self.name)),
                ..Default::default()
            },
            spec: Some(self.build_spec()),
            ..Default::default()
        }
    }

    pub fn build_spec(&self) -> PodSpec {
        PodSpec {
            containers: vec![self.build_container()],
            ..Default::default()
        }
    }

    fn build_container(&self) -> Container {
        Container {
            name: self.name.clone(),
            image: Some(self.image.clone()),
            env: Some(vec![profile_env(&self.bootstrap, self.profile.as_deref())]),
            ..Default::default()
        }
    }
}

pub fn app_labels(app: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(LABEL_APP.to_string(), app.to_string());
    labels
}

pub fn profile_env(bootstrap: &BootstrapConf, profile: Option<&str>) -> EnvVar {
    match profile {
        Some(profile) => EnvVar {
            name: bootstrap.profile_env.clone(),
            value: Some(profile.to_string()),
            ..Default::default()
        },
        None => EnvVar {
            name: bootstrap.profile_env.clone(),
            value_from: Some(EnvVarSource {
                config_map_key_ref: Some(ConfigMapKeySelector {
                    name: bootstrap.config_map.clone(),
                    key: bootstrap.profile_key.clone(),
                    optional: Some(true),
                }),
                ..Default::default()
            }),
            ..Default::default()
        },
    }
}
