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

use crate::domain::config::BootstrapConf;
use crate::infrastructure::constants::LABEL_APP;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

/// Builds the bootstrap config map carrying environment metadata for workloads.
pub struct ConfigMapBuilder {
    bootstrap: BootstrapConf,
    namespace: String,
}

impl ConfigMapBuilder {
    pub fn new(bootstrap: BootstrapConf, namespace: impl Into<String>) -> Self {
        Self {
            bootstrap,
            namespace: namespace.into(),
        }
    }

    pub fn build(&self) -> ConfigMap {
        let metadata = ObjectMeta {
            name: Some(self.bootstrap.config_map.clone()),
            namespace: Some(self.namespace.clone()),
            labels: Some(self.get_labels()),
            ..Default::default()
        };

        ConfigMap {
            metadata,
            data: Some(self.bootstrap.data.clone()),
            ..Default::default()
        }
    }

    pub fn get_labels(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert(LABEL_APP.to_string(), self.bootstrap.config_map.clone());
        labels
    }
}
