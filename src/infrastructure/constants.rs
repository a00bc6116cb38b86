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

/// Defaults for the cluster and namespace under test
pub const DEFAULT_CLUSTER_NAME: &str = "k3s-test-cluster";
pub const DEFAULT_NAMESPACE: &str = "k8s-test";

/// Private resources directory, relative to the user's home
pub const RESOURCES_DIR_NAME: &str = ".k8s-test";
pub const K3D_DIR_NAME: &str = "k3d";
pub const K3D_BINARY_NAME: &str = "k3d";
pub const K3D_INSTALL_SCRIPT_NAME: &str = "install.sh";
pub const REGISTRIES_FILE_NAME: &str = "k3s-registries.yaml";
pub const EXTERNAL_KUBECONFIG_NAME: &str = "custom-config";
pub const KUBECONFIG_SUFFIX: &str = "-kubeconfig.yaml";

/// k3d release pinned by default
pub const DEFAULT_K3D_TAG: &str = "v3.0.2";
pub const DEFAULT_AGENTS: u32 = 1;

/// Environment understood by the k3d installer
pub const ENV_K3D_INSTALL_DIR: &str = "K3D_INSTALL_DIR";
pub const ENV_K3D_TAG: &str = "K3D_TAG";
pub const ENV_PATH: &str = "PATH";

/// Where k3s reads its registries config inside each node
pub const K3S_REGISTRIES_PATH: &str = "/etc/rancher/k3s/registries.yaml";

/// Node ports published from the first agent
pub const DEFAULT_FIRST_NODE_PORT: u16 = 31001;
pub const DEFAULT_NODE_PORT_COUNT: u16 = 20;
pub const NODE_PORT_MIN: u16 = 30000;
pub const NODE_PORT_MAX: u16 = 32767;

/// Namespace read by the connectivity probe
pub const PROBE_NAMESPACE: &str = "default";

/// Resource labels
pub const LABEL_APP: &str = "app";
pub const LABEL_TEST_NAMESPACE: &str = "is-test-namespace";

/// Bootstrap config map seeded into the test namespace
pub const BOOTSTRAP_CONFIG_MAP: &str = "cluster-config";
pub const BOOTSTRAP_CLUSTER_NAME_KEY: &str = "cluster-name";
pub const BOOTSTRAP_CLUSTER_NAME: &str = "e2e";
pub const PROFILE_ENV_VAR: &str = "APP_PROFILE";

/// Server-side apply field manager
pub const FIELD_MANAGER: &str = "kube-testcluster";

/// Service naming and defaults
pub const SERVICE_SUFFIX: &str = "-svc";
pub const SERVICE_PORT_NAME: &str = "http";
pub const PROTOCOL_TCP: &str = "TCP";

/// Deployment replicas
pub const DEFAULT_REPLICAS: i32 = 1;

/// Manifest placeholders
pub const PLACEHOLDER_NAME: &str = "<name>";
pub const PLACEHOLDER_NAMESPACE: &str = "<namespace>";
pub const PLACEHOLDER_IMAGE: &str = "<image>";
pub const PLACEHOLDER_NODE_PORT: &str = "<nodeport>";
