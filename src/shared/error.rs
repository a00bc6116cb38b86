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

use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClusterError>;

/// The step of `TestCluster::setup` that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStep {
    ResourcesDir,
    Connect,
    Namespace,
    Bootstrap,
}

impl fmt::Display for SetupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            SetupStep::ResourcesDir => "preparing the resources directory",
            SetupStep::Connect => "connecting to the cluster",
            SetupStep::Namespace => "initializing the test namespace",
            SetupStep::Bootstrap => "creating the bootstrap config map",
        };
        f.write_str(step)
    }
}

#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Kubernetes API error: {0}")]
    Kube(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unable to install k3d: {0}")]
    ToolInstall(String),

    #[error("Unable to create k3d cluster '{cluster}': {reason}")]
    ClusterCreate { cluster: String, reason: String },

    #[error("Unable to delete k3d cluster '{cluster}': {reason}")]
    ClusterDelete { cluster: String, reason: String },

    #[error("No credentials available for cluster '{cluster}': {reason}")]
    CredentialsUnavailable { cluster: String, reason: String },

    #[error("Unable to connect to cluster: {0}")]
    ConnectFailed(String),

    #[error(
        "Test namespace '{namespace}' already exists in the cluster. \
         Delete it or set fail_on_existing_namespace = false"
    )]
    NamespaceConflict { namespace: String },

    #[error("{kind} '{name}' in namespace '{namespace}' was not ready within {timeout:?}")]
    ReadinessTimeout {
        kind: String,
        name: String,
        namespace: String,
        timeout: Duration,
    },

    #[error("Cluster not set up. Call setup() before using the client")]
    NotSetUp,

    #[error("A previous setup() failed; discard this TestCluster and create a new one")]
    SetupPoisoned,

    #[error("Setup failed while {step}: {source}")]
    Setup {
        step: SetupStep,
        #[source]
        source: Box<ClusterError>,
    },

    #[error("Command '{command}' did not finish within {timeout:?}")]
    ProcessTimeout { command: String, timeout: Duration },

    #[error("Failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Background wait ended abnormally: {0}")]
    WaitAborted(String),

    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl From<kube::Error> for ClusterError {
    fn from(err: kube::Error) -> Self {
        ClusterError::Kube(err.to_string())
    }
}

impl ClusterError {
    pub fn config_error(context: impl Into<String>) -> Self {
        Self::ConfigError(context.into())
    }

    pub fn setup(step: SetupStep, source: ClusterError) -> Self {
        Self::Setup {
            step,
            source: Box::new(source),
        }
    }

    pub fn readiness_timeout(
        kind: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self::ReadinessTimeout {
            kind: kind.into(),
            name: name.into(),
            namespace: namespace.into(),
            timeout,
        }
    }

    /// The innermost error, skipping any `Setup` wrappers.
    pub fn root_cause(&self) -> &ClusterError {
        match self {
            ClusterError::Setup { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
