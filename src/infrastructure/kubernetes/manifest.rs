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

//! Loading of templated resource manifests from a directory.

use crate::infrastructure::constants::{
    PLACEHOLDER_IMAGE, PLACEHOLDER_NAME, PLACEHOLDER_NAMESPACE, PLACEHOLDER_NODE_PORT,
};
use crate::shared::error::{ClusterError, Result};
use kube::api::DynamicObject;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

const MANIFEST_PATTERN: &str = r"\.ya?ml$";

/// Values substituted into `<name>`, `<namespace>`, `<image>` and `<nodeport>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholders {
    pub name: String,
    pub image: String,
    pub node_port: i32,
}

impl Placeholders {
    pub fn new(name: impl Into<String>, image: impl Into<String>, node_port: i32) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            node_port,
        }
    }

    pub fn substitute(&self, template: &str, namespace: &str) -> String {
        template
            .replace(PLACEHOLDER_NAME, &self.name)
            .replace(PLACEHOLDER_NAMESPACE, namespace)
            .replace(PLACEHOLDER_IMAGE, &self.image)
            .replace(PLACEHOLDER_NODE_PORT, &self.node_port.to_string())
    }
}

/// All `*.yaml`/`*.yml` files under `dir`, recursively, sorted by path.
/// Symbolic links are not followed.
pub fn discover_manifests(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(ClusterError::config_error(format!(
            "Manifest directory {} does not exist",
            dir.display()
        )));
    }

    let pattern = Regex::new(MANIFEST_PATTERN)
        .map_err(|e| ClusterError::config_error(format!("Invalid manifest pattern: {}", e)))?;

    let mut found = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            ClusterError::config_error(format!("Cannot read manifests under {}: {}", dir.display(), e))
        })?;
        if entry.file_type().is_file()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| pattern.is_match(name))
        {
            found.push(entry.into_path());
        }
    }

    found.sort();
    Ok(found)
}

/// Parse every document of a (possibly multi-document) YAML string.
///
/// Empty documents are skipped and `kind: List` documents are flattened into
/// their items.
pub fn parse_documents(yaml: &str) -> Result<Vec<DynamicObject>> {
    let mut objects = Vec::new();

    for document in serde_yaml::Deserializer::from_str(yaml) {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }

        if value.get("kind").and_then(|k| k.as_str()) == Some("List") {
            let items = value
                .get("items")
                .and_then(|items| items.as_sequence())
                .cloned()
                .unwrap_or_default();
            for item in items {
                objects.push(to_object(item)?);
            }
        } else {
            objects.push(to_object(value)?);
        }
    }

    Ok(objects)
}

fn to_object(value: serde_yaml::Value) -> Result<DynamicObject> {
    let object: DynamicObject = serde_yaml::from_value(value)?;
    if object.types.is_none() {
        return Err(ClusterError::InvalidResource(format!(
            "manifest object {:?} has no apiVersion/kind",
            object.metadata.name
        )));
    }
    Ok(object)
}

/// Discover, substitute and parse every manifest under `dir`, in path order.
pub fn load_manifests(
    dir: &Path,
    placeholders: &Placeholders,
    namespace: &str,
) -> Result<Vec<DynamicObject>> {
    let mut objects = Vec::new();

    for path in discover_manifests(dir)? {
        debug!(path = %path.display(), "loading manifest");
        let template = std::fs::read_to_string(&path)?;
        let rendered = placeholders.substitute(&template, namespace);
        objects.extend(parse_documents(&rendered).map_err(|e| {
            ClusterError::InvalidResource(format!("{}: {}", path.display(), e))
        })?);
    }

    Ok(objects)
}
