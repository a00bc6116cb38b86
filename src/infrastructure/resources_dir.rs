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
    K3D_BINARY_NAME, K3D_DIR_NAME, K3D_INSTALL_SCRIPT_NAME, KUBECONFIG_SUFFIX,
    REGISTRIES_FILE_NAME,
};
use crate::shared::error::{ClusterError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The private per-user directory holding the k3d binary, its installer, the
/// registries config and the current credentials file.
///
/// Files written here always replace what was there before.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcesDir {
    root: PathBuf,
}

impl ResourcesDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory tree if absent.
    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(self.k3d_dir()).map_err(|e| {
            ClusterError::config_error(format!(
                "Cannot create resources directory {}: {}",
                self.root.display(),
                e
            ))
        })
    }

    pub fn k3d_dir(&self) -> PathBuf {
        self.root.join(K3D_DIR_NAME)
    }

    pub fn k3d_exec(&self) -> PathBuf {
        self.k3d_dir().join(K3D_BINARY_NAME)
    }

    pub fn install_script(&self) -> PathBuf {
        self.k3d_dir().join(K3D_INSTALL_SCRIPT_NAME)
    }

    pub fn registries_file(&self) -> PathBuf {
        self.root.join(REGISTRIES_FILE_NAME)
    }

    pub fn kubeconfig_for(&self, cluster: &str) -> PathBuf {
        self.root.join(format!("{}{}", cluster, KUBECONFIG_SUFFIX))
    }

    /// Write `contents` to `relative`, replacing any previous file.
    pub fn write_file(&self, relative: impl AsRef<Path>, contents: &str, executable: bool) -> Result<PathBuf> {
        let dest = self.root.join(relative);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&dest, contents)?;
        set_executable(&dest, executable)?;
        Ok(dest)
    }

    /// Copy `source` to `relative`, replacing any previous file. A source that
    /// already is the destination is left as it is.
    pub fn copy_in(&self, source: &Path, relative: impl AsRef<Path>, executable: bool) -> Result<PathBuf> {
        let dest = self.root.join(relative);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if is_same_file(source, &dest) {
            debug!(path = %dest.display(), "source already in resources directory");
            return Ok(dest);
        }
        info!(from = %source.display(), to = %dest.display(), "copying into resources directory");
        std::fs::copy(source, &dest).map_err(|e| {
            ClusterError::config_error(format!(
                "Cannot copy {} to {}: {}",
                source.display(),
                dest.display(),
                e
            ))
        })?;
        set_executable(&dest, executable)?;
        Ok(dest)
    }
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(unix)]
fn set_executable(path: &Path, executable: bool) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = if executable { 0o755 } else { 0o644 };
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path, _executable: bool) -> Result<()> {
    Ok(())
}
