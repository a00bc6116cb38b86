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

use crate::domain::cluster::orchestrator::TestCluster;
use crate::infrastructure::kubernetes::ClusterHandle;
use crate::shared::error::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Explicit wiring between a test harness and its clusters.
///
/// A harness registers one cluster per suite when the suite's first test
/// instance is ready, and calls `on_all_tests_done` once the suite finishes.
#[derive(Default)]
pub struct SuiteHooks {
    clusters: Mutex<HashMap<String, Arc<TestCluster>>>,
}

impl SuiteHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set up `cluster` and remember it for `suite`. A suite that already has
    /// a cluster gets that cluster's handle back.
    ///
    /// The registry is not locked while a setup runs, so suites set up
    /// concurrently.
    pub async fn on_test_instance_ready(
        &self,
        suite: &str,
        cluster: Arc<TestCluster>,
    ) -> Result<ClusterHandle> {
        let existing = self.clusters.lock().await.get(suite).cloned();
        if let Some(existing) = existing {
            debug!(suite = %suite, "suite already has a cluster");
            return existing.setup().await;
        }

        let handle = cluster.setup().await?;
        let registered = self
            .clusters
            .lock()
            .await
            .entry(suite.to_string())
            .or_insert_with(|| cluster.clone())
            .clone();
        if !Arc::ptr_eq(&registered, &cluster) {
            debug!(suite = %suite, "another instance registered first");
            return registered.setup().await;
        }
        Ok(handle)
    }

    /// Tear down the suite's cluster. Unknown suites are ignored.
    pub async fn on_all_tests_done(&self, suite: &str) {
        let cluster = self.clusters.lock().await.remove(suite);
        match cluster {
            Some(cluster) => {
                info!(suite = %suite, "tearing down suite cluster");
                cluster.tear_down().await;
            }
            None => debug!(suite = %suite, "no cluster registered for suite"),
        }
    }

    pub async fn cluster(&self, suite: &str) -> Option<Arc<TestCluster>> {
        self.clusters.lock().await.get(suite).cloned()
    }
}
