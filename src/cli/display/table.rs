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

use super::{ColorTheme, StatusIcon};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, CellAlignment, ContentArrangement, Table};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;

/// One line of the workload table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadRow {
    pub kind: String,
    pub name: String,
    pub ready: u32,
    pub total: u32,
    pub images: Vec<String>,
}

impl WorkloadRow {
    pub fn from_deployment(deployment: &Deployment) -> Self {
        let total = deployment
            .spec
            .as_ref()
            .and_then(|spec| spec.replicas)
            .unwrap_or(1);
        let ready = deployment
            .status
            .as_ref()
            .and_then(|status| status.ready_replicas)
            .unwrap_or(0);
        let images = deployment
            .spec
            .as_ref()
            .and_then(|spec| spec.template.spec.as_ref())
            .map(|spec| spec.containers.iter().filter_map(|c| c.image.clone()).collect())
            .unwrap_or_default();

        Self {
            kind: "Deployment".to_string(),
            name: deployment.metadata.name.clone().unwrap_or_default(),
            ready: ready.max(0) as u32,
            total: total.max(0) as u32,
            images,
        }
    }

    pub fn from_pod(pod: &Pod) -> Self {
        let statuses = pod
            .status
            .as_ref()
            .and_then(|status| status.container_statuses.clone())
            .unwrap_or_default();
        let images = pod
            .spec
            .as_ref()
            .map(|spec| spec.containers.iter().filter_map(|c| c.image.clone()).collect())
            .unwrap_or_default();
        let total = pod.spec.as_ref().map(|spec| spec.containers.len()).unwrap_or(0);

        Self {
            kind: "Pod".to_string(),
            name: pod.metadata.name.clone().unwrap_or_default(),
            ready: statuses.iter().filter(|s| s.ready).count() as u32,
            total: total as u32,
            images,
        }
    }
}

pub struct TableRenderer {
    theme: ColorTheme,
}

impl Default for TableRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TableRenderer {
    pub fn new() -> Self {
        Self {
            theme: ColorTheme::default(),
        }
    }

    /// Render the workloads of a test namespace
    pub fn render_workloads(&self, namespace: &str, rows: &[WorkloadRow]) -> String {
        if rows.is_empty() {
            return format!("No workloads found in namespace {}", namespace);
        }

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("KIND").set_alignment(CellAlignment::Left),
                Cell::new("NAME").set_alignment(CellAlignment::Left),
                Cell::new("READY").set_alignment(CellAlignment::Center),
                Cell::new("STATUS").set_alignment(CellAlignment::Center),
                Cell::new("IMAGES").set_alignment(CellAlignment::Left),
            ]);

        for row in rows {
            let color = self.theme.readiness_color(row.ready, row.total);
            table.add_row(vec![
                Cell::new(&row.kind),
                Cell::new(&row.name),
                Cell::new(format!(
                    "{} {}/{}",
                    StatusIcon::readiness_icon(row.ready, row.total),
                    row.ready,
                    row.total
                ))
                .fg(color),
                Cell::new(StatusIcon::readiness_text(row.ready, row.total)).fg(color),
                Cell::new(row.images.join(", ")).fg(self.theme.muted),
            ]);
        }

        let mut output = String::new();
        output.push_str(&format!(
            "╭─ Namespace {} {} ─╮\n",
            namespace,
            format!("[{} workloads]", rows.len()).bright_black()
        ));
        output.push_str(&table.to_string());
        output.push('\n');
        output.push_str(&format!(
            "Legend: {} Ready  {} Progressing  {} Not ready\n",
            StatusIcon::READY.green(),
            StatusIcon::PROGRESSING.yellow(),
            StatusIcon::FAILED.red()
        ));
        output
    }

    /// Summary printed after a successful `up`
    pub fn render_setup_summary(
        &self,
        cluster_url: &str,
        strategy: &str,
        namespace: &str,
        deployments: &[String],
        images: &[String],
    ) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);

        table.add_row(vec![Cell::new("Test cluster ready")
            .fg(self.theme.ready)
            .set_alignment(CellAlignment::Center)]);
        table.add_row(vec![Cell::new(format!("API server: {}", cluster_url))]);
        table.add_row(vec![Cell::new(format!("Strategy: {}", strategy))]);
        table.add_row(vec![
            Cell::new(format!("Namespace: {}", namespace)).fg(self.theme.accent)
        ]);
        table.add_row(vec![Cell::new(format!(
            "Deployments (all namespaces): {}",
            list_or_none(deployments)
        ))]);
        table.add_row(vec![Cell::new(format!("Images: {}", list_or_none(images)))]);

        table.to_string()
    }
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}
