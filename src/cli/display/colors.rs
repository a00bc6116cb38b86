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

use comfy_table::Color as TableColor;

#[derive(Debug, Clone)]
pub struct ColorTheme {
    pub ready: TableColor,
    pub progressing: TableColor,
    pub failed: TableColor,
    pub accent: TableColor,
    pub muted: TableColor,
}

impl Default for ColorTheme {
    fn default() -> Self {
        Self {
            ready: TableColor::Green,
            progressing: TableColor::Yellow,
            failed: TableColor::Red,
            accent: TableColor::Cyan,
            muted: TableColor::DarkGrey,
        }
    }
}

impl ColorTheme {
    /// Color for a workload with `ready` of `total` replicas up
    pub fn readiness_color(&self, ready: u32, total: u32) -> TableColor {
        if total == 0 {
            self.muted
        } else if ready >= total {
            self.ready
        } else if ready > 0 {
            self.progressing
        } else {
            self.failed
        }
    }
}
