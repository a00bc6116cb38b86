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

pub struct StatusIcon;

impl StatusIcon {
    pub const READY: &'static str = "✓";

    pub const PROGRESSING: &'static str = "⏳";

    pub const FAILED: &'static str = "✗";

    pub const UNKNOWN: &'static str = "?";

    pub fn readiness_icon(ready: u32, total: u32) -> &'static str {
        if total == 0 {
            Self::UNKNOWN
        } else if ready >= total {
            Self::READY
        } else if ready > 0 {
            Self::PROGRESSING
        } else {
            Self::FAILED
        }
    }

    pub fn readiness_text(ready: u32, total: u32) -> &'static str {
        if total == 0 {
            "Unknown"
        } else if ready >= total {
            "Ready"
        } else if ready > 0 {
            "Progressing"
        } else {
            "NotReady"
        }
    }
}
