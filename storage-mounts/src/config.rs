// SPDX-License-Identifier: GPL-3.0-only

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Manager settings, read from the `[manager]` table of the daemon config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Mount options appended to every mount request.
    pub default_mount_options: Vec<String>,
    /// Run a non-forced registry refresh as soon as the event loop starts.
    pub refresh_on_start: bool,
}

impl ManagerConfig {
    /// Requested options first, then the defaults, each kept once.
    pub fn merge_mount_options(&self, requested: &[String]) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut out = Vec::with_capacity(requested.len() + self.default_mount_options.len());

        for option in requested.iter().chain(&self.default_mount_options) {
            if seen.insert(option.as_str()) {
                out.push(option.clone());
            }
        }

        out
    }
}
