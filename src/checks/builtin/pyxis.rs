//! Pyxis SPANK plugin and its enroot runtime.

#![allow(missing_docs)]

use std::path::PathBuf;

use crate::checks::check::{Check, CheckContext};
use crate::checks::outcome::{Category, TestResult};
use crate::core::errors::Result;

const PLUGIN: &str = "spank_pyxis.so";

pub struct PyxisPlugin;

impl PyxisPlugin {
    /// Platform locations first, then distribution defaults.
    fn candidates(ctx: &CheckContext<'_>) -> Vec<PathBuf> {
        let mut paths = ctx.topology.platform.plugin_candidates(PLUGIN);
        for dir in ["/usr/lib64/slurm", "/usr/lib/slurm"] {
            paths.push(PathBuf::from(dir).join(PLUGIN));
        }
        paths
    }
}

impl Check for PyxisPlugin {
    fn id(&self) -> &'static str {
        "pyxis.plugin"
    }

    fn category(&self) -> Category {
        Category::Pyxis
    }

    fn title(&self) -> String {
        "Pyxis Plugin".to_string()
    }

    fn requires_platform(&self) -> bool {
        true
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Result<Vec<TestResult>> {
        let candidates: Vec<String> = Self::candidates(ctx)
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        let timeout = ctx.config.timeouts.version_probe();
        let found = candidates
            .iter()
            .find(|path| ctx.exec(None, &["test", "-f", path.as_str()], timeout).success());

        let Some(plugin) = found else {
            return Ok(vec![
                TestResult::skip(
                    self.category(),
                    self.title(),
                    "Pyxis plugin not found (may not be installed)",
                )
                .with_detail("checked_paths", candidates.clone()),
            ]);
        };

        let mut results = vec![
            TestResult::pass(
                self.category(),
                self.title(),
                format!("Pyxis plugin found at {plugin}"),
            )
            .with_detail("plugin_path", plugin.as_str()),
        ];

        let enroot = ctx.exec_local(&["enroot", "version"]);
        results.push(if enroot.success() {
            let version = enroot.stdout_trimmed().to_string();
            TestResult::pass(
                self.category(),
                "Enroot Installation",
                format!("enroot {version} available"),
            )
            .with_detail("version", version)
        } else if enroot.timed_out {
            TestResult::new(
                self.category(),
                "Enroot Installation",
                self.category().timeout_status(),
                "enroot did not answer in time",
            )
        } else {
            TestResult::warn(
                self.category(),
                "Enroot Installation",
                "Pyxis plugin found but enroot is not usable",
            )
            .with_detail("error", enroot.failure_text())
        });
        Ok(results)
    }
}
