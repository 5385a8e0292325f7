//! Full record of one run: identity, topology, outcomes, verdict.
//!
//! The same report backs every rendering: the terminal view, `--json`, and
//! the file written with `-o`.

#![allow(missing_docs)]

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checks::outcome::{Category, Status, TestResult};
use crate::core::errors::{Result, ShcError};
use crate::core::identity;
use crate::report::summary::{OverallStatus, RunSummary, aggregate};
use crate::topology::discovery::Topology;
use crate::topology::model::{PlatformDescriptor, Role, RoleMapping};

/// What kind of run produced the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Normal,
    Maintenance,
    Capture,
    CompareOnly,
}

impl RunKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Maintenance => "maintenance",
            Self::Capture => "capture",
            Self::CompareOnly => "compare-only",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub timestamp: DateTime<Utc>,
    pub hostname: String,
    pub user: String,
    pub slurm_version: Option<String>,
    pub platform: PlatformDescriptor,
    pub roles: RoleMapping,
    pub mode: RunKind,
    /// Baseline the run compared against, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<String>,
    pub summary: RunSummary,
    pub overall_status: OverallStatus,
    pub tests: Vec<TestResult>,
}

impl RunReport {
    /// Build a report for `tests`; the summary is derived, never supplied.
    #[must_use]
    pub fn new(mode: RunKind, topology: &Topology, tests: Vec<TestResult>) -> Self {
        let summary = aggregate(&tests);
        Self {
            timestamp: Utc::now(),
            hostname: identity::hostname(),
            user: identity::username(),
            slurm_version: slurm_version_of(&tests),
            platform: topology.platform.clone(),
            roles: topology.roles.clone(),
            mode,
            baseline: None,
            summary,
            overall_status: summary.overall_status,
            tests,
        }
    }

    #[must_use]
    pub fn with_baseline(mut self, source: impl Into<String>) -> Self {
        self.baseline = Some(source.into());
        self
    }

    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.overall_status.exit_code()
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Plain-text report. `paint` decorates status labels (identity for files).
    #[must_use]
    pub fn render_text(&self, verbose: bool, paint: &dyn Fn(Status, &str) -> String) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Slurm Health Check Report");
        let _ = writeln!(out, "=========================");
        let _ = writeln!(out, "Timestamp: {}", self.timestamp.to_rfc3339());
        let _ = writeln!(out, "Host:      {} (user {})", self.hostname, self.user);
        let _ = writeln!(
            out,
            "Slurm:     {}",
            self.slurm_version.as_deref().unwrap_or("unknown")
        );
        let _ = writeln!(
            out,
            "Platform:  {} ({})",
            self.platform.major_version.tag(),
            self.platform.base_path.display()
        );
        let _ = writeln!(out, "Mode:      {}", self.mode.label());
        if let Some(baseline) = &self.baseline {
            let _ = writeln!(out, "Baseline:  {baseline}");
        }
        let _ = writeln!(out, "Roles:");
        for role in Role::ALL {
            let hosts = self.roles.hosts(role);
            let shown = if hosts.is_empty() {
                "(none)".to_string()
            } else {
                hosts.join(", ")
            };
            let _ = writeln!(out, "  {:<15} {shown}", role.label());
        }

        let mut current: Option<&str> = None;
        for test in &self.tests {
            if current != Some(test.category()) {
                let _ = writeln!(out);
                let _ = writeln!(out, "[{}]", test.category());
                current = Some(test.category());
            }
            out.push_str(&render_result(test, verbose, paint));
        }

        let s = &self.summary;
        let _ = writeln!(out);
        let _ = writeln!(out, "Summary");
        let _ = writeln!(out, "-------");
        let _ = writeln!(
            out,
            "Total: {}  Passed: {}  Warnings: {}  Failed: {}  Skipped: {}",
            s.total, s.passed, s.warned, s.failed, s.skipped
        );
        let verdict = match self.overall_status {
            OverallStatus::Healthy => paint(Status::Pass, self.overall_status.label()),
            OverallStatus::Degraded => paint(Status::Warn, self.overall_status.label()),
            OverallStatus::Critical => paint(Status::Fail, self.overall_status.label()),
        };
        let _ = writeln!(out, "Overall Status: {verdict}");
        out
    }

    /// Write the report to `path`: JSON when `json`, the plain-text form otherwise.
    pub fn save(&self, path: &Path, json: bool, verbose: bool) -> Result<()> {
        let body = if json {
            self.to_json_pretty()?
        } else {
            self.render_text(verbose, &|_, label| label.to_string())
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ShcError::io(parent, e))?;
        }
        fs::write(path, body).map_err(|e| ShcError::io(path, e))
    }
}

/// One outcome line, plus its details when `verbose`.
#[must_use]
pub fn render_result(test: &TestResult, verbose: bool, paint: &dyn Fn(Status, &str) -> String) -> String {
    let mut out = String::new();
    let label = format!("[{}]", test.status().label());
    let _ = writeln!(
        out,
        "  {} {}: {}",
        paint(test.status(), &label),
        test.name(),
        test.message()
    );
    if verbose {
        for (key, value) in test.details() {
            let shown = value
                .as_str()
                .map_or_else(|| value.to_string(), str::to_string);
            let _ = writeln!(out, "      {key}: {shown}");
        }
    }
    out
}

/// Version string reported by the Slurm version check, if it ran.
fn slurm_version_of(tests: &[TestResult]) -> Option<String> {
    tests
        .iter()
        .filter(|t| t.category() == Category::System.label() && t.status() == Status::Pass)
        .find_map(|t| t.details().get("version")?.as_str().map(str::to_string))
}
