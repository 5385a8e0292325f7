//! Scheduler view of the cluster: node states and partitions.

#![allow(missing_docs)]

use std::collections::BTreeMap;

use crate::checks::builtin::fields;
use crate::checks::check::{Check, CheckContext, probe_failure_status};
use crate::checks::outcome::{Category, Status, TestResult};
use crate::core::errors::Result;
use crate::topology::model::Role;

const CONTROLLER: [Role; 1] = [Role::Controller];

/// Node states that need no operator attention.
pub const HEALTHY_STATES: [&str; 4] = ["idle", "allocated", "mixed", "completing"];

/// Lower-cased state with sinfo's flag suffixes (`*`, `~`, `#`, ...) removed.
#[must_use]
pub fn normalize_state(raw: &str) -> String {
    raw.trim()
        .trim_end_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_ascii_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct NodeRow {
    name: String,
    state: String,
    reason: String,
}

/// One row per node; `sinfo -N` repeats nodes that sit in several partitions.
fn parse_node_rows(stdout: &str) -> Vec<NodeRow> {
    let mut rows: Vec<NodeRow> = Vec::new();
    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let parts = fields(line);
        if parts.len() < 2 || parts[0].is_empty() {
            continue;
        }
        if rows.iter().any(|row| row.name == parts[0]) {
            continue;
        }
        rows.push(NodeRow {
            name: parts[0].to_string(),
            state: parts[1].to_string(),
            reason: parts.get(2).copied().unwrap_or_default().to_string(),
        });
    }
    rows
}

/// Classifies the share of nodes outside the healthy states.
pub struct NodeHealth;

impl Check for NodeHealth {
    fn id(&self) -> &'static str {
        "nodes.health"
    }

    fn category(&self) -> Category {
        Category::Nodes
    }

    fn title(&self) -> String {
        "Node Health".to_string()
    }

    fn required_roles(&self) -> &[Role] {
        &CONTROLLER
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Result<Vec<TestResult>> {
        let out = ctx.exec_local(&["sinfo", "-N", "-h", "-o", "%N|%T|%E"]);
        if !out.success() {
            return Ok(vec![
                TestResult::new(
                    self.category(),
                    self.title(),
                    probe_failure_status(self.category(), &out),
                    format!("unable to query node status: {}", out.failure_text()),
                )
                .with_detail("error", out.failure_text()),
            ]);
        }

        let rows = parse_node_rows(&out.stdout);
        let total = rows.len();
        if total == 0 {
            return Ok(vec![TestResult::warn(
                self.category(),
                self.title(),
                "scheduler reported no nodes",
            )]);
        }

        let mut state_counts: BTreeMap<String, u64> = BTreeMap::new();
        let mut problems = Vec::new();
        for row in &rows {
            *state_counts.entry(row.state.clone()).or_default() += 1;
            if !HEALTHY_STATES.contains(&normalize_state(&row.state).as_str()) {
                problems.push(row);
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let status = if problems.is_empty() {
            Status::Pass
        } else if (problems.len() as f64) < ctx.config.checks.problem_node_fail_ratio * total as f64 {
            Status::Warn
        } else {
            Status::Fail
        };
        let message = if problems.is_empty() {
            format!("All {total} nodes are healthy")
        } else {
            format!("{} of {total} nodes have issues", problems.len())
        };
        let shown: Vec<String> = problems
            .iter()
            .take(5)
            .map(|row| format!("{}: {} ({})", row.name, row.state, row.reason))
            .collect();

        Ok(vec![
            TestResult::new(self.category(), self.title(), status, message)
                .with_detail("total_nodes", total)
                .with_detail("problem_count", problems.len())
                .with_detail("problem_nodes", shown)
                .with_detail(
                    "state_counts",
                    serde_json::to_value(&state_counts)?,
                ),
        ])
    }
}

/// Partition inventory as the scheduler sees it.
pub struct Partitions;

impl Check for Partitions {
    fn id(&self) -> &'static str {
        "configuration.partitions"
    }

    fn category(&self) -> Category {
        Category::Configuration
    }

    fn title(&self) -> String {
        "Partitions".to_string()
    }

    fn required_roles(&self) -> &[Role] {
        &CONTROLLER
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Result<Vec<TestResult>> {
        let out = ctx.exec_local(&["sinfo", "-h", "-o", "%R|%a|%l|%D|%T"]);
        if !out.success() {
            return Ok(vec![
                TestResult::new(
                    self.category(),
                    self.title(),
                    probe_failure_status(self.category(), &out),
                    format!("unable to query partitions: {}", out.failure_text()),
                )
                .with_detail("error", out.failure_text()),
            ]);
        }

        let mut names: Vec<String> = Vec::new();
        let mut unavailable: Vec<String> = Vec::new();
        for line in out.lines() {
            let parts = fields(line);
            if parts.len() < 4 || names.iter().any(|n| n == parts[0]) {
                continue;
            }
            names.push(parts[0].to_string());
            if parts[1] != "up" {
                unavailable.push(parts[0].to_string());
            }
        }

        let result = if names.is_empty() {
            TestResult::warn(self.category(), self.title(), "No partitions found")
        } else {
            TestResult::pass(
                self.category(),
                self.title(),
                format!("Found {} partition(s)", names.len()),
            )
            .with_detail("partitions", names)
            .with_detail("not_up", unavailable)
        };
        Ok(vec![result])
    }
}
