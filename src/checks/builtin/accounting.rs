//! Accounting daemon reachability and job-history access.

#![allow(missing_docs)]

use crate::checks::builtin::fields;
use crate::checks::check::{Check, CheckContext, probe_failure_status};
use crate::checks::outcome::{Category, Status, TestResult};
use crate::core::errors::Result;
use crate::topology::model::Role;

const ACCOUNTING: [Role; 1] = [Role::Accounting];

/// Clusters registered in the accounting database.
pub struct DatabaseConnection;

impl Check for DatabaseConnection {
    fn id(&self) -> &'static str {
        "accounting.connection"
    }

    fn category(&self) -> Category {
        Category::Accounting
    }

    fn title(&self) -> String {
        "Database Connection".to_string()
    }

    fn required_roles(&self) -> &[Role] {
        &ACCOUNTING
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Result<Vec<TestResult>> {
        let out = ctx.exec(
            None,
            &["sacctmgr", "show", "cluster", "-n", "-P"],
            ctx.config.timeouts.accounting(),
        );
        let clusters: Vec<String> = out
            .lines()
            .filter_map(|line| fields(line).first().map(|s| (*s).to_string()))
            .filter(|name| !name.is_empty())
            .collect();

        let result = if out.success() && !clusters.is_empty() {
            TestResult::pass(
                self.category(),
                self.title(),
                format!("slurmdbd is accessible, found {} cluster(s)", clusters.len()),
            )
            .with_detail("clusters", clusters)
        } else if out.success() {
            TestResult::fail(
                self.category(),
                self.title(),
                "slurmdbd answered but no clusters are registered",
            )
        } else {
            TestResult::new(
                self.category(),
                self.title(),
                probe_failure_status(self.category(), &out),
                format!("unable to connect to slurmdbd: {}", out.failure_text()),
            )
            .with_detail("error", out.failure_text())
        };
        Ok(vec![result])
    }
}

/// Finished jobs of the last week are readable.
pub struct JobHistory;

impl Check for JobHistory {
    fn id(&self) -> &'static str {
        "accounting.job_history"
    }

    fn category(&self) -> Category {
        Category::Accounting
    }

    fn title(&self) -> String {
        "Job History Access".to_string()
    }

    fn required_roles(&self) -> &[Role] {
        &ACCOUNTING
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Result<Vec<TestResult>> {
        let out = ctx.exec(
            None,
            &[
                "sacct",
                "-S",
                "now-7days",
                "-n",
                "-X",
                "-P",
                "--format=JobID",
                "--state=COMPLETED,FAILED,CANCELLED",
            ],
            ctx.config.timeouts.job_history(),
        );

        let result = if out.success() {
            let count = out.lines().count();
            TestResult::pass(
                self.category(),
                self.title(),
                format!("Job history accessible ({count} jobs in last 7 days)"),
            )
            .with_detail("recent_job_count", count)
        } else {
            let status = if out.stderr.contains("No jobs") {
                Status::Warn
            } else {
                probe_failure_status(self.category(), &out)
            };
            TestResult::new(
                self.category(),
                self.title(),
                status,
                format!("issue accessing job history: {}", out.failure_text()),
            )
            .with_detail("error", out.failure_text())
        };
        Ok(vec![result])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::exec::executor::ExecOutput;
    use crate::exec::scripted::ScriptedExecutor;
    use crate::topology::discovery::Topology;
    use crate::topology::model::{PlatformDescriptor, RoleMapping};

    fn run(check: &dyn Check, exec: &ScriptedExecutor) -> TestResult {
        let config = Config::default();
        let topo = Topology::new(
            RoleMapping::default().with_role(Role::Accounting, vec!["db-01".into()]),
            PlatformDescriptor::fallback(&config.cluster),
        );
        check
            .run(&CheckContext::new(&topo, exec, &config))
            .expect("runs")
            .remove(0)
    }

    #[test]
    fn clusters_are_listed() {
        let exec = ScriptedExecutor::new();
        exec.ok(&["sacctmgr"], "slurm|10.141.255.254|6817|\nother|10.0.0.1|6817|\n");
        let result = run(&DatabaseConnection, &exec);
        assert_eq!(result.status(), Status::Pass);
        assert_eq!(result.details()["clusters"], serde_json::json!(["slurm", "other"]));
    }

    #[test]
    fn unreachable_database_fails() {
        let exec = ScriptedExecutor::new();
        exec.on(
            &["sacctmgr"],
            ExecOutput::exited(1, "", "sacctmgr: error: Problem talking to the database"),
        );
        let result = run(&DatabaseConnection, &exec);
        assert_eq!(result.status(), Status::Fail);
        assert!(result.message().contains("Problem talking"));
    }

    #[test]
    fn job_history_counts_jobs() {
        let exec = ScriptedExecutor::new();
        exec.ok(&["sacct"], "101\n102\n103\n");
        let result = run(&JobHistory, &exec);
        assert_eq!(result.status(), Status::Pass);
        assert_eq!(result.details()["recent_job_count"], 3);
    }

    #[test]
    fn no_jobs_is_only_a_warning() {
        let exec = ScriptedExecutor::new();
        exec.on(&["sacct"], ExecOutput::exited(1, "", "No jobs found"));
        assert_eq!(run(&JobHistory, &exec).status(), Status::Warn);
    }
}
