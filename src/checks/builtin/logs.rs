//! Recent daemon log lines scanned for error patterns on the primary role host.

#![allow(missing_docs)]

use std::time::Instant;

use crate::checks::check::{Check, CheckContext};
use crate::checks::outcome::{Category, TestResult};
use crate::core::errors::Result;
use crate::exec::executor::ExecOutput;
use crate::topology::model::Role;

pub struct LogScan {
    id: &'static str,
    role: [Role; 1],
    daemon: &'static str,
    label: &'static str,
}

impl LogScan {
    #[must_use]
    pub const fn controller() -> Self {
        Self {
            id: "logs.controller",
            role: [Role::Controller],
            daemon: "slurmctld",
            label: "Controller Log",
        }
    }

    #[must_use]
    pub const fn database() -> Self {
        Self {
            id: "logs.database",
            role: [Role::Accounting],
            daemon: "slurmdbd",
            label: "Database Log",
        }
    }

    fn log_file(&self) -> String {
        format!("/var/log/slurm/{}.log", self.daemon)
    }

    /// journald first, then the plain log file.
    fn read(&self, ctx: &CheckContext<'_>, host: &str, lines: &str) -> (ExecOutput, bool) {
        let timeout = ctx.config.timeouts.log_read();
        let journal = ctx.exec(
            Some(host),
            &["journalctl", "-u", self.daemon, "-n", lines, "--no-pager"],
            timeout,
        );
        if journal.success() {
            return (journal, false);
        }
        let file = self.log_file();
        let tail = ctx.exec(Some(host), &["tail", "-n", lines, file.as_str()], timeout);
        let any_timeout = journal.timed_out || tail.timed_out;
        (tail, any_timeout)
    }
}

impl Check for LogScan {
    fn id(&self) -> &'static str {
        self.id
    }

    fn category(&self) -> Category {
        Category::Logs
    }

    fn title(&self) -> String {
        self.label.to_string()
    }

    fn required_roles(&self) -> &[Role] {
        &self.role
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Result<Vec<TestResult>> {
        let Some(host) = ctx.topology.roles.primary(self.role[0]) else {
            return Ok(Vec::new());
        };
        let started = Instant::now();
        let patterns = ctx.config.log_error_regexes()?;
        let tail_lines = ctx.config.checks.log_tail_lines;
        let name = format!("{} on {host}", self.label);

        let (out, any_timeout) = self.read(ctx, host, &tail_lines.to_string());
        let result = if out.success() {
            let hits: Vec<&str> = out
                .stdout
                .lines()
                .map(str::trim)
                .filter(|line| patterns.iter().any(|re| re.is_match(line)))
                .collect();
            let scanned = if hits.is_empty() {
                TestResult::pass(self.category(), name, "No recent errors found")
            } else {
                TestResult::warn(
                    self.category(),
                    name,
                    format!(
                        "Found {} error/warning line(s) in last {tail_lines} lines",
                        hits.len()
                    ),
                )
                .with_detail("sample", hits.iter().take(3).copied().collect::<Vec<_>>())
            };
            scanned.with_detail("error_count", hits.len())
        } else if any_timeout {
            TestResult::new(
                self.category(),
                name,
                self.category().timeout_status(),
                format!("reading logs on {host} timed out"),
            )
        } else {
            TestResult::skip(
                self.category(),
                name,
                format!(
                    "Unable to read logs (tried journalctl and {})",
                    self.log_file()
                ),
            )
        };

        Ok(vec![result.with_detail("node", host).with_duration(started.elapsed())])
    }
}
