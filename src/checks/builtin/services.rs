//! Daemon state on role hosts, probed with `systemctl` over the executor.

#![allow(missing_docs)]

use std::time::Instant;

use crate::checks::builtin::ACTIVE;
use crate::checks::check::{Check, CheckContext};
use crate::checks::outcome::{Category, TestResult};
use crate::core::errors::Result;
use crate::topology::model::Role;

/// One systemd unit checked on the hosts of one role.
pub struct ServiceCheck {
    id: &'static str,
    role: [Role; 1],
    unit: &'static str,
    label: &'static str,
    /// Probe at most this many hosts; `None` probes all of them.
    sample: Option<usize>,
}

impl ServiceCheck {
    #[must_use]
    pub const fn controller() -> Self {
        Self {
            id: "services.controller",
            role: [Role::Controller],
            unit: "slurmctld.service",
            label: "Slurm Controller",
            sample: None,
        }
    }

    #[must_use]
    pub const fn database() -> Self {
        Self {
            id: "services.database",
            role: [Role::Accounting],
            unit: "slurmdbd.service",
            label: "Slurm Database",
            sample: None,
        }
    }

    #[must_use]
    pub const fn client(sample: usize) -> Self {
        Self {
            id: "services.client",
            role: [Role::ComputeClient],
            unit: "slurmd.service",
            label: "Slurm Client",
            sample: Some(sample),
        }
    }

    fn probe(&self, ctx: &CheckContext<'_>, host: &str) -> TestResult {
        let started = Instant::now();
        let timeout = ctx.config.timeouts.default_timeout();
        let name = format!("{} on {host}", self.label);
        let state = ctx.exec(Some(host), &["systemctl", "is-active", self.unit], timeout);

        let result = if state.timed_out {
            TestResult::new(
                self.category(),
                name,
                self.category().timeout_status(),
                format!("{host} did not answer within {}s", timeout.as_secs()),
            )
            .with_detail("node", host)
            .with_detail("status", "unreachable")
        } else if state.stdout_trimmed() == ACTIVE {
            let since = ctx.exec(
                Some(host),
                &[
                    "systemctl",
                    "show",
                    self.unit,
                    "--property=ActiveEnterTimestamp",
                ],
                timeout,
            );
            TestResult::pass(
                self.category(),
                name,
                format!("{} is active on {host}", self.unit),
            )
            .with_detail("node", host)
            .with_detail("status", ACTIVE)
            .with_detail("details", since.stdout_trimmed())
        } else {
            let shown = if state.stdout_trimmed().is_empty() {
                state.failure_text()
            } else {
                state.stdout_trimmed().to_string()
            };
            TestResult::fail(
                self.category(),
                name,
                format!("{} is not active on {host}: {shown}", self.unit),
            )
            .with_detail("node", host)
            .with_detail("status", shown)
        };
        result.with_duration(started.elapsed())
    }
}

impl Check for ServiceCheck {
    fn id(&self) -> &'static str {
        self.id
    }

    fn category(&self) -> Category {
        Category::Services
    }

    fn title(&self) -> String {
        self.label.to_string()
    }

    fn required_roles(&self) -> &[Role] {
        &self.role
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Result<Vec<TestResult>> {
        let hosts = ctx.hosts(self.role[0]);
        if self.sample == Some(0) {
            return Ok(vec![TestResult::skip(
                self.category(),
                self.title(),
                "sampling disabled (client_service_sample = 0)",
            )]);
        }
        let limit = self.sample.unwrap_or(hosts.len());
        Ok(hosts
            .iter()
            .take(limit)
            .map(|host| self.probe(ctx, host))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::outcome::Status;
    use crate::core::config::Config;
    use crate::exec::executor::ExecOutput;
    use crate::exec::scripted::ScriptedExecutor;
    use crate::topology::discovery::Topology;
    use crate::topology::model::{PlatformDescriptor, RoleMapping};
    use std::time::Duration;

    fn topology(roles: RoleMapping) -> Topology {
        Topology::new(roles, PlatformDescriptor::fallback(&Config::default().cluster))
    }

    #[test]
    fn one_outcome_per_controller_host() {
        let config = Config::default();
        let topo = topology(RoleMapping::default().with_role(
            Role::Controller,
            vec!["ctl-01".into(), "ctl-02".into()],
        ));
        let exec = ScriptedExecutor::new();
        exec.on_host(
            Some("ctl-01"),
            &["systemctl", "is-active"],
            ExecOutput::exited(0, "active\n", ""),
        );
        exec.on_host(
            Some("ctl-02"),
            &["systemctl", "is-active"],
            ExecOutput::exited(3, "failed\n", ""),
        );
        exec.ok(&["systemctl", "show"], "ActiveEnterTimestamp=Mon 2024-01-01 10:00:00 UTC\n");

        let results = ServiceCheck::controller()
            .run(&CheckContext::new(&topo, &exec, &config))
            .expect("runs");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].name(), "Slurm Controller on ctl-01");
        assert_eq!(results[0].status(), Status::Pass);
        assert_eq!(results[1].status(), Status::Fail);
        assert!(results[1].message().contains("failed"));
    }

    #[test]
    fn unreachable_host_fails_as_timeout() {
        let config = Config::default();
        let topo = topology(
            RoleMapping::default().with_role(Role::Accounting, vec!["db-01".into()]),
        );
        let exec = ScriptedExecutor::new();
        exec.on(
            &["systemctl", "is-active"],
            ExecOutput::timeout(Duration::from_secs(30)),
        );
        let results = ServiceCheck::database()
            .run(&CheckContext::new(&topo, &exec, &config))
            .expect("runs");
        assert_eq!(results[0].status(), Status::Fail);
        assert_eq!(results[0].details()["status"], "unreachable");
    }

    #[test]
    fn zero_sample_skips_with_reason() {
        let config = Config::default();
        let topo = topology(
            RoleMapping::default().with_role(Role::ComputeClient, vec!["node001".into()]),
        );
        let exec = ScriptedExecutor::new();
        let results = ServiceCheck::client(0)
            .run(&CheckContext::new(&topo, &exec, &config))
            .expect("runs");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status(), Status::Skip);
        assert!(results[0].message().contains("sampling disabled"));
        assert!(exec.calls().is_empty());
    }

    #[test]
    fn client_probe_is_sampled() {
        let config = Config::default();
        let nodes: Vec<String> = (1..=10).map(|i| format!("node{i:03}")).collect();
        let topo = topology(RoleMapping::default().with_role(Role::ComputeClient, nodes));
        let exec = ScriptedExecutor::new();
        exec.ok(&["systemctl", "is-active"], "active\n");
        exec.ok(&["systemctl", "show"], "");

        let results = ServiceCheck::client(3)
            .run(&CheckContext::new(&topo, &exec, &config))
            .expect("runs");
        assert_eq!(results.len(), 3);
        assert_eq!(exec.count_containing("is-active"), 3);
    }
}
