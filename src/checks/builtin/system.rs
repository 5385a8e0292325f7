//! Local system checks: installed Slurm version and munge authentication.

#![allow(missing_docs)]

use crate::checks::builtin::ACTIVE;
use crate::checks::check::{Check, CheckContext, probe_failure_status};
use crate::checks::outcome::{Category, TestResult};
use crate::core::errors::Result;

/// `sinfo --version` on the local host.
pub struct SlurmVersion;

impl Check for SlurmVersion {
    fn id(&self) -> &'static str {
        "system.slurm_version"
    }

    fn category(&self) -> Category {
        Category::System
    }

    fn title(&self) -> String {
        "Slurm Version".to_string()
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Result<Vec<TestResult>> {
        let out = ctx.exec_local(&["sinfo", "--version"]);
        let result = if out.success() && !out.stdout_trimmed().is_empty() {
            let version = out.stdout_trimmed().to_string();
            TestResult::pass(
                self.category(),
                self.title(),
                format!("Slurm is installed: {version}"),
            )
            .with_detail("version", version)
        } else {
            TestResult::new(
                self.category(),
                self.title(),
                probe_failure_status(self.category(), &out),
                format!("unable to determine Slurm version: {}", out.failure_text()),
            )
            .with_detail("error", out.failure_text())
        };
        Ok(vec![result])
    }
}

/// munge daemon state plus an encode/decode round trip.
pub struct MungeService;

impl Check for MungeService {
    fn id(&self) -> &'static str {
        "authentication.munge"
    }

    fn category(&self) -> Category {
        Category::Authentication
    }

    fn title(&self) -> String {
        "Munge Service".to_string()
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Result<Vec<TestResult>> {
        let state = ctx.exec_local(&["systemctl", "is-active", "munge.service"]);
        if state.stdout_trimmed() != ACTIVE {
            let shown = if state.stdout_trimmed().is_empty() {
                state.failure_text()
            } else {
                state.stdout_trimmed().to_string()
            };
            return Ok(vec![
                TestResult::fail(
                    self.category(),
                    self.title(),
                    format!("munge service is not active: {shown}"),
                )
                .with_detail("status", shown),
            ]);
        }

        let round_trip = ctx.exec_local(&["sh", "-c", "munge -n | unmunge"]);
        let result = if round_trip.success() {
            TestResult::pass(self.category(), self.title(), "Munge authentication working")
        } else if round_trip.timed_out {
            TestResult::fail(
                self.category(),
                self.title(),
                "munge round trip did not finish in time",
            )
        } else {
            TestResult::warn(
                self.category(),
                self.title(),
                format!(
                    "munge service active but encode/decode round trip failed: {}",
                    round_trip.failure_text()
                ),
            )
            .with_detail("error", round_trip.failure_text())
        };
        Ok(vec![result])
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

    fn run(check: &dyn Check, exec: &ScriptedExecutor) -> Vec<TestResult> {
        let config = Config::default();
        let topo = Topology::new(
            RoleMapping::default(),
            PlatformDescriptor::fallback(&config.cluster),
        );
        check
            .run(&CheckContext::new(&topo, exec, &config))
            .expect("check runs")
    }

    #[test]
    fn version_reported_when_sinfo_answers() {
        let exec = ScriptedExecutor::new();
        exec.ok(&["sinfo", "--version"], "slurm 23.11.4\n");
        let results = run(&SlurmVersion, &exec);
        assert_eq!(results[0].status(), Status::Pass);
        assert_eq!(results[0].details()["version"], "slurm 23.11.4");
    }

    #[test]
    fn version_timeout_fails() {
        let exec = ScriptedExecutor::new();
        exec.on(
            &["sinfo"],
            ExecOutput::timeout(std::time::Duration::from_secs(30)),
        );
        assert_eq!(run(&SlurmVersion, &exec)[0].status(), Status::Fail);
    }

    #[test]
    fn munge_inactive_fails() {
        let exec = ScriptedExecutor::new();
        exec.on(
            &["systemctl", "is-active"],
            ExecOutput::exited(3, "inactive\n", ""),
        );
        let results = run(&MungeService, &exec);
        assert_eq!(results[0].status(), Status::Fail);
        assert!(results[0].message().contains("inactive"));
        assert_eq!(exec.count_containing("unmunge"), 0);
    }

    #[test]
    fn munge_decode_failure_warns() {
        let exec = ScriptedExecutor::new();
        exec.ok(&["systemctl", "is-active"], "active\n");
        exec.on(&["sh", "-c"], ExecOutput::exited(1, "", "unmunge: Invalid credential"));
        let results = run(&MungeService, &exec);
        assert_eq!(results[0].status(), Status::Warn);
    }

    #[test]
    fn munge_round_trip_passes() {
        let exec = ScriptedExecutor::new();
        exec.ok(&["systemctl", "is-active"], "active\n");
        exec.ok(&["sh", "-c"], "STATUS: Success (0)\n");
        assert_eq!(run(&MungeService, &exec)[0].status(), Status::Pass);
    }
}
