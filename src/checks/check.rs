//! The check abstraction and the context every check runs against.

#![allow(missing_docs)]

use std::time::Duration;

use crate::checks::outcome::{Category, Status, TestResult};
use crate::core::config::Config;
use crate::core::errors::Result;
use crate::exec::executor::{CommandExecutor, ExecOutput};
use crate::topology::discovery::Topology;
use crate::topology::model::Role;

/// Everything a check may consult. Checks are pure functions of this context.
#[derive(Clone, Copy)]
pub struct CheckContext<'a> {
    pub topology: &'a Topology,
    pub executor: &'a dyn CommandExecutor,
    pub config: &'a Config,
}

impl<'a> CheckContext<'a> {
    #[must_use]
    pub fn new(
        topology: &'a Topology,
        executor: &'a dyn CommandExecutor,
        config: &'a Config,
    ) -> Self {
        Self {
            topology,
            executor,
            config,
        }
    }

    /// Run `argv` on `host` (`None` = locally) under `timeout`.
    #[must_use]
    pub fn exec(&self, host: Option<&str>, argv: &[&str], timeout: Duration) -> ExecOutput {
        self.executor.execute(host, argv, timeout)
    }

    /// Run `argv` locally under the default timeout.
    #[must_use]
    pub fn exec_local(&self, argv: &[&str]) -> ExecOutput {
        self.exec(None, argv, self.config.timeouts.default_timeout())
    }

    #[must_use]
    pub fn hosts(&self, role: Role) -> &'a [String] {
        self.topology.roles.hosts(role)
    }
}

/// Status for a probe that did not succeed: the category's timeout class when
/// the deadline hit, FAIL otherwise.
#[must_use]
pub fn probe_failure_status(category: Category, out: &ExecOutput) -> Status {
    if out.timed_out {
        category.timeout_status()
    } else {
        Status::Fail
    }
}

/// One catalog entry.
///
/// A check may emit several outcomes (one per probed host). Returning `Err`
/// or panicking is caught at the runner boundary and reported as FAIL.
pub trait Check {
    /// Stable identifier, unique within a catalog.
    fn id(&self) -> &'static str;

    fn category(&self) -> Category;

    /// Outcome name used when the runner reports on behalf of the check.
    fn title(&self) -> String;

    /// Roles that must have at least one host, otherwise the check is skipped.
    fn required_roles(&self) -> &[Role] {
        &[]
    }

    /// Whether the check consults version-specific paths.
    fn requires_platform(&self) -> bool {
        false
    }

    /// Whether the check changes cluster state (e.g. submits a job).
    fn is_mutating(&self) -> bool {
        false
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Result<Vec<TestResult>>;
}
