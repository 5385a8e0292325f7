//! Check runner: executes a catalog in declared order, one check at a time.
//!
//! Every check is isolated. Missing roles and an undetected platform are
//! turned into SKIP before the check runs; an `Err` or a panic inside a check
//! is converted into a FAIL carrying the fault text, and the run continues.

#![allow(missing_docs)]

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use crate::checks::catalog::{Catalog, RunMode};
use crate::checks::check::{Check, CheckContext};
use crate::checks::outcome::TestResult;

pub struct CheckRunner<'a> {
    ctx: CheckContext<'a>,
}

impl<'a> CheckRunner<'a> {
    #[must_use]
    pub fn new(ctx: CheckContext<'a>) -> Self {
        Self { ctx }
    }

    /// Run every check eligible under `mode` and return outcomes in execution order.
    #[must_use]
    pub fn run(&self, catalog: &Catalog, mode: RunMode) -> Vec<TestResult> {
        self.run_with(catalog, mode, |_| {})
    }

    /// Like [`CheckRunner::run`], reporting each outcome to `observer` as soon
    /// as it is produced.
    pub fn run_with<F>(&self, catalog: &Catalog, mode: RunMode, mut observer: F) -> Vec<TestResult>
    where
        F: FnMut(&TestResult),
    {
        let mut results = Vec::new();
        for check in catalog.for_mode(mode) {
            for result in self.run_one(check) {
                observer(&result);
                results.push(result);
            }
        }
        results
    }

    /// Run a single check behind the isolation boundary.
    #[must_use]
    pub fn run_one(&self, check: &dyn Check) -> Vec<TestResult> {
        if let Some(skip) = self.precondition_skip(check) {
            return vec![skip];
        }

        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| check.run(&self.ctx)));
        let elapsed = started.elapsed();

        let results = match outcome {
            Ok(Ok(results)) if results.is_empty() => vec![TestResult::skip(
                check.category(),
                check.title(),
                "check produced no outcome",
            )],
            Ok(Ok(results)) => results,
            Ok(Err(err)) => vec![
                TestResult::fail(
                    check.category(),
                    check.title(),
                    format!("check aborted: {err}"),
                )
                .with_detail("error_code", err.code()),
            ],
            Err(payload) => vec![TestResult::fail(
                check.category(),
                check.title(),
                format!("check panicked: {}", panic_text(payload.as_ref())),
            )],
        };

        results
            .into_iter()
            .map(|result| {
                if result.duration().is_zero() {
                    result.with_duration(elapsed)
                } else {
                    result
                }
            })
            .collect()
    }

    fn precondition_skip(&self, check: &dyn Check) -> Option<TestResult> {
        let topology = self.ctx.topology;
        if let Some(role) = check
            .required_roles()
            .iter()
            .find(|role| !topology.roles.has(**role))
        {
            return Some(
                TestResult::skip(
                    check.category(),
                    check.title(),
                    format!("no {role} hosts discovered"),
                )
                .with_detail("missing_role", role.manager_tag()),
            );
        }
        if check.requires_platform() && topology.platform.is_fallback() {
            return Some(TestResult::skip(
                check.category(),
                check.title(),
                "platform version undetected; version-specific paths unavailable",
            ));
        }
        None
    }
}

fn panic_text(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}
