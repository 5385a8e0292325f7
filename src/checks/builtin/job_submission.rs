//! Real job submission through `srun`. The only check that mutates the cluster.
//!
//! The test script lives on shared storage under a random name and is removed
//! by a drop guard, so it disappears on every exit path including timeouts
//! and panics.

#![allow(missing_docs)]

use std::path::Path;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::checks::check::{Check, CheckContext};
use crate::checks::outcome::{Category, TestResult};
use crate::core::errors::Result;
use crate::exec::executor::CommandExecutor;
use crate::topology::model::Role;

const REQUIRED: [Role; 2] = [Role::Controller, Role::ComputeClient];

/// Script body: writes the lines given as positional args into `$1`.
const CREATE_SCRIPT: &str = "umask 022 && target=\"$1\" && shift && printf '%s\\n' \"$@\" > \"$target\" && chmod 755 \"$target\"";

/// Removes the test artifact when dropped.
struct ArtifactGuard<'a> {
    executor: &'a dyn CommandExecutor,
    path: String,
    timeout: Duration,
}

impl Drop for ArtifactGuard<'_> {
    fn drop(&mut self) {
        let out = self
            .executor
            .execute(None, &["rm", "-f", self.path.as_str()], self.timeout);
        if !out.success() {
            eprintln!(
                "[SHC-WARN] failed to remove job test script {}: {}",
                self.path,
                out.failure_text()
            );
        }
    }
}

/// Unique artifact path inside `shared_dir`.
#[must_use]
pub fn artifact_path(shared_dir: &Path) -> String {
    let suffix: u64 = rand::rng().random();
    shared_dir
        .join(format!("slurm_healthcheck_{suffix:016x}.sh"))
        .display()
        .to_string()
}

pub struct JobSubmission;

impl Check for JobSubmission {
    fn id(&self) -> &'static str {
        "job_submission.basic"
    }

    fn category(&self) -> Category {
        Category::JobSubmission
    }

    fn title(&self) -> String {
        "Basic Job Test".to_string()
    }

    fn required_roles(&self) -> &[Role] {
        &REQUIRED
    }

    fn is_mutating(&self) -> bool {
        true
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Result<Vec<TestResult>> {
        let path = artifact_path(&ctx.config.cluster.shared_dir);
        let created = ctx.exec_local(&[
            "sh",
            "-c",
            CREATE_SCRIPT,
            "sh",
            path.as_str(),
            "#!/bin/bash",
            "echo \"Healthcheck test job\"",
            "hostname",
            "date",
        ]);
        if !created.success() {
            // Partial writes are still cleaned up.
            let _guard = ArtifactGuard {
                executor: ctx.executor,
                path: path.clone(),
                timeout: ctx.config.timeouts.default_timeout(),
            };
            return Ok(vec![
                TestResult::skip(
                    self.category(),
                    self.title(),
                    format!("Unable to create test script: {}", created.failure_text()),
                )
                .with_detail("script", path.as_str()),
            ]);
        }
        let guard = ArtifactGuard {
            executor: ctx.executor,
            path: path.clone(),
            timeout: ctx.config.timeouts.default_timeout(),
        };

        let limit = ctx.config.timeouts.job_submission();
        let started = Instant::now();
        let out = ctx.exec(
            None,
            &[
                "srun",
                "--overlap",
                "-t",
                "00:01:00",
                "-D",
                "/tmp",
                path.as_str(),
            ],
            limit,
        );
        let elapsed = started.elapsed().as_secs_f64();
        drop(guard);

        let result = if out.success() {
            TestResult::pass(
                self.category(),
                self.title(),
                format!("Job submission successful (elapsed: {elapsed:.2}s)"),
            )
            .with_detail("output", out.stdout_trimmed())
        } else if out.timed_out {
            TestResult::fail(
                self.category(),
                self.title(),
                format!("job did not finish within {}s", limit.as_secs()),
            )
        } else {
            TestResult::fail(
                self.category(),
                self.title(),
                format!("Job submission failed: {}", out.failure_text()),
            )
            .with_detail("error", out.failure_text())
        };
        Ok(vec![
            result
                .with_detail("elapsed_seconds", elapsed)
                .with_detail("script", path.as_str()),
        ])
    }
}
