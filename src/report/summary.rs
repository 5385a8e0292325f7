//! Result aggregator: outcome sequence → run summary → exit code.
//!
//! `aggregate` is a pure function. No component keeps running counters; the
//! summary is always recomputed from the full outcome sequence.

#![allow(missing_docs)]

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::checks::outcome::{Status, TestResult};

/// Overall cluster verdict for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Critical,
}

impl OverallStatus {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Healthy => "HEALTHY",
            Self::Degraded => "DEGRADED",
            Self::Critical => "CRITICAL",
        }
    }

    /// Process exit code contract: HEALTHY 0, DEGRADED 1, CRITICAL 2.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Healthy => 0,
            Self::Degraded => 1,
            Self::Critical => 2,
        }
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub warned: usize,
    pub skipped: usize,
    pub overall_status: OverallStatus,
}

impl RunSummary {
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.overall_status.exit_code()
    }
}

/// Summarize `results`. An empty sequence is HEALTHY.
#[must_use]
pub fn aggregate(results: &[TestResult]) -> RunSummary {
    let count = |status: Status| results.iter().filter(|r| r.status() == status).count();
    let passed = count(Status::Pass);
    let failed = count(Status::Fail);
    let warned = count(Status::Warn);
    let skipped = count(Status::Skip);

    let overall_status = if failed > 0 {
        OverallStatus::Critical
    } else if warned > 0 {
        OverallStatus::Degraded
    } else {
        OverallStatus::Healthy
    };

    RunSummary {
        total: results.len(),
        passed,
        failed,
        warned,
        skipped,
        overall_status,
    }
}
