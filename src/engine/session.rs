//! Validation session: one run of the engine from discovery to verdict.
//!
//! Flow:
//! 1. Topology discovery (once; its outcomes lead the report)
//! 2. Check catalog, or the snapshotter for a capture run
//! 3. Baseline comparison when a baseline was supplied
//! 4. Aggregation into a [`RunReport`]
//!
//! Configuration-class failures (bad catalog, unreadable baseline) surface as
//! `Err` before any outcome exists. Everything else becomes an outcome.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::baseline::capture::{CaptureReport, Snapshotter};
use crate::baseline::compare::compare;
use crate::baseline::snapshot::BaselineSnapshot;
use crate::checks::catalog::{Catalog, RunMode};
use crate::checks::check::CheckContext;
use crate::checks::outcome::TestResult;
use crate::checks::runner::CheckRunner;
use crate::core::config::{Config, MAX_JOB_WINDOW_DAYS};
use crate::core::errors::{Result, ShcError};
use crate::exec::executor::CommandExecutor;
use crate::logger::activity::{ActivityEvent, ActivityLog};
use crate::report::run_report::{RunKind, RunReport};
use crate::report::summary::aggregate;
use crate::topology::discovery::{DiscoveryReport, TopologyDiscovery};

/// A baseline read from disk, with the path it came from.
#[derive(Debug, Clone)]
pub struct LoadedBaseline {
    pub path: PathBuf,
    pub snapshot: BaselineSnapshot,
}

/// Result of a capture run: the report plus the sealed snapshot to persist.
#[derive(Debug, Clone)]
pub struct CaptureRun {
    pub report: RunReport,
    pub snapshot: BaselineSnapshot,
}

pub struct ValidationSession<'a> {
    executor: &'a dyn CommandExecutor,
    config: &'a Config,
    log: &'a ActivityLog,
    catalog: Catalog,
}

impl<'a> ValidationSession<'a> {
    /// Session over the standard check catalog.
    pub fn new(
        executor: &'a dyn CommandExecutor,
        config: &'a Config,
        log: &'a ActivityLog,
    ) -> Result<Self> {
        Ok(Self::with_catalog(
            executor,
            config,
            log,
            Catalog::standard(config)?,
        ))
    }

    #[must_use]
    pub fn with_catalog(
        executor: &'a dyn CommandExecutor,
        config: &'a Config,
        log: &'a ActivityLog,
        catalog: Catalog,
    ) -> Self {
        Self {
            executor,
            config,
            log,
            catalog,
        }
    }

    /// Read and verify a baseline file. Failures are configuration-class.
    pub fn load_baseline(&self, path: &Path) -> Result<LoadedBaseline> {
        match BaselineSnapshot::load(path) {
            Ok(snapshot) => {
                self.log.record(&ActivityEvent::BaselineLoaded {
                    path,
                    snapshot: &snapshot,
                });
                Ok(LoadedBaseline {
                    path: path.to_path_buf(),
                    snapshot,
                })
            }
            Err(error) => Err(self.fail(error)),
        }
    }

    /// Normal or maintenance run, optionally followed by a baseline comparison.
    pub fn run(&self, mode: RunMode, baseline: Option<&LoadedBaseline>) -> Result<RunReport> {
        let kind = match mode {
            RunMode::Normal => RunKind::Normal,
            RunMode::Maintenance => RunKind::Maintenance,
        };
        let started = self.start(kind);
        let discovery = self.discover();

        let ctx = CheckContext::new(&discovery.topology, self.executor, self.config);
        let mut tests = discovery.outcomes.clone();
        tests.extend(CheckRunner::new(ctx).run_with(&self.catalog, mode, |result| {
            self.log.record(&ActivityEvent::CheckCompleted { result });
        }));

        if let Some(baseline) = baseline {
            tests.extend(self.compare_against(&discovery, baseline)?);
        }

        let report = RunReport::new(kind, &discovery.topology, tests);
        Ok(self.finish(with_source(report, baseline), started))
    }

    /// Comparison outcomes only: no live checks run.
    pub fn compare_only(&self, baseline: &LoadedBaseline) -> Result<RunReport> {
        let started = self.start(RunKind::CompareOnly);
        let discovery = self.discover();

        let mut tests = discovery.outcomes.clone();
        tests.extend(self.compare_against(&discovery, baseline)?);

        let report = RunReport::new(RunKind::CompareOnly, &discovery.topology, tests);
        Ok(self.finish(with_source(report, Some(baseline)), started))
    }

    /// Capture a baseline with a job window of `window_days` ending now.
    pub fn capture(&self, window_days: u32) -> Result<CaptureRun> {
        if !(1..=MAX_JOB_WINDOW_DAYS).contains(&window_days) {
            return Err(self.fail(ShcError::InvalidRunMode {
                details: format!("--window-days must be in [1,{MAX_JOB_WINDOW_DAYS}], got {window_days}"),
            }));
        }
        let started = self.start(RunKind::Capture);
        let discovery = self.discover();

        let CaptureReport { snapshot, outcomes } = Snapshotter::new(self.executor, self.config)
            .capture(&discovery.topology, window_days)
            .map_err(|e| self.fail(e))?;
        for result in &outcomes {
            self.log.record(&ActivityEvent::CheckCompleted { result });
        }

        let mut tests = discovery.outcomes.clone();
        tests.extend(outcomes);
        let report = self.finish(
            RunReport::new(RunKind::Capture, &discovery.topology, tests),
            started,
        );
        Ok(CaptureRun { report, snapshot })
    }

    /// Write a captured snapshot to `path`.
    pub fn persist(&self, snapshot: &BaselineSnapshot, path: &Path) -> Result<()> {
        snapshot.save(path).map_err(|e| self.fail(e))?;
        self.log
            .record(&ActivityEvent::BaselineCaptured { path, snapshot });
        Ok(())
    }

    // ──────────────────────── internals ────────────────────────

    fn start(&self, mode: RunKind) -> Instant {
        let config_hash = self.config.stable_hash().unwrap_or_default();
        self.log.record(&ActivityEvent::RunStarted {
            mode,
            config_hash: &config_hash,
        });
        Instant::now()
    }

    fn discover(&self) -> DiscoveryReport {
        let discovery = TopologyDiscovery::new(self.executor, self.config).discover_all();
        self.log.record(&ActivityEvent::TopologyDiscovered {
            topology: &discovery.topology,
        });
        discovery
    }

    /// Capture the live side anchored at the baseline's window start, then diff.
    fn compare_against(
        &self,
        discovery: &DiscoveryReport,
        baseline: &LoadedBaseline,
    ) -> Result<Vec<TestResult>> {
        let started = Instant::now();
        let live = Snapshotter::new(self.executor, self.config)
            .capture_since(
                &discovery.topology,
                baseline.snapshot.job_window_start,
                baseline.snapshot.job_window_days,
            )
            .map_err(|e| self.fail(e))?
            .snapshot;

        let results = compare(&baseline.snapshot, &live);
        for result in &results {
            self.log.record(&ActivityEvent::CheckCompleted { result });
        }
        self.log.record(&ActivityEvent::ComparisonCompleted {
            summary: &aggregate(&results),
            duration: started.elapsed(),
        });
        Ok(results)
    }

    fn finish(&self, report: RunReport, started: Instant) -> RunReport {
        self.log.record(&ActivityEvent::RunCompleted {
            report: &report,
            duration: started.elapsed(),
        });
        report
    }

    fn fail(&self, error: ShcError) -> ShcError {
        self.log.record(&ActivityEvent::Error { error: &error });
        error
    }
}

fn with_source(report: RunReport, baseline: Option<&LoadedBaseline>) -> RunReport {
    match baseline {
        Some(b) => report.with_baseline(b.path.display().to_string()),
        None => report,
    }
}
