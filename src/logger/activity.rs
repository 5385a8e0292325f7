//! Run activity log: typed run events mapped onto JSONL entries.
//!
//! The log is shared by reference through the whole run (the check runner
//! reports through a callback), so the writer sits behind a mutex.

#![allow(missing_docs)]

use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;

use crate::baseline::snapshot::BaselineSnapshot;
use crate::checks::outcome::{Status, TestResult};
use crate::core::config::Config;
use crate::core::errors::ShcError;
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};
use crate::report::run_report::{RunKind, RunReport};
use crate::report::summary::{OverallStatus, RunSummary};
use crate::topology::discovery::Topology;
use crate::topology::model::Role;

/// Events of one healthcheck run.
#[derive(Debug, Clone)]
pub enum ActivityEvent<'a> {
    RunStarted {
        mode: RunKind,
        config_hash: &'a str,
    },
    TopologyDiscovered {
        topology: &'a Topology,
    },
    CheckCompleted {
        result: &'a TestResult,
    },
    BaselineCaptured {
        path: &'a Path,
        snapshot: &'a BaselineSnapshot,
    },
    BaselineLoaded {
        path: &'a Path,
        snapshot: &'a BaselineSnapshot,
    },
    ComparisonCompleted {
        summary: &'a RunSummary,
        duration: Duration,
    },
    RunCompleted {
        report: &'a RunReport,
        duration: Duration,
    },
    Error {
        error: &'a ShcError,
    },
}

impl ActivityEvent<'_> {
    #[must_use]
    pub fn to_entry(&self) -> LogEntry {
        match self {
            Self::RunStarted { mode, config_hash } => {
                let mut e = LogEntry::new(EventType::RunStart, Severity::Info);
                e.name = Some(mode.label().to_string());
                e.details = Some(json!({
                    "version": env!("CARGO_PKG_VERSION"),
                    "config_hash": config_hash,
                }));
                e
            }
            Self::TopologyDiscovered { topology } => {
                let mut e = LogEntry::new(EventType::TopologyDiscovered, Severity::Info);
                let roles: serde_json::Map<String, serde_json::Value> = Role::ALL
                    .iter()
                    .map(|role| (role.label().to_string(), json!(topology.roles.hosts(*role))))
                    .collect();
                e.details = Some(json!({
                    "platform": topology.platform.major_version.tag(),
                    "base_path": topology.platform.base_path,
                    "roles": roles,
                }));
                if topology.platform.is_fallback() {
                    e.severity = Severity::Warning;
                }
                e
            }
            Self::CheckCompleted { result } => {
                let mut e = LogEntry::new(EventType::CheckComplete, status_severity(result.status()));
                e.category = Some(result.category().to_string());
                e.name = Some(result.name().to_string());
                e.status = Some(result.status().label().to_string());
                e.host = result
                    .details()
                    .get("node")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                e.duration_ms = Some(millis(result.duration()));
                if !result.details().is_empty() {
                    e.details = Some(json!(result.details()));
                }
                e.error_code = result
                    .details()
                    .get("error_code")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                e
            }
            Self::BaselineCaptured { path, snapshot } => {
                snapshot_entry(EventType::BaselineCaptured, path, snapshot)
            }
            Self::BaselineLoaded { path, snapshot } => {
                snapshot_entry(EventType::BaselineLoaded, path, snapshot)
            }
            Self::ComparisonCompleted { summary, duration } => {
                let mut e = LogEntry::new(
                    EventType::ComparisonComplete,
                    overall_severity(summary.overall_status),
                );
                e.status = Some(summary.overall_status.label().to_string());
                e.duration_ms = Some(millis(*duration));
                e.details = Some(json!(summary));
                e
            }
            Self::RunCompleted { report, duration } => {
                let mut e = LogEntry::new(EventType::RunComplete, overall_severity(report.overall_status));
                e.name = Some(report.mode.label().to_string());
                e.status = Some(report.overall_status.label().to_string());
                e.host = Some(report.hostname.clone());
                e.duration_ms = Some(millis(*duration));
                e.details = Some(json!(report.summary));
                e
            }
            Self::Error { error } => {
                let mut e = LogEntry::new(EventType::Error, Severity::Critical);
                e.error_code = Some(error.code().to_string());
                e.details = Some(json!({ "message": error.to_string() }));
                e
            }
        }
    }
}

/// JSONL activity log for one run.
pub struct ActivityLog {
    writer: Mutex<JsonlWriter>,
}

impl ActivityLog {
    /// Open the log configured in `paths`.
    #[must_use]
    pub fn open(config: &Config) -> Self {
        let jsonl = JsonlConfig::new(
            config.paths.jsonl_log.clone(),
            config.paths.jsonl_fallback.clone(),
        );
        Self::with_writer(JsonlWriter::open(jsonl))
    }

    /// A log that records nothing.
    #[must_use]
    pub fn disabled() -> Self {
        Self::with_writer(JsonlWriter::discard())
    }

    #[must_use]
    pub fn with_writer(writer: JsonlWriter) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn record(&self, event: &ActivityEvent<'_>) {
        self.writer.lock().write_entry(&event.to_entry());
    }

    /// Degradation state of the underlying writer.
    pub fn state(&self) -> String {
        self.writer.lock().state().to_string()
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::disabled()
    }
}

fn snapshot_entry(event: EventType, path: &Path, snapshot: &BaselineSnapshot) -> LogEntry {
    let severity = if snapshot.capture_errors.is_empty() {
        Severity::Info
    } else {
        Severity::Warning
    };
    let mut e = LogEntry::new(event, severity);
    e.name = Some(path.display().to_string());
    e.host = Some(snapshot.source_host.clone());
    e.details = Some(json!({
        "platform_version": snapshot.platform_version,
        "captured_at": snapshot.captured_at,
        "job_window_days": snapshot.job_window_days,
        "content_digest": snapshot.content_digest,
        "capture_errors": snapshot.capture_errors.keys().collect::<Vec<_>>(),
    }));
    e
}

const fn status_severity(status: Status) -> Severity {
    match status {
        Status::Pass | Status::Skip => Severity::Info,
        Status::Warn => Severity::Warning,
        Status::Fail => Severity::Critical,
    }
}

const fn overall_severity(status: OverallStatus) -> Severity {
    match status {
        OverallStatus::Healthy => Severity::Info,
        OverallStatus::Degraded => Severity::Warning,
        OverallStatus::Critical => Severity::Critical,
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
