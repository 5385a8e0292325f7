//! Baseline snapshotter.
//!
//! Captures accounting entities, the job window, and scheduler configuration
//! in one ordered pass. Job counts and the per-user/per-account breakdowns are
//! derived from the same `sacct` listing, so they are mutually consistent by
//! construction. A failed query is recorded in `capture_errors` and leaves
//! its field empty; capture itself only fails on an unrepresentable window
//! or a serialization error.

#![allow(missing_docs)]

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, SubsecRound, TimeDelta, Utc};

use crate::baseline::snapshot::{
    AccountingState, Attributes, BaselineSnapshot, ConfigurationState, SCHEMA_VERSION, Source,
    SystemState,
};
use crate::checks::outcome::{Category, TestResult};
use crate::core::config::Config;
use crate::core::errors::{Result, ShcError};
use crate::core::identity;
use crate::exec::executor::{CommandExecutor, ExecOutput};
use crate::topology::discovery::Topology;

/// A captured snapshot plus one outcome per capture query.
#[derive(Debug, Clone)]
pub struct CaptureReport {
    pub snapshot: BaselineSnapshot,
    pub outcomes: Vec<TestResult>,
}

pub struct Snapshotter<'a> {
    executor: &'a dyn CommandExecutor,
    config: &'a Config,
}

impl<'a> Snapshotter<'a> {
    #[must_use]
    pub fn new(executor: &'a dyn CommandExecutor, config: &'a Config) -> Self {
        Self { executor, config }
    }

    /// Capture with a job window of `window_days` ending now.
    pub fn capture(&self, topology: &Topology, window_days: u32) -> Result<CaptureReport> {
        let now = Utc::now().trunc_subsecs(0);
        let start = TimeDelta::try_days(i64::from(window_days))
            .and_then(|window| now.checked_sub_signed(window))
            .ok_or_else(|| ShcError::InvalidRunMode {
                details: format!("--window-days {window_days} reaches before the calendar start"),
            })?;
        self.capture_window(topology, now, start, window_days)
    }

    /// Capture with the job window anchored at `start`, as recorded in a
    /// baseline, so jobs that aged out of a sliding window are not lost.
    pub fn capture_since(
        &self,
        topology: &Topology,
        start: DateTime<Utc>,
        window_days: u32,
    ) -> Result<CaptureReport> {
        let now = Utc::now().trunc_subsecs(0);
        self.capture_window(topology, now, start, window_days)
    }

    fn capture_window(
        &self,
        topology: &Topology,
        now: DateTime<Utc>,
        start: DateTime<Utc>,
        window_days: u32,
    ) -> Result<CaptureReport> {
        let mut pass = CapturePass::default();

        let version = self.query(&mut pass, Source::Version, &["sinfo", "--version"], self.config.timeouts.default_timeout());
        let platform_version = version.map(|lines| lines.join(" ")).unwrap_or_default();

        let mut accounting = AccountingState::default();
        for (source, entity, slot) in [
            (Source::Users, "user", &mut accounting.users),
            (Source::Accounts, "account", &mut accounting.accounts),
            (Source::Qos, "qos", &mut accounting.qos),
            (Source::Associations, "associations", &mut accounting.associations),
            (Source::Tres, "tres", &mut accounting.tres),
            (Source::Clusters, "cluster", &mut accounting.clusters),
        ] {
            if let Some(records) = self.query(
                &mut pass,
                source,
                &["sacctmgr", "show", entity, "-P", "-n"],
                self.config.timeouts.accounting(),
            ) {
                *slot = records;
            }
        }

        let window_start = start
            .with_timezone(&Local)
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string();
        if let Some(lines) = self.query(
            &mut pass,
            Source::Jobs,
            &[
                "sacct",
                "-a",
                "-X",
                "-n",
                "-P",
                "-S",
                window_start.as_str(),
                "-E",
                "now",
                "--format=JobID,User,Account",
            ],
            self.config.timeouts.job_history(),
        ) {
            let jobs = tally_jobs(&lines);
            accounting.job_count_window = jobs.total;
            accounting.per_user_job_counts = jobs.per_user;
            accounting.per_account_job_counts = jobs.per_account;
        }

        let mut configuration = ConfigurationState::default();
        if let Some(lines) = self.query(
            &mut pass,
            Source::Partitions,
            &["scontrol", "show", "partition", "-o"],
            self.config.timeouts.default_timeout(),
        ) {
            configuration.partitions = parse_partitions(&lines);
        }

        let mut system_state = SystemState::default();
        if let Some(lines) = self.query(
            &mut pass,
            Source::Nodes,
            &["sinfo", "-N", "-h", "-o", "%N|%T|%G|%c|%m|%P"],
            self.config.timeouts.default_timeout(),
        ) {
            let nodes = parse_nodes(&lines);
            system_state.total_nodes = nodes.attributes.len() as u64;
            system_state.node_state_counts = nodes.state_counts;
            configuration.nodes = nodes.attributes;
        }

        let snapshot = BaselineSnapshot {
            schema_version: SCHEMA_VERSION,
            captured_at: now,
            source_host: identity::hostname(),
            platform_version,
            platform_tag: topology.platform.major_version.tag().to_string(),
            job_window_days: window_days,
            job_window_start: start,
            accounting,
            configuration,
            system_state,
            capture_errors: pass.errors,
            content_digest: String::new(),
        }
        .seal()?;

        let outcomes = pass
            .outcomes
            .into_iter()
            .map(|(source, result)| annotate(source, result, &snapshot))
            .collect();
        Ok(CaptureReport { snapshot, outcomes })
    }

    /// Run one capture query; `None` (and a recorded error) when it fails.
    fn query(
        &self,
        pass: &mut CapturePass,
        source: Source,
        argv: &[&str],
        timeout: Duration,
    ) -> Option<Vec<String>> {
        let started = Instant::now();
        let out = self.executor.execute(None, argv, timeout);
        let elapsed = started.elapsed();
        if out.success() {
            let lines: Vec<String> = out.lines().map(str::to_string).collect();
            pass.outcomes.push((
                source,
                TestResult::pass(Category::BaselineCapture, source.label(), "captured")
                    .with_duration(elapsed),
            ));
            Some(lines)
        } else {
            let reason = failure_reason(&out);
            pass.outcomes.push((
                source,
                TestResult::warn(
                    Category::BaselineCapture,
                    source.label(),
                    format!("query failed: {reason}"),
                )
                .with_detail("command", argv.join(" "))
                .with_duration(elapsed),
            ));
            pass.errors.insert(source.key().to_string(), reason);
            None
        }
    }
}

#[derive(Default)]
struct CapturePass {
    errors: BTreeMap<String, String>,
    outcomes: Vec<(Source, TestResult)>,
}

fn failure_reason(out: &ExecOutput) -> String {
    if out.timed_out {
        format!("timed out ({})", out.failure_text())
    } else {
        out.failure_text()
    }
}

/// Fill in the record count once the snapshot exists.
fn annotate(source: Source, result: TestResult, snapshot: &BaselineSnapshot) -> TestResult {
    if snapshot.capture_error(source).is_some() {
        return result;
    }
    let acct = &snapshot.accounting;
    let (count, noun) = match source {
        Source::Version => {
            return TestResult::pass(
                Category::BaselineCapture,
                source.label(),
                format!("recorded {}", snapshot.platform_version),
            )
            .with_duration(result.duration());
        }
        Source::Users => (acct.users.len(), "users"),
        Source::Accounts => (acct.accounts.len(), "accounts"),
        Source::Qos => (acct.qos.len(), "QOS"),
        Source::Associations => (acct.associations.len(), "associations"),
        Source::Tres => (acct.tres.len(), "TRES"),
        Source::Clusters => (acct.clusters.len(), "clusters"),
        Source::Jobs => (
            usize::try_from(acct.job_count_window).unwrap_or(usize::MAX),
            "jobs since window start",
        ),
        Source::Partitions => (snapshot.configuration.partitions.len(), "partitions"),
        Source::Nodes => (snapshot.configuration.nodes.len(), "nodes"),
    };
    TestResult::pass(
        Category::BaselineCapture,
        source.label(),
        format!("captured {count} {noun}"),
    )
    .with_detail("count", count)
    .with_duration(result.duration())
}

#[derive(Debug, Default, PartialEq, Eq)]
struct JobTally {
    total: u64,
    per_user: BTreeMap<String, u64>,
    per_account: BTreeMap<String, u64>,
}

/// Counts over `JobID|User|Account` lines; each job id counts once.
fn tally_jobs(lines: &[String]) -> JobTally {
    let mut seen = BTreeSet::new();
    let mut tally = JobTally::default();
    for line in lines {
        let mut parts = line.split('|').map(str::trim);
        let Some(job_id) = parts.next().filter(|id| !id.is_empty()) else {
            continue;
        };
        if !seen.insert(job_id.to_string()) {
            continue;
        }
        tally.total += 1;
        if let Some(user) = parts.next().filter(|u| !u.is_empty()) {
            *tally.per_user.entry(user.to_string()).or_default() += 1;
        }
        if let Some(account) = parts.next().filter(|a| !a.is_empty()) {
            *tally.per_account.entry(account.to_string()).or_default() += 1;
        }
    }
    tally
}

/// Partition keys derived from node inventory or runtime state, not configuration.
const DERIVED_PARTITION_KEYS: [&str; 3] = ["State", "TotalCPUs", "TotalNodes"];

/// `scontrol show partition -o`: one partition per line as `Key=Value` tokens,
/// minus the derived keys.
fn parse_partitions(lines: &[String]) -> BTreeMap<String, Attributes> {
    let mut partitions = BTreeMap::new();
    for line in lines {
        let mut attributes: Attributes = line
            .split_whitespace()
            .filter_map(|token| token.split_once('='))
            .filter(|(k, _)| !DERIVED_PARTITION_KEYS.contains(k))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        if let Some(name) = attributes.remove("PartitionName") {
            partitions.insert(name, attributes);
        }
    }
    partitions
}

#[derive(Debug, Default)]
struct NodeCapture {
    attributes: BTreeMap<String, Attributes>,
    state_counts: BTreeMap<String, u64>,
}

/// `%N|%T|%G|%c|%m|%P` lines. A node listed once per partition is merged into
/// one entry whose `partitions` attribute is the sorted partition list.
fn parse_nodes(lines: &[String]) -> NodeCapture {
    let mut capture = NodeCapture::default();
    let mut partitions: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for line in lines {
        let parts: Vec<&str> = line.split('|').map(str::trim).collect();
        let Some(name) = parts.first().filter(|n| !n.is_empty()) else {
            continue;
        };
        let field = |i: usize| parts.get(i).copied().unwrap_or_default().to_string();
        if !capture.attributes.contains_key(*name) {
            *capture.state_counts.entry(field(1)).or_default() += 1;
            let attrs: Attributes = [
                ("gres".to_string(), field(2)),
                ("cpus".to_string(), field(3)),
                ("memory_mb".to_string(), field(4)),
            ]
            .into_iter()
            .collect();
            capture.attributes.insert((*name).to_string(), attrs);
        }
        let partition = field(5);
        if !partition.is_empty() {
            partitions
                .entry((*name).to_string())
                .or_default()
                .insert(partition.trim_end_matches('*').to_string());
        }
    }
    for (name, attrs) in &mut capture.attributes {
        let list = partitions
            .get(name)
            .map(|set| set.iter().cloned().collect::<Vec<_>>().join(","))
            .unwrap_or_default();
        attrs.insert("partitions".to_string(), list);
    }
    capture
}
