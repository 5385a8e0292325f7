//! End-to-end engine scenarios over a scripted cluster: discovery, the check
//! catalog, capture, and baseline comparison wired through a session.

use std::collections::HashSet;
use std::fs;
use std::time::Duration;

use serde_json::Value;
use slurm_healthcheck::prelude::*;

const CMSH: &str = "/cm/local/apps/cmd/bin/cmsh";
const CHECK_NODES: [&str; 5] = ["sinfo", "-N", "-h", "-o", "%N|%T|%E"];
const CAPTURE_NODES: [&str; 5] = ["sinfo", "-N", "-h", "-o", "%N|%T|%G|%c|%m|%P"];

fn role_query(tag: &str) -> String {
    format!("device; foreach -l {tag} (get hostname)")
}

/// A healthy two-node cluster on platform 10 where every probe answers.
fn healthy_cluster() -> ScriptedExecutor {
    let exec = ScriptedExecutor::new();
    exec.on(&[], ExecOutput::exited(1, "", "unexpected command"));

    // Discovery
    exec.ok(&["test", "-x", CMSH], "");
    exec.ok(&["grep", "VERSION"], "VERSION 10.0\n");
    for (tag, hosts) in [
        ("slurmserver", "ctl-01\n"),
        ("slurmaccounting", "db-01\n"),
        ("slurmclient", "node001\nnode002\n"),
    ] {
        let query = role_query(tag);
        exec.ok(&[CMSH, "-c", query.as_str()], hosts);
    }

    // Checks
    exec.ok(&["sinfo", "--version"], "slurm 23.02.7\n");
    exec.ok(&["systemctl", "is-active"], "active\n");
    exec.ok(
        &["systemctl", "show"],
        "ActiveEnterTimestamp=Fri 2024-03-01 09:00:00 UTC\n",
    );
    exec.ok(&CHECK_NODES, "node001|idle|none\nnode002|mixed|none\n");
    exec.ok(&["sacctmgr", "show", "cluster"], "slurm|10.141.255.254|6817|\n");
    exec.ok(&["sacct", "-S", "now-7days"], "101\n102\n");
    exec.ok(&["sinfo", "-h", "-o"], "defq*|up|infinite|2|idle\n");
    exec.ok(&["sh", "-c"], "");
    exec.ok(
        &["journalctl"],
        "-- Logs begin --\nMar 01 09:00:00 ctl-01 slurmctld[1]: started\n",
    );
    exec.ok(&["test", "-f"], "");
    exec.ok(&["enroot", "version"], "3.4.1\n");
    exec.ok(&["srun"], "Healthcheck test job\nnode001\n");
    exec.ok(&["rm", "-f"], "");

    // Capture
    exec.ok(&["sacctmgr", "show", "user"], "alice|physics|None|\nbob|chem|None|\n");
    exec.ok(&["sacctmgr", "show", "account"], "chem|chemistry|uni|\nphysics|physics|uni|\n");
    exec.ok(&["sacctmgr", "show", "qos"], "normal|0|\n");
    exec.ok(
        &["sacctmgr", "show", "associations"],
        "slurm|physics|alice||1|\nslurm|chem|bob||1|\n",
    );
    exec.ok(&["sacctmgr", "show", "tres"], "cpu||1\nmem||2\n");
    exec.ok(&["sacct", "-a"], &jobs(&[("alice", "physics", 60), ("bob", "chem", 40)]));
    exec.ok(
        &["scontrol", "show", "partition", "-o"],
        "PartitionName=defq Default=YES MaxTime=UNLIMITED Nodes=node[001-002] State=UP\n",
    );
    exec.ok(
        &CAPTURE_NODES,
        "node001|idle|gpu:4|64|256000|defq\nnode002|mixed|gpu:4|64|256000|defq\n",
    );
    exec
}

/// `JobID|User|Account` lines with sequential ids.
fn jobs(owners: &[(&str, &str, u32)]) -> String {
    let mut out = String::new();
    let mut id = 1000;
    for (user, account, count) in owners {
        for _ in 0..*count {
            id += 1;
            out.push_str(&format!("{id}|{user}|{account}\n"));
        }
    }
    out
}

fn session<'a>(exec: &'a ScriptedExecutor, config: &'a Config, log: &'a ActivityLog) -> ValidationSession<'a> {
    ValidationSession::new(exec, config, log).expect("standard catalog is valid")
}

fn by_category<'a>(report: &'a RunReport, category: Category) -> Vec<&'a TestResult> {
    report
        .tests
        .iter()
        .filter(|t| t.category() == category.label())
        .collect()
}

#[test]
fn healthy_cluster_passes_every_check() {
    let exec = healthy_cluster();
    let config = Config::default();
    let log = ActivityLog::disabled();

    let report = session(&exec, &config, &log)
        .run(RunMode::Normal, None)
        .expect("run");

    let failing: Vec<_> = report
        .tests
        .iter()
        .filter(|t| t.status() != Status::Pass)
        .map(|t| format!("{} / {}: {}", t.category(), t.name(), t.message()))
        .collect();
    assert!(failing.is_empty(), "unexpected non-PASS outcomes: {failing:#?}");
    assert_eq!(report.overall_status, OverallStatus::Healthy);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.slurm_version.as_deref(), Some("slurm 23.02.7"));
    assert_eq!(report.roles.hosts(Role::ComputeClient), ["node001", "node002"]);
    // The job-submission artifact is always removed.
    assert_eq!(exec.count_containing("rm -f"), 1);
}

#[test]
fn categories_appear_in_contiguous_blocks() {
    let exec = healthy_cluster();
    let config = Config::default();
    let log = ActivityLog::disabled();
    let report = session(&exec, &config, &log)
        .run(RunMode::Normal, None)
        .expect("run");

    let mut seen = HashSet::new();
    let mut previous = "";
    for test in &report.tests {
        if test.category() != previous {
            assert!(
                seen.insert(test.category().to_string()),
                "{} reappears",
                test.category()
            );
            previous = test.category();
        }
    }
    assert_eq!(report.tests[0].category(), Category::Topology.label());
}

#[test]
fn maintenance_run_never_submits_a_job() {
    let exec = healthy_cluster();
    let config = Config::default();
    let log = ActivityLog::disabled();
    let report = session(&exec, &config, &log)
        .run(RunMode::Maintenance, None)
        .expect("run");

    assert!(by_category(&report, Category::JobSubmission).is_empty());
    assert_eq!(exec.count_containing("srun"), 0);
    assert_eq!(exec.count_containing("slurm_healthcheck_"), 0);
    assert_eq!(report.mode, RunKind::Maintenance);
    assert_eq!(report.overall_status, OverallStatus::Healthy);
}

#[test]
fn missing_controller_role_skips_dependents_without_failing() {
    let exec = healthy_cluster();
    let query = role_query("slurmserver");
    exec.ok(&[CMSH, "-c", query.as_str()], "");
    let config = Config::default();
    let log = ActivityLog::disabled();
    let report = session(&exec, &config, &log)
        .run(RunMode::Normal, None)
        .expect("run");

    assert!(
        report.tests.iter().all(|t| t.status() != Status::Fail),
        "no FAIL may come from an empty role"
    );
    for category in [Category::Nodes, Category::Configuration, Category::JobSubmission] {
        let results = by_category(&report, category);
        assert!(!results.is_empty(), "{category} missing");
        assert!(results.iter().all(|t| t.status() == Status::Skip), "{category} not skipped");
    }
    let controller_services: Vec<_> = by_category(&report, Category::Services)
        .into_iter()
        .filter(|t| t.name().starts_with("Slurm Controller"))
        .collect();
    assert_eq!(controller_services.len(), 1);
    assert_eq!(controller_services[0].status(), Status::Skip);
    assert_eq!(report.overall_status, OverallStatus::Degraded);
}

#[test]
fn platform_probe_timeout_falls_back_and_skips_pyxis() {
    let exec = healthy_cluster();
    exec.on(&["grep", "VERSION"], ExecOutput::timeout(Duration::from_secs(5)));
    let config = Config::default();
    let log = ActivityLog::disabled();
    let report = session(&exec, &config, &log)
        .run(RunMode::Normal, None)
        .expect("run");

    assert!(report.platform.is_fallback());
    let pyxis = by_category(&report, Category::Pyxis);
    assert_eq!(pyxis.len(), 1);
    assert_eq!(pyxis[0].status(), Status::Skip);
    assert_eq!(exec.count_containing("test -f"), 0);
    let platform = by_category(&report, Category::Topology)
        .into_iter()
        .find(|t| t.name() == "Platform Version")
        .expect("platform outcome");
    assert_eq!(platform.status(), Status::Warn);
}

#[test]
fn stopped_controller_daemon_is_critical() {
    let exec = healthy_cluster();
    exec.on_host(
        Some("ctl-01"),
        &["systemctl", "is-active", "slurmctld.service"],
        ExecOutput::exited(3, "inactive\n", ""),
    );
    let config = Config::default();
    let log = ActivityLog::disabled();
    let report = session(&exec, &config, &log)
        .run(RunMode::Maintenance, None)
        .expect("run");

    let failed: Vec<_> = report
        .tests
        .iter()
        .filter(|t| t.status() == Status::Fail)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].name(), "Slurm Controller on ctl-01");
    assert_eq!(report.overall_status, OverallStatus::Critical);
    assert_eq!(report.exit_code(), 2);
}

#[test]
fn unreachable_log_host_only_warns() {
    let exec = healthy_cluster();
    exec.on(&["journalctl"], ExecOutput::timeout(Duration::from_secs(30)));
    exec.on(&["tail"], ExecOutput::timeout(Duration::from_secs(30)));
    let config = Config::default();
    let log = ActivityLog::disabled();
    let report = session(&exec, &config, &log)
        .run(RunMode::Maintenance, None)
        .expect("run");

    let logs = by_category(&report, Category::Logs);
    assert_eq!(logs.len(), 2);
    assert!(logs.iter().all(|t| t.status() == Status::Warn));
    assert_eq!(report.overall_status, OverallStatus::Degraded);
}

/// Capture on `before`, then compare `after` against the persisted file.
fn capture_then_compare(before: &ScriptedExecutor, after: &ScriptedExecutor) -> RunReport {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("pre.json");
    let config = Config::default();
    let log = ActivityLog::disabled();

    let pre = session(before, &config, &log);
    let capture = pre.capture(30).expect("capture");
    assert_eq!(capture.report.overall_status, OverallStatus::Healthy);
    pre.persist(&capture.snapshot, &path).expect("persist");

    let post = session(after, &config, &log);
    let baseline = post.load_baseline(&path).expect("load");
    post.compare_only(&baseline).expect("compare")
}

fn comparison<'a>(report: &'a RunReport, name: &str) -> &'a TestResult {
    report
        .tests
        .iter()
        .find(|t| t.category() == Category::BaselineComparison.label() && t.name() == name)
        .unwrap_or_else(|| panic!("no comparison outcome {name}"))
}

#[test]
fn comparing_an_unchanged_cluster_only_warns_about_the_version() {
    let report = capture_then_compare(&healthy_cluster(), &healthy_cluster());

    let compared = by_category(&report, Category::BaselineComparison);
    assert_eq!(compared.len(), 15);
    assert_eq!(compared.iter().filter(|t| t.status() == Status::Fail).count(), 0);
    let warned: Vec<_> = compared.iter().filter(|t| t.status() == Status::Warn).collect();
    assert_eq!(warned.len(), 1);
    assert_eq!(warned[0].name(), "Slurm Version");
    assert_eq!(report.overall_status, OverallStatus::Degraded);
    assert_eq!(report.exit_code(), 1);
}

#[test]
fn upgrade_with_growth_passes_every_comparison() {
    let after = healthy_cluster();
    after.ok(&["sinfo", "--version"], "slurm 23.11.4\n");
    after.ok(
        &["sacctmgr", "show", "user"],
        "alice|physics|None|\nbob|chem|None|\ncarol|physics|None|\n",
    );
    after.ok(
        &["sacct", "-a"],
        &jobs(&[("alice", "physics", 70), ("bob", "chem", 40), ("carol", "physics", 40)]),
    );
    // Newer releases report more partition attributes; runtime state differs.
    after.ok(
        &["scontrol", "show", "partition", "-o"],
        "PartitionName=defq Default=YES MaxTime=UNLIMITED Nodes=node[001-002] State=DRAIN \
         TotalCPUs=128 PowerDownOnIdle=NO\n",
    );

    let report = capture_then_compare(&healthy_cluster(), &after);
    let compared = by_category(&report, Category::BaselineComparison);
    assert!(
        compared.iter().all(|t| t.status() == Status::Pass),
        "{:#?}",
        compared
            .iter()
            .filter(|t| t.status() != Status::Pass)
            .map(|t| (t.name(), t.message()))
            .collect::<Vec<_>>()
    );
    assert_eq!(report.overall_status, OverallStatus::Healthy);
    assert_eq!(comparison(&report, "Jobs: Window Count").details()["current"], 150);
    let attrs = comparison(&report, "Configuration: Partition Attributes");
    assert_eq!(attrs.details()["added_keys"]["defq"], serde_json::json!(["PowerDownOnIdle"]));
}

#[test]
fn accounting_rollback_is_data_loss() {
    let after = healthy_cluster();
    after.ok(&["sinfo", "--version"], "slurm 23.11.4\n");
    after.ok(&["sacctmgr", "show", "user"], "alice|physics|None|\n");
    after.ok(&["sacct", "-a"], &jobs(&[("alice", "physics", 40)]));

    let report = capture_then_compare(&healthy_cluster(), &after);
    assert_eq!(comparison(&report, "Accounting: Users").status(), Status::Fail);
    assert!(comparison(&report, "Accounting: Users").message().contains("bob"));
    let window = comparison(&report, "Jobs: Window Count");
    assert_eq!(window.status(), Status::Fail);
    assert!(window.message().contains("decreased from 100 to 40"));
    assert_eq!(comparison(&report, "Jobs: Per-User Counts").status(), Status::Fail);
    assert_eq!(report.overall_status, OverallStatus::Critical);
    assert_eq!(report.exit_code(), 2);
}

#[test]
fn partition_drift_fails_exact_rule() {
    let after = healthy_cluster();
    after.ok(&["sinfo", "--version"], "slurm 23.11.4\n");
    after.ok(
        &["scontrol", "show", "partition", "-o"],
        "PartitionName=defq Default=YES MaxTime=1-00:00:00 Nodes=node[001-002] State=UP\n",
    );

    let report = capture_then_compare(&healthy_cluster(), &after);
    assert_eq!(comparison(&report, "Configuration: Partition Names").status(), Status::Pass);
    let attrs = comparison(&report, "Configuration: Partition Attributes");
    assert_eq!(attrs.status(), Status::Fail);
    assert_eq!(attrs.details()["changed"]["defq"]["current"]["MaxTime"], "1-00:00:00");
}

#[test]
fn run_with_baseline_appends_comparison_after_checks() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("pre.json");
    let exec = healthy_cluster();
    let config = Config::default();
    let log = ActivityLog::disabled();
    let s = session(&exec, &config, &log);
    let capture = s.capture(30).expect("capture");
    s.persist(&capture.snapshot, &path).expect("persist");

    let baseline = s.load_baseline(&path).expect("load");
    let report = s.run(RunMode::Maintenance, Some(&baseline)).expect("run");
    let last = report.tests.last().expect("outcomes");
    assert_eq!(last.category(), Category::BaselineComparison.label());
    assert!(!by_category(&report, Category::Services).is_empty());
    assert_eq!(report.baseline.as_deref(), Some(path.display().to_string().as_str()));
}

#[test]
fn tampered_baseline_is_rejected_before_comparison() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("pre.json");
    let exec = healthy_cluster();
    let config = Config::default();
    let log = ActivityLog::disabled();
    let s = session(&exec, &config, &log);
    let capture = s.capture(30).expect("capture");
    s.persist(&capture.snapshot, &path).expect("persist");

    let text = fs::read_to_string(&path).expect("read");
    fs::write(&path, text.replace("\"job_count_window\": 100", "\"job_count_window\": 99"))
        .expect("write");
    let err = s.load_baseline(&path).expect_err("digest mismatch");
    assert!(err.is_config_class());
    assert!(err.to_string().contains("digest mismatch"));
}

#[test]
fn activity_log_records_the_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = Config::default();
    config.paths.jsonl_log = dir.path().join("activity.jsonl");
    config.paths.jsonl_fallback = None;
    let log = ActivityLog::open(&config);
    let exec = healthy_cluster();

    let report = session(&exec, &config, &log)
        .run(RunMode::Maintenance, None)
        .expect("run");

    let lines: Vec<Value> = fs::read_to_string(&config.paths.jsonl_log)
        .expect("log written")
        .lines()
        .map(|l| serde_json::from_str(l).expect("json line"))
        .collect();
    let events: Vec<&str> = lines.iter().filter_map(|l| l["event"].as_str()).collect();
    assert_eq!(events.first(), Some(&"run_start"));
    assert_eq!(events.get(1), Some(&"topology_discovered"));
    assert_eq!(events.last(), Some(&"run_complete"));
    let checks = events.iter().filter(|e| **e == "check_complete").count();
    // Discovery outcomes are not logged as check events.
    let discovery = by_category(&report, Category::Topology).len();
    assert_eq!(checks, report.tests.len() - discovery);
    assert_eq!(lines.last().expect("last")["status"], "HEALTHY");
}
