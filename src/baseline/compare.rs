//! Baseline comparator: one classified outcome per policy row.
//!
//! Data loss is always FAIL. An unchanged version is only a WARN: comparison
//! may run without an upgrade in between. Fields the baseline could not
//! capture are SKIPped; fields the live capture could not read FAIL.

#![allow(missing_docs)]

use std::collections::{BTreeMap, BTreeSet};

use serde_json::json;

use crate::baseline::policy::{Field, KeySpec, POLICY, PolicyEntry, Rule, record_keys};
use crate::baseline::snapshot::{Attributes, BaselineSnapshot};
use crate::checks::outcome::{Category, TestResult};

/// Members listed in a message before it is truncated.
const SHOWN: usize = 10;

/// Compare `live` against `baseline`. Not symmetric.
#[must_use]
pub fn compare(baseline: &BaselineSnapshot, live: &BaselineSnapshot) -> Vec<TestResult> {
    POLICY
        .iter()
        .map(|entry| compare_field(entry, baseline, live))
        .collect()
}

fn compare_field(entry: &PolicyEntry, baseline: &BaselineSnapshot, live: &BaselineSnapshot) -> TestResult {
    if let Some(err) = baseline.capture_error(entry.source) {
        return outcome(entry, OutcomeKind::Skip, format!("baseline did not capture this field: {err}"));
    }
    if let Some(err) = live.capture_error(entry.source) {
        return outcome(entry, OutcomeKind::Fail, format!("unable to query current value: {err}"))
            .with_detail("error", err);
    }

    let base = &baseline.accounting;
    let cur = &live.accounting;
    let result = match entry.field {
        Field::Version => compare_version(entry, &baseline.platform_version, &live.platform_version),
        Field::Users => superset(entry, &base.users, &cur.users),
        Field::Accounts => superset(entry, &base.accounts, &cur.accounts),
        Field::Qos => superset(entry, &base.qos, &cur.qos),
        Field::Associations => superset(entry, &base.associations, &cur.associations),
        Field::Tres => superset(entry, &base.tres, &cur.tres),
        Field::Clusters => superset(entry, &base.clusters, &cur.clusters),
        Field::JobCountWindow => no_decrease(entry, base.job_count_window, cur.job_count_window),
        Field::PerUserJobCounts => {
            no_decrease_per_key(entry, &base.per_user_job_counts, &cur.per_user_job_counts)
        }
        Field::PerAccountJobCounts => {
            no_decrease_per_key(entry, &base.per_account_job_counts, &cur.per_account_job_counts)
        }
        Field::PartitionNames => exact_names(
            entry,
            &baseline.configuration.partitions,
            &live.configuration.partitions,
        ),
        Field::PartitionAttributes => exact_attributes(
            entry,
            &baseline.configuration.partitions,
            &live.configuration.partitions,
        ),
        Field::NodeNames => exact_names(entry, &baseline.configuration.nodes, &live.configuration.nodes),
        Field::NodeAttributes => {
            exact_attributes(entry, &baseline.configuration.nodes, &live.configuration.nodes)
        }
        Field::TotalNodes => no_decrease(
            entry,
            baseline.system_state.total_nodes,
            live.system_state.total_nodes,
        ),
    };
    result
        .with_detail("rule", entry.rule.label())
        .with_detail("field", entry.path)
}

#[derive(Clone, Copy)]
enum OutcomeKind {
    Pass,
    Warn,
    Fail,
    Skip,
}

fn outcome(entry: &PolicyEntry, kind: OutcomeKind, message: String) -> TestResult {
    let category = Category::BaselineComparison;
    match kind {
        OutcomeKind::Pass => TestResult::pass(category, entry.label, message),
        OutcomeKind::Warn => TestResult::warn(category, entry.label, message),
        OutcomeKind::Fail => TestResult::fail(category, entry.label, message),
        OutcomeKind::Skip => TestResult::skip(category, entry.label, message),
    }
}

fn compare_version(entry: &PolicyEntry, baseline: &str, live: &str) -> TestResult {
    debug_assert_eq!(entry.rule, Rule::Version);
    let result = if baseline == live {
        outcome(
            entry,
            OutcomeKind::Warn,
            format!("no upgrade detected: still {live}"),
        )
    } else {
        outcome(
            entry,
            OutcomeKind::Pass,
            format!("upgraded from {baseline} to {live}"),
        )
    };
    result
        .with_detail("baseline", baseline)
        .with_detail("current", live)
}

fn superset(entry: &PolicyEntry, baseline: &[String], live: &[String]) -> TestResult {
    let n = match entry.key {
        KeySpec::LeadingFields(n) => n,
        KeySpec::None | KeySpec::MapKey => 1,
    };
    let base_keys = record_keys(baseline, n);
    let live_keys = record_keys(live, n);
    let missing: Vec<&String> = base_keys.difference(&live_keys).collect();
    let added = live_keys.difference(&base_keys).count();

    let result = if missing.is_empty() {
        outcome(
            entry,
            OutcomeKind::Pass,
            format!(
                "all {} baseline records present ({} current, {added} new)",
                base_keys.len(),
                live_keys.len()
            ),
        )
    } else {
        outcome(
            entry,
            OutcomeKind::Fail,
            format!(
                "{} baseline record(s) missing: {}",
                missing.len(),
                shown(missing.iter().map(|s| s.as_str()))
            ),
        )
        .with_detail("missing", json!(missing))
    };
    result
        .with_detail("baseline_count", base_keys.len())
        .with_detail("current_count", live_keys.len())
}

fn no_decrease(entry: &PolicyEntry, baseline: u64, live: u64) -> TestResult {
    let result = match live.cmp(&baseline) {
        std::cmp::Ordering::Less => outcome(
            entry,
            OutcomeKind::Fail,
            format!("decreased from {baseline} to {live}"),
        ),
        std::cmp::Ordering::Equal => {
            outcome(entry, OutcomeKind::Pass, format!("unchanged at {live}"))
        }
        std::cmp::Ordering::Greater => outcome(
            entry,
            OutcomeKind::Pass,
            format!("increased from {baseline} to {live}"),
        ),
    };
    result
        .with_detail("baseline", baseline)
        .with_detail("current", live)
}

fn no_decrease_per_key(
    entry: &PolicyEntry,
    baseline: &BTreeMap<String, u64>,
    live: &BTreeMap<String, u64>,
) -> TestResult {
    let decreased: Vec<String> = baseline
        .iter()
        .filter_map(|(key, &before)| {
            let after = live.get(key).copied().unwrap_or(0);
            (after < before).then(|| format!("{key}: {before} -> {after}"))
        })
        .collect();

    if decreased.is_empty() {
        outcome(
            entry,
            OutcomeKind::Pass,
            format!("no count decreased across {} key(s)", baseline.len()),
        )
    } else {
        outcome(
            entry,
            OutcomeKind::Fail,
            format!(
                "{} count(s) decreased: {}",
                decreased.len(),
                shown(decreased.iter().map(String::as_str))
            ),
        )
        .with_detail("decreased", decreased)
    }
}

fn exact_names(
    entry: &PolicyEntry,
    baseline: &BTreeMap<String, Attributes>,
    live: &BTreeMap<String, Attributes>,
) -> TestResult {
    let base: BTreeSet<&String> = baseline.keys().collect();
    let cur: BTreeSet<&String> = live.keys().collect();
    if base == cur {
        return outcome(
            entry,
            OutcomeKind::Pass,
            format!("{} name(s) identical", base.len()),
        );
    }
    let missing: Vec<&String> = base.difference(&cur).copied().collect();
    let added: Vec<&String> = cur.difference(&base).copied().collect();
    let mut parts = Vec::new();
    if !missing.is_empty() {
        parts.push(format!("missing {}", shown(missing.iter().map(|s| s.as_str()))));
    }
    if !added.is_empty() {
        parts.push(format!("added {}", shown(added.iter().map(|s| s.as_str()))));
    }
    outcome(entry, OutcomeKind::Fail, format!("names differ: {}", parts.join("; ")))
        .with_detail("missing", json!(missing))
        .with_detail("added", json!(added))
}

/// Attribute drift of entries present on both sides. Entries present on one
/// side only are reported by the corresponding names row.
///
/// Only keys recorded in the baseline are held to EXACT: a baseline key that
/// changed or vanished is drift. Keys that appear only on the live side (a newer
/// release reporting more attributes) are listed in `details` but never fail.
fn exact_attributes(
    entry: &PolicyEntry,
    baseline: &BTreeMap<String, Attributes>,
    live: &BTreeMap<String, Attributes>,
) -> TestResult {
    let mut changed = serde_json::Map::new();
    let mut added_keys = serde_json::Map::new();
    for (name, before) in baseline {
        let Some(after) = live.get(name) else {
            continue;
        };
        let drifted: Attributes = before
            .iter()
            .filter(|(key, value)| after.get(*key) != Some(*value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        if !drifted.is_empty() {
            let current: BTreeMap<&String, Option<&String>> =
                drifted.keys().map(|key| (key, after.get(key))).collect();
            changed.insert(name.clone(), json!({ "baseline": drifted, "current": current }));
        }
        let new_keys: Vec<&String> = after.keys().filter(|key| !before.contains_key(*key)).collect();
        if !new_keys.is_empty() {
            added_keys.insert(name.clone(), json!(new_keys));
        }
    }

    let result = if changed.is_empty() {
        let message = if added_keys.is_empty() {
            "attributes identical".to_string()
        } else {
            format!(
                "baseline attributes identical; {} entr(ies) report new attributes",
                added_keys.len()
            )
        };
        outcome(entry, OutcomeKind::Pass, message)
    } else {
        let names = changed.keys().map(String::as_str).collect::<Vec<_>>();
        let message = format!("{} entr(ies) changed: {}", names.len(), shown(names.into_iter()));
        outcome(entry, OutcomeKind::Fail, message).with_detail("changed", changed)
    };
    if added_keys.is_empty() {
        result
    } else {
        result.with_detail("added_keys", added_keys)
    }
}

fn shown<'a>(items: impl Iterator<Item = &'a str>) -> String {
    let items: Vec<&str> = items.collect();
    if items.len() > SHOWN {
        format!("{}, ... (+{} more)", items[..SHOWN].join(", "), items.len() - SHOWN)
    } else {
        items.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::snapshot::{Source, fixtures};
    use crate::checks::outcome::Status;

    fn by_name<'a>(results: &'a [TestResult], name: &str) -> &'a TestResult {
        results
            .iter()
            .find(|r| r.name() == name)
            .unwrap_or_else(|| panic!("no outcome named {name}"))
    }

    #[test]
    fn self_comparison_has_no_failures_and_one_warning() {
        let snap = fixtures::snapshot();
        let results = compare(&snap, &snap);
        assert_eq!(results.len(), POLICY.len());
        assert!(results.iter().all(|r| r.status() != Status::Fail));
        let warns: Vec<&TestResult> = results.iter().filter(|r| r.status() == Status::Warn).collect();
        assert_eq!(warns.len(), 1);
        assert_eq!(warns[0].name(), "Slurm Version");
        assert!(warns[0].message().contains("no upgrade detected"));
    }

    #[test]
    fn comparison_is_not_symmetric_for_lost_users() {
        let a = fixtures::snapshot();
        let mut b = fixtures::snapshot();
        b.accounting.users.retain(|u| u.starts_with("alice"));

        let forward = compare(&a, &b);
        let users = by_name(&forward, "Accounting: Users");
        assert_eq!(users.status(), Status::Fail);
        assert!(users.message().contains("bob"));
        assert_eq!(users.details()["missing"], json!(["bob"]));

        let backward = compare(&b, &a);
        assert_eq!(by_name(&backward, "Accounting: Users").status(), Status::Pass);
    }

    #[test]
    fn growth_passes_superset_and_no_decrease() {
        let mut baseline = fixtures::snapshot();
        baseline.accounting.users = vec!["alice".into(), "bob".into()];
        baseline.accounting.job_count_window = 100;
        let mut live = baseline.clone();
        live.accounting.users.push("carol".into());
        live.accounting.job_count_window = 150;

        let results = compare(&baseline, &live);
        assert_eq!(by_name(&results, "Accounting: Users").status(), Status::Pass);
        let jobs = by_name(&results, "Jobs: Window Count");
        assert_eq!(jobs.status(), Status::Pass);
        assert!(jobs.message().contains("increased from 100 to 150"));
    }

    #[test]
    fn accounting_rollback_fails_with_the_decrease() {
        let baseline = fixtures::snapshot();
        let mut live = baseline.clone();
        live.accounting.job_count_window = 40;

        let results = compare(&baseline, &live);
        let jobs = by_name(&results, "Jobs: Window Count");
        assert_eq!(jobs.status(), Status::Fail);
        assert!(jobs.message().contains("decreased from 100 to 40"));
        assert_eq!(jobs.details()["baseline"], 100);
        assert_eq!(jobs.details()["current"], 40);
    }

    #[test]
    fn per_user_counts_fail_when_a_user_disappears() {
        let baseline = fixtures::snapshot();
        let mut live = baseline.clone();
        live.accounting.per_user_job_counts.remove("bob");

        let results = compare(&baseline, &live);
        let per_user = by_name(&results, "Jobs: Per-User Counts");
        assert_eq!(per_user.status(), Status::Fail);
        assert!(per_user.message().contains("bob: 40 -> 0"));
    }

    #[test]
    fn attribute_added_by_an_upgrade_is_not_drift() {
        let baseline = fixtures::snapshot();
        let mut live = baseline.clone();
        live.platform_version = "slurm 23.11.4".into();
        live.configuration
            .partitions
            .get_mut("defq")
            .expect("defq")
            .insert("PowerDownOnIdle".into(), "NO".into());

        let results = compare(&baseline, &live);
        let attrs = by_name(&results, "Configuration: Partition Attributes");
        assert_eq!(attrs.status(), Status::Pass);
        assert_eq!(attrs.details()["added_keys"]["defq"], json!(["PowerDownOnIdle"]));
        assert!(results.iter().all(|r| r.status() == Status::Pass));
    }

    #[test]
    fn attribute_missing_after_upgrade_fails() {
        let baseline = fixtures::snapshot();
        let mut live = baseline.clone();
        live.configuration
            .partitions
            .get_mut("defq")
            .expect("defq")
            .remove("MaxTime");

        let results = compare(&baseline, &live);
        let attrs = by_name(&results, "Configuration: Partition Attributes");
        assert_eq!(attrs.status(), Status::Fail);
        assert_eq!(attrs.details()["changed"]["defq"]["baseline"]["MaxTime"], "UNLIMITED");
        assert!(attrs.details()["changed"]["defq"]["current"]["MaxTime"].is_null());
    }

    #[test]
    fn partition_changes_fail_exact() {
        let baseline = fixtures::snapshot();
        let mut live = baseline.clone();
        live.configuration
            .partitions
            .get_mut("defq")
            .expect("defq")
            .insert("MaxTime".into(), "1-00:00:00".into());
        live.configuration.partitions.insert("gpu".into(), Attributes::new());

        let results = compare(&baseline, &live);
        let names = by_name(&results, "Configuration: Partition Names");
        assert_eq!(names.status(), Status::Fail);
        assert_eq!(names.details()["added"], json!(["gpu"]));
        let attrs = by_name(&results, "Configuration: Partition Attributes");
        assert_eq!(attrs.status(), Status::Fail);
        assert_eq!(
            attrs.details()["changed"]["defq"]["current"]["MaxTime"],
            "1-00:00:00"
        );
    }

    #[test]
    fn association_key_ignores_non_identity_columns() {
        let baseline = fixtures::snapshot();
        let mut live = baseline.clone();
        live.accounting.associations = vec![
            "slurm|physics|alice||99".into(),
            "slurm|chem|bob||7".into(),
        ];
        let results = compare(&baseline, &live);
        assert_eq!(by_name(&results, "Accounting: Associations").status(), Status::Pass);
    }

    #[test]
    fn capture_errors_skip_or_fail_by_side() {
        let mut baseline = fixtures::snapshot();
        baseline
            .capture_errors
            .insert(Source::Qos.key().into(), "timed out".into());
        let mut live = fixtures::snapshot();
        live.capture_errors
            .insert(Source::Tres.key().into(), "sacctmgr: error".into());

        let results = compare(&baseline, &live);
        assert_eq!(by_name(&results, "Accounting: QOS").status(), Status::Skip);
        let tres = by_name(&results, "Accounting: TRES");
        assert_eq!(tres.status(), Status::Fail);
        assert!(tres.message().contains("unable to query current"));
    }

    #[test]
    fn node_states_are_not_compared() {
        let baseline = fixtures::snapshot();
        let mut live = baseline.clone();
        live.system_state.node_state_counts = [("down".to_string(), 2)].into_iter().collect();
        assert!(compare(&baseline, &live).iter().all(|r| r.status() != Status::Fail));
    }

    #[test]
    fn long_member_lists_are_truncated() {
        let names: Vec<String> = (0..15).map(|i| format!("u{i}")).collect();
        let text = shown(names.iter().map(String::as_str));
        assert!(text.ends_with("(+5 more)"));
    }
}
