//! Comparison policy table: the contract for "no data loss".
//!
//! One row per compared field, in report order. Changing a rule here changes
//! what the tool promises operators, so the table is mirrored in DESIGN.md.

#![allow(missing_docs)]

use std::collections::BTreeSet;

use serde::Serialize;

use crate::baseline::snapshot::Source;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rule {
    /// Equal ⇒ WARN "no upgrade detected"; different ⇒ PASS.
    Version,
    /// Values must be identical.
    Exact,
    /// Current ≥ baseline (scalar, or per key for count maps).
    NoDecrease,
    /// Every baseline member must still be present.
    Superset,
}

impl Rule {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Version => "VERSION",
            Self::Exact => "EXACT",
            Self::NoDecrease => "NO_DECREASE",
            Self::Superset => "SUPERSET",
        }
    }
}

/// The compared fields of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Version,
    Users,
    Accounts,
    Qos,
    Associations,
    Tres,
    Clusters,
    JobCountWindow,
    PerUserJobCounts,
    PerAccountJobCounts,
    PartitionNames,
    PartitionAttributes,
    NodeNames,
    NodeAttributes,
    TotalNodes,
}

/// How records of a collection are identified for set comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySpec {
    /// Not a record collection.
    None,
    /// The first `n` `|`-delimited fields.
    LeadingFields(usize),
    /// Mapping key (name, user, account).
    MapKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyEntry {
    pub field: Field,
    /// Document path of the compared value.
    pub path: &'static str,
    /// Outcome name.
    pub label: &'static str,
    pub rule: Rule,
    pub key: KeySpec,
    /// Capture query the field depends on.
    pub source: Source,
}

const fn entry(
    field: Field,
    path: &'static str,
    label: &'static str,
    rule: Rule,
    key: KeySpec,
    source: Source,
) -> PolicyEntry {
    PolicyEntry {
        field,
        path,
        label,
        rule,
        key,
        source,
    }
}

#[rustfmt::skip]
pub static POLICY: [PolicyEntry; 15] = [
    entry(Field::Version, "platform_version", "Slurm Version", Rule::Version, KeySpec::None, Source::Version),
    entry(Field::Users, "accounting.users", "Accounting: Users", Rule::Superset, KeySpec::LeadingFields(1), Source::Users),
    entry(Field::Accounts, "accounting.accounts", "Accounting: Accounts", Rule::Superset, KeySpec::LeadingFields(1), Source::Accounts),
    entry(Field::Qos, "accounting.qos", "Accounting: QOS", Rule::Superset, KeySpec::LeadingFields(1), Source::Qos),
    entry(Field::Associations, "accounting.associations", "Accounting: Associations", Rule::Superset, KeySpec::LeadingFields(4), Source::Associations),
    entry(Field::Tres, "accounting.tres", "Accounting: TRES", Rule::Superset, KeySpec::LeadingFields(2), Source::Tres),
    entry(Field::Clusters, "accounting.clusters", "Accounting: Clusters", Rule::Superset, KeySpec::LeadingFields(1), Source::Clusters),
    entry(Field::JobCountWindow, "accounting.job_count_window", "Jobs: Window Count", Rule::NoDecrease, KeySpec::None, Source::Jobs),
    entry(Field::PerUserJobCounts, "accounting.per_user_job_counts", "Jobs: Per-User Counts", Rule::NoDecrease, KeySpec::MapKey, Source::Jobs),
    entry(Field::PerAccountJobCounts, "accounting.per_account_job_counts", "Jobs: Per-Account Counts", Rule::NoDecrease, KeySpec::MapKey, Source::Jobs),
    entry(Field::PartitionNames, "configuration.partitions", "Configuration: Partition Names", Rule::Exact, KeySpec::MapKey, Source::Partitions),
    entry(Field::PartitionAttributes, "configuration.partitions.*", "Configuration: Partition Attributes", Rule::Exact, KeySpec::MapKey, Source::Partitions),
    entry(Field::NodeNames, "configuration.nodes", "Configuration: Node Names", Rule::Exact, KeySpec::MapKey, Source::Nodes),
    entry(Field::NodeAttributes, "configuration.nodes.*", "Configuration: Node Attributes", Rule::Exact, KeySpec::MapKey, Source::Nodes),
    entry(Field::TotalNodes, "system_state.total_nodes", "System: Total Nodes", Rule::NoDecrease, KeySpec::None, Source::Nodes),
];

/// Policy row for `field`.
#[must_use]
pub fn rule_for(field: Field) -> Option<&'static PolicyEntry> {
    POLICY.iter().find(|entry| entry.field == field)
}

/// Identity of one raw record: its first `n` `|`-delimited fields.
#[must_use]
pub fn record_key(record: &str, n: usize) -> String {
    record
        .split('|')
        .take(n.max(1))
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("|")
}

/// Distinct record keys of a collection.
#[must_use]
pub fn record_keys(records: &[String], n: usize) -> BTreeSet<String> {
    records
        .iter()
        .map(|r| record_key(r, n))
        .filter(|k| !k.trim_matches('|').is_empty())
        .collect()
}
