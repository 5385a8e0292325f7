//! Baseline snapshot document: model, digest, load/save.
//!
//! A snapshot is a self-describing value. Every mapping is a `BTreeMap` so the
//! serialized form, and the SHA-256 content digest over it, are deterministic.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::core::errors::{Result, ShcError};

/// Current document schema.
pub const SCHEMA_VERSION: u32 = 1;

/// Top-level fields a document must carry to be loadable.
pub const REQUIRED_FIELDS: [&str; 10] = [
    "schema_version",
    "captured_at",
    "source_host",
    "platform_version",
    "platform_tag",
    "job_window_days",
    "job_window_start",
    "accounting",
    "configuration",
    "system_state",
];

/// One capture query. Capture errors are keyed by [`Source::key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Source {
    Version,
    Users,
    Accounts,
    Qos,
    Associations,
    Tres,
    Clusters,
    Jobs,
    Partitions,
    Nodes,
}

impl Source {
    pub const ALL: [Self; 10] = [
        Self::Version,
        Self::Users,
        Self::Accounts,
        Self::Qos,
        Self::Associations,
        Self::Tres,
        Self::Clusters,
        Self::Jobs,
        Self::Partitions,
        Self::Nodes,
    ];

    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Version => "version",
            Self::Users => "users",
            Self::Accounts => "accounts",
            Self::Qos => "qos",
            Self::Associations => "associations",
            Self::Tres => "tres",
            Self::Clusters => "clusters",
            Self::Jobs => "jobs",
            Self::Partitions => "partitions",
            Self::Nodes => "nodes",
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Version => "Slurm Version",
            Self::Users => "Users",
            Self::Accounts => "Accounts",
            Self::Qos => "QOS",
            Self::Associations => "Associations",
            Self::Tres => "TRES",
            Self::Clusters => "Clusters",
            Self::Jobs => "Job Window",
            Self::Partitions => "Partitions",
            Self::Nodes => "Nodes",
        }
    }
}

/// Accounting entities as raw `|`-delimited records, plus job counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountingState {
    pub users: Vec<String>,
    pub accounts: Vec<String>,
    pub qos: Vec<String>,
    pub associations: Vec<String>,
    pub tres: Vec<String>,
    pub clusters: Vec<String>,
    pub job_count_window: u64,
    pub per_user_job_counts: BTreeMap<String, u64>,
    pub per_account_job_counts: BTreeMap<String, u64>,
}

pub type Attributes = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationState {
    pub partitions: BTreeMap<String, Attributes>,
    pub nodes: BTreeMap<String, Attributes>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemState {
    pub total_nodes: u64,
    pub node_state_counts: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineSnapshot {
    pub schema_version: u32,
    pub captured_at: DateTime<Utc>,
    pub source_host: String,
    /// `sinfo --version` output, e.g. `slurm 23.11.4`.
    pub platform_version: String,
    /// Cluster-manager platform tag (`bcm10`, `bcm11`, `unknown`).
    pub platform_tag: String,
    pub job_window_days: u32,
    pub job_window_start: DateTime<Utc>,
    pub accounting: AccountingState,
    pub configuration: ConfigurationState,
    pub system_state: SystemState,
    /// Source key → error text for every query that failed during capture.
    #[serde(default)]
    pub capture_errors: BTreeMap<String, String>,
    #[serde(default)]
    pub content_digest: String,
}

impl BaselineSnapshot {
    #[must_use]
    pub fn capture_error(&self, source: Source) -> Option<&str> {
        self.capture_errors.get(source.key()).map(String::as_str)
    }

    /// SHA-256 over the canonical JSON with the digest field cleared.
    pub fn compute_digest(&self) -> Result<String> {
        let mut unsealed = self.clone();
        unsealed.content_digest.clear();
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(&unsealed)?);
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Stamp the content digest.
    pub fn seal(mut self) -> Result<Self> {
        self.content_digest = self.compute_digest()?;
        Ok(self)
    }

    /// Parse and validate a document. `source_name` only labels errors.
    ///
    /// Missing required fields, an unsupported schema, and a digest that
    /// does not match the content are all rejected, never coerced. An empty
    /// digest is accepted so hand-assembled documents stay loadable.
    pub fn from_json_str(source_name: &str, text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| ShcError::malformed_baseline(source_name, format!("invalid JSON: {e}")))?;
        let Some(object) = value.as_object() else {
            return Err(ShcError::malformed_baseline(
                source_name,
                "top level is not a JSON object",
            ));
        };

        let missing: Vec<&str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|field| !object.contains_key(*field))
            .collect();
        if !missing.is_empty() {
            return Err(ShcError::malformed_baseline(
                source_name,
                format!("missing required fields: {}", missing.join(", ")),
            ));
        }

        match object.get("schema_version").and_then(Value::as_u64) {
            Some(v) if v == u64::from(SCHEMA_VERSION) => {}
            other => {
                return Err(ShcError::malformed_baseline(
                    source_name,
                    format!(
                        "unsupported schema_version {}; expected {SCHEMA_VERSION}",
                        other.map_or_else(|| "(not an integer)".to_string(), |v| v.to_string())
                    ),
                ));
            }
        }

        let snapshot: Self = serde_json::from_value(value)
            .map_err(|e| ShcError::malformed_baseline(source_name, e.to_string()))?;

        if !snapshot.content_digest.is_empty() {
            let actual = snapshot.compute_digest()?;
            if actual != snapshot.content_digest {
                return Err(ShcError::malformed_baseline(
                    source_name,
                    format!(
                        "content digest mismatch (recorded {}, computed {actual})",
                        snapshot.content_digest
                    ),
                ));
            }
        }
        Ok(snapshot)
    }

    /// Read a snapshot file. A missing file is `MissingBaseline`; anything
    /// unreadable or invalid is `MalformedBaseline`.
    pub fn load(path: &Path) -> Result<Self> {
        let source_name = path.display().to_string();
        let text = fs::read_to_string(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                ShcError::MissingBaseline {
                    path: path.to_path_buf(),
                }
            } else {
                ShcError::malformed_baseline(&source_name, format!("unreadable: {e}"))
            }
        })?;
        Self::from_json_str(&source_name, &text)
    }

    /// Write the snapshot as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ShcError::io(parent, e))?;
        }
        let mut body = serde_json::to_string_pretty(self)?;
        body.push('\n');
        fs::write(path, body).map_err(|e| ShcError::io(path, e))
    }
}

/// `slurm-baseline-YYYYmmdd-HHMMSS.json` for the given local time.
#[must_use]
pub fn default_file_name<Tz: chrono::TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("slurm-baseline-{}.json", at.format("%Y%m%d-%H%M%S"))
}
