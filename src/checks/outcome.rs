//! Classified outcome of one check or one comparison field.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fixed severity taxonomy for a single outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Pass,
    Warn,
    Fail,
    Skip,
}

impl Status {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Warn => "WARN",
            Self::Fail => "FAIL",
            Self::Skip => "SKIP",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Check categories, in the order the standard catalog declares them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Topology,
    System,
    Services,
    Nodes,
    Accounting,
    Configuration,
    Authentication,
    Logs,
    Pyxis,
    JobSubmission,
    BaselineCapture,
    BaselineComparison,
}

impl Category {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Topology => "Topology Discovery",
            Self::System => "System",
            Self::Services => "Services",
            Self::Nodes => "Nodes",
            Self::Accounting => "Accounting",
            Self::Configuration => "Configuration",
            Self::Authentication => "Authentication",
            Self::Logs => "Logs",
            Self::Pyxis => "Pyxis",
            Self::JobSubmission => "Job Submission",
            Self::BaselineCapture => "Baseline Capture",
            Self::BaselineComparison => "Baseline Comparison",
        }
    }

    /// Status assigned when a probe in this category hits its deadline.
    ///
    /// Services that must answer quickly fail; optional probes only warn.
    #[must_use]
    pub const fn timeout_status(self) -> Status {
        match self {
            Self::Logs | Self::Pyxis | Self::Topology => Status::Warn,
            _ => Status::Fail,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One classified outcome.
///
/// The status is fixed at construction; the builder methods only attach
/// details and timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    category: String,
    name: String,
    status: Status,
    message: String,
    #[serde(default)]
    details: BTreeMap<String, Value>,
    #[serde(rename = "duration_ms", with = "duration_ms", default)]
    duration: Duration,
}

impl TestResult {
    #[must_use]
    pub fn new(
        category: Category,
        name: impl Into<String>,
        status: Status,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category: category.label().to_string(),
            name: name.into(),
            status,
            message: message.into(),
            details: BTreeMap::new(),
            duration: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn pass(category: Category, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(category, name, Status::Pass, message)
    }

    #[must_use]
    pub fn warn(category: Category, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(category, name, Status::Warn, message)
    }

    #[must_use]
    pub fn fail(category: Category, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(category, name, Status::Fail, message)
    }

    #[must_use]
    pub fn skip(category: Category, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(category, name, Status::Skip, message)
    }

    /// Attach one detail value.
    #[must_use]
    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn status(&self) -> Status {
        self.status
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub const fn details(&self) -> &BTreeMap<String, Value> {
        &self.details
    }

    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
