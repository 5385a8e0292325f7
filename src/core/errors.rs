//! SHC-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, ShcError>;

/// Top-level error type for the healthcheck engine.
///
/// Only configuration-class variants may end a run before a summary is
/// produced; everything that happens inside a check is converted into an
/// outcome instead of surfacing here.
#[derive(Debug, Error)]
pub enum ShcError {
    #[error("[SHC-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[SHC-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[SHC-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[SHC-1004] invalid run mode: {details}")]
    InvalidRunMode { details: String },

    #[error("[SHC-1101] invalid check catalog: {details}")]
    InvalidCatalog { details: String },

    #[error("[SHC-1201] baseline file not found: {path}")]
    MissingBaseline { path: PathBuf },

    #[error("[SHC-1202] malformed baseline {source_name}: {details}")]
    MalformedBaseline {
        source_name: String,
        details: String,
    },

    #[error("[SHC-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[SHC-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[SHC-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl ShcError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "SHC-1001",
            Self::MissingConfig { .. } => "SHC-1002",
            Self::ConfigParse { .. } => "SHC-1003",
            Self::InvalidRunMode { .. } => "SHC-1004",
            Self::InvalidCatalog { .. } => "SHC-1101",
            Self::MissingBaseline { .. } => "SHC-1201",
            Self::MalformedBaseline { .. } => "SHC-1202",
            Self::Serialization { .. } => "SHC-2101",
            Self::Io { .. } => "SHC-3002",
            Self::Runtime { .. } => "SHC-3900",
        }
    }

    /// Errors that terminate a run before any check outcome is produced.
    ///
    /// The CLI maps these to exit code 2 with a `configuration error:` prefix
    /// so automation can tell them apart from a CRITICAL verdict.
    #[must_use]
    pub const fn is_config_class(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. }
                | Self::MissingConfig { .. }
                | Self::ConfigParse { .. }
                | Self::InvalidRunMode { .. }
                | Self::InvalidCatalog { .. }
                | Self::MissingBaseline { .. }
                | Self::MalformedBaseline { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for a rejected baseline document.
    #[must_use]
    pub fn malformed_baseline(source_name: impl Into<String>, details: impl Into<String>) -> Self {
        Self::MalformedBaseline {
            source_name: source_name.into(),
            details: details.into(),
        }
    }
}

impl From<serde_json::Error> for ShcError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for ShcError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
