//! Error types for the migration pipeline.
//!
//! Per-line and per-field problems are recovered close to where they happen
//! and collected into the summary of the enclosing step. They still use these
//! variants so callers can log and count them uniformly.

use std::io;
use std::path::PathBuf;

use muninflux_adapters::AdapterError;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MigrationError>;

/// Errors raised while migrating Munin data.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A configuration export line could not be understood.
    #[error("Malformed configuration line {line}: {reason}")]
    ConfigParse { line: usize, reason: String },

    /// The configuration export was read but yielded no fields.
    #[error("Unusable datafile {}: {reason}", path.display())]
    DatafileUnusable { path: PathBuf, reason: String },

    /// The archive for a field is missing or could not be dumped.
    #[error("Archive unavailable for {field}: {reason}")]
    ArchiveUnavailable { field: String, reason: String },

    /// A dumped document lacks required structure.
    #[error("Malformed document {}: {reason}", path.display())]
    DocumentMalformed { path: PathBuf, reason: String },

    /// A live metric has no entry in the persisted mapping.
    #[error("Measurement not found for {metric} (updated {age_days} days ago)")]
    MappingMiss { metric: String, age_days: i64 },

    /// The destination refused a whole batch.
    #[error("Could not write batch {batch}: {source}")]
    Submission {
        batch: String,
        #[source]
        source: AdapterError,
    },

    /// The archive root could not be listed at all.
    #[error("Cannot read archive root {}: {source}", path.display())]
    UnreadableRoot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A file the pipeline depends on could not be read or written.
    #[error("Cannot access {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The persisted mapping is unusable.
    #[error("Invalid mapping: {0}")]
    Mapping(String),

    /// The batch was cancelled before this work started.
    #[error("Cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

impl MigrationError {
    /// Wrap an I/O error with the path it concerns.
    pub fn file(path: impl Into<PathBuf>, source: io::Error) -> Self {
        MigrationError::File {
            path: path.into(),
            source,
        }
    }

    /// True for errors that only affect a single line, field or metric.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MigrationError::ConfigParse { .. }
                | MigrationError::ArchiveUnavailable { .. }
                | MigrationError::DocumentMalformed { .. }
                | MigrationError::MappingMiss { .. }
        )
    }
}
