//! Layered configuration.
//!
//! Settings come from built-in defaults, then an optional TOML file, then
//! `MUNINFLUX_*` environment variables (`__` separates nested keys, e.g.
//! `MUNINFLUX_INFLUXDB__PASSWORD`). The binary applies CLI flags last.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::consolidate::{ConsolidationPolicy, RowCounting, TimestampAlignment};
use crate::naming::FieldGrouping;
use crate::reconcile::Layout;
use crate::Result;

/// Built-in defaults, in TOML so they read like a config file.
const DEFAULTS: &str = r#"
[paths]
munin = "/var/lib/munin"
www = "/var/cache/munin/www"
staging = "/tmp/munin-influxdb/xml"
mapping = "/etc/munin/fetch_config.json"
archive_extension = "rrd"
document_extension = "xml"

[influxdb]
endpoint = "http://localhost:8086"
user = "root"
password = "root"
database = "munin"
group_fields = true
timeout_secs = 30

[consolidation]
workers = 4
keep_average_only = true
keep_temp = false
timestamp_alignment = "last_update"
row_counting = "declared"

[discovery]
always = false
insert_missing = true
"#;

/// Complete configuration for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationSettings {
    pub paths: PathSettings,
    pub influxdb: InfluxSettings,
    pub consolidation: ConsolidationSettings,
    pub discovery: DiscoverySettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSettings {
    /// Munin's var folder; archives live in one subdirectory per group.
    pub munin: PathBuf,

    /// Configuration export. Defaults to `<munin>/datafile`.
    #[serde(default)]
    pub datafile: Option<PathBuf>,

    /// Cached dashboard, read when the datafile is unusable.
    pub www: PathBuf,

    /// Where dumped documents are staged.
    pub staging: PathBuf,

    /// Persisted metric mapping written by import and read by fetch.
    pub mapping: PathBuf,

    pub archive_extension: String,
    pub document_extension: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfluxSettings {
    pub endpoint: String,
    pub user: String,
    pub password: String,
    pub database: String,

    /// One measurement per plugin instead of one per field.
    pub group_fields: bool,

    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationSettings {
    /// Concurrent dump and parse jobs.
    pub workers: usize,

    /// Drop MIN/MAX/LAST shadow archives.
    pub keep_average_only: bool,

    /// Leave staged documents on disk after import.
    pub keep_temp: bool,

    pub timestamp_alignment: TimestampAlignment,
    pub row_counting: RowCounting,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoverySettings {
    /// Walk the archive root even when the datafile parsed fine.
    pub always: bool,

    /// Add fields for archives the model doesn't know about.
    pub insert_missing: bool,
}

impl MigrationSettings {
    /// Load settings, layering an optional TOML file and the environment
    /// over the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULTS, FileFormat::Toml));

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }

        let config = builder
            .add_source(
                Environment::with_prefix("MUNINFLUX")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Location of the configuration export.
    pub fn datafile(&self) -> PathBuf {
        self.paths
            .datafile
            .clone()
            .unwrap_or_else(|| self.paths.munin.join("datafile"))
    }

    /// Filesystem layout of archives and staged documents.
    pub fn layout(&self) -> Layout {
        Layout::new(&self.paths.munin, &self.paths.staging)
            .with_archive_extension(&self.paths.archive_extension)
            .with_document_extension(&self.paths.document_extension)
    }

    pub fn grouping(&self) -> FieldGrouping {
        if self.influxdb.group_fields {
            FieldGrouping::ByPlugin
        } else {
            FieldGrouping::PerField
        }
    }

    pub fn policy(&self) -> ConsolidationPolicy {
        ConsolidationPolicy {
            alignment: self.consolidation.timestamp_alignment,
            row_counting: self.consolidation.row_counting,
            keep_average_only: self.consolidation.keep_average_only,
        }
    }
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            paths: PathSettings {
                munin: PathBuf::from("/var/lib/munin"),
                datafile: None,
                www: PathBuf::from("/var/cache/munin/www"),
                staging: PathBuf::from("/tmp/munin-influxdb/xml"),
                mapping: PathBuf::from("/etc/munin/fetch_config.json"),
                archive_extension: "rrd".to_string(),
                document_extension: "xml".to_string(),
            },
            influxdb: InfluxSettings {
                endpoint: "http://localhost:8086".to_string(),
                user: "root".to_string(),
                password: "root".to_string(),
                database: "munin".to_string(),
                group_fields: true,
                timeout_secs: 30,
            },
            consolidation: ConsolidationSettings {
                workers: 4,
                keep_average_only: true,
                keep_temp: false,
                timestamp_alignment: TimestampAlignment::LastUpdate,
                row_counting: RowCounting::Declared,
            },
            discovery: DiscoverySettings {
                always: false,
                insert_missing: true,
            },
        }
    }
}
