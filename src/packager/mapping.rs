//! The persisted metric mapping.
//!
//! Written once by import and read by every fetch run. It records where
//! each archive's series went, which live state files to read, and the
//! newest timestamp known to be in the destination.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use muninflux_types::{MappingVersion, MuninModel};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::naming::{FieldGrouping, SeriesTarget};
use crate::settings::InfluxSettings;
use crate::{MigrationError, Result};

/// Destination connection as recorded in the mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub endpoint: String,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl From<&InfluxSettings> for Connection {
    fn from(settings: &InfluxSettings) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            user: settings.user.clone(),
            password: settings.password.clone(),
            database: settings.database.clone(),
        }
    }
}

/// Canonical metric name → destination, plus what fetch needs to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricMapping {
    #[serde(default)]
    pub version: MappingVersion,

    pub influxdb: Connection,

    /// Grouping chosen at import time.
    #[serde(default)]
    pub grouping: FieldGrouping,

    /// Live state files, one per node.
    #[serde(default)]
    pub statefiles: Vec<PathBuf>,

    /// Keyed by archive path.
    #[serde(default)]
    pub metrics: BTreeMap<String, SeriesTarget>,

    /// Newest timestamp written to the destination.
    #[serde(default)]
    pub lastupdate: i64,
}

impl MetricMapping {
    /// Build the mapping for every field that has an archive path.
    pub fn from_model(
        model: &MuninModel,
        grouping: FieldGrouping,
        munin_root: &Path,
        influxdb: Connection,
    ) -> Self {
        let mut metrics = BTreeMap::new();
        let mut statefiles = Vec::new();

        for entry in model.fields() {
            let Some(path) = &entry.field.archive.path else {
                continue;
            };
            metrics.insert(
                canonical_key(path),
                SeriesTarget::for_field(&entry.key(), grouping),
            );

            let statefile = state_file(munin_root, entry.group, entry.node);
            if !statefiles.contains(&statefile) {
                statefiles.push(statefile);
            }
        }

        Self {
            version: MappingVersion::current(),
            influxdb,
            grouping,
            statefiles,
            metrics,
            lastupdate: 0,
        }
    }

    /// Load a mapping, refusing one written by an incompatible release.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| MigrationError::file(path, e))?;
        let mapping: Self = serde_json::from_str(&text)?;
        if !mapping.version.is_compatible() {
            return Err(MigrationError::Mapping(format!(
                "{} has version {}.{}, expected {}.x",
                path.display(),
                mapping.version.major,
                mapping.version.minor,
                MappingVersion::current().major
            )));
        }
        debug!(
            "Loaded mapping {} ({} metrics)",
            path.display(),
            mapping.metrics.len()
        );
        Ok(mapping)
    }

    /// Write the mapping, replacing the previous file in one step.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| MigrationError::file(parent, e))?;
        }
        let text = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, text).map_err(|e| MigrationError::file(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| MigrationError::file(path, e))?;
        Ok(())
    }

    pub fn resolve(&self, canonical: &str) -> Option<&SeriesTarget> {
        self.metrics.get(canonical)
    }

    /// Move the watermark forward; it never moves back.
    pub fn advance_watermark(&mut self, epoch: i64) {
        self.lastupdate = self.lastupdate.max(epoch);
    }
}

/// The key live state uses for an archive, minus the data source suffix.
pub fn canonical_key(archive: &Path) -> String {
    archive.to_string_lossy().into_owned()
}

/// `<munin>/state-<group>-<node>.json`
pub fn state_file(munin_root: &Path, group: &str, node: &str) -> PathBuf {
    munin_root.join(format!("state-{}-{}.json", group, node))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::{derive_filenames, Layout};
    use muninflux_types::FieldKey;
    use tempfile::TempDir;

    fn connection() -> Connection {
        Connection {
            endpoint: "http://localhost:8086".to_string(),
            user: "root".to_string(),
            password: "secret".to_string(),
            database: "munin".to_string(),
        }
    }

    fn mapped_model() -> MuninModel {
        let mut model = MuninModel::new();
        model.field_or_insert(&FieldKey::new("g1", "web", "cpu", "user"));
        model.field_or_insert(&FieldKey::new("g1", "web", "cpu", "idle"));
        model.field_or_insert(&FieldKey::new("g2", "mail", "memory", "mapped"));
        derive_filenames(&mut model, &Layout::new("/var/lib/munin", "/tmp/xml"));
        model
    }

    #[test]
    fn built_from_model() {
        let mapping = MetricMapping::from_model(
            &mapped_model(),
            FieldGrouping::ByPlugin,
            Path::new("/var/lib/munin"),
            connection(),
        );

        assert_eq!(mapping.metrics.len(), 3);
        let target = mapping
            .resolve("/var/lib/munin/g1/web-cpu-idle-g.rrd")
            .unwrap();
        assert_eq!(target.measurement, "cpu");
        assert_eq!(target.field, "idle");
        assert_eq!(
            mapping.statefiles,
            vec![
                PathBuf::from("/var/lib/munin/state-g1-web.json"),
                PathBuf::from("/var/lib/munin/state-g2-mail.json"),
            ]
        );
    }

    #[test]
    fn save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("munin/fetch_config.json");

        let mut mapping = MetricMapping::from_model(
            &mapped_model(),
            FieldGrouping::PerField,
            Path::new("/var/lib/munin"),
            connection(),
        );
        mapping.advance_watermark(1_449_000_000);
        mapping.save(&path).unwrap();

        let loaded = MetricMapping::load(&path).unwrap();
        assert_eq!(loaded, mapping);
        assert_eq!(loaded.grouping, FieldGrouping::PerField);
    }

    #[test]
    fn watermark_is_monotonic() {
        let mut mapping = MetricMapping::from_model(
            &MuninModel::new(),
            FieldGrouping::ByPlugin,
            Path::new("/var/lib/munin"),
            connection(),
        );
        mapping.advance_watermark(200);
        mapping.advance_watermark(100);
        assert_eq!(mapping.lastupdate, 200);
    }

    #[test]
    fn incompatible_version_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fetch_config.json");
        fs::write(
            &path,
            r#"{"version": {"major": 99, "minor": 0},
                "influxdb": {"endpoint": "http://db:8086", "user": "u", "password": "p", "database": "d"}}"#,
        )
        .unwrap();

        let err = MetricMapping::load(&path).unwrap_err();
        assert!(matches!(err, MigrationError::Mapping(_)));
    }

    #[test]
    fn minimal_document_gets_defaults() {
        let mapping: MetricMapping = serde_json::from_str(
            r#"{"influxdb": {"endpoint": "http://db:8086", "user": "u", "password": "p", "database": "d"}}"#,
        )
        .unwrap();
        assert!(mapping.version.is_compatible());
        assert!(mapping.metrics.is_empty());
        assert_eq!(mapping.lastupdate, 0);
    }
}
