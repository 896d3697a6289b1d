use muninflux_adapters::PointSink;
use tracing::{error, info, warn};

use crate::packager::{MetricMapping, MetricPackager, MetricSnapshot};
use crate::MigrationError;

/// Counts reported by `muninflux fetch`.
#[derive(Debug, Default)]
pub struct FetchSummary {
    /// State files parsed.
    pub parsed: usize,

    /// State files that could not be read, with the reason.
    pub unreadable: Vec<MigrationError>,

    /// State files that produced no point at all.
    pub empty: usize,

    pub points: usize,
    pub mapped: usize,
    pub retired: usize,

    /// `MappingMiss` warnings for recently updated unmapped metrics.
    pub warnings: Vec<MigrationError>,

    /// `Submission` errors, one per rejected state file.
    pub rejected: Vec<MigrationError>,
}

/// Send the latest live readings listed in `mapping` to `sink`.
///
/// Each state file is one batch. The mapping's watermark only moves forward
/// after a batch was accepted; the caller persists the mapping afterwards.
pub async fn fetch(mapping: &mut MetricMapping, sink: &dyn PointSink) -> FetchSummary {
    let mut summary = FetchSummary::default();
    let statefiles = mapping.statefiles.clone();

    for statefile in &statefiles {
        let snapshot = match MetricSnapshot::load(statefile) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                error!("Could not read state file {}: {}", statefile.display(), err);
                summary.unreadable.push(err);
                continue;
            }
        };
        info!("Parsed {}", statefile.display());
        summary.parsed += 1;

        let outcome = MetricPackager::new(mapping).pack(&snapshot);
        summary.mapped += outcome.mapped;
        summary.retired += outcome.retired;
        summary.warnings.extend(outcome.warnings);

        if outcome.points.is_empty() {
            warn!("No data found in {}, is Munin still running?", statefile.display());
            summary.empty += 1;
            continue;
        }

        match sink.submit(&outcome.points).await {
            Ok(()) => {
                mapping.advance_watermark(snapshot.epoch);
                summary.points += outcome.points.len();
                info!("Written {} new measurements", outcome.points.len());
            }
            Err(source) => {
                let err = MigrationError::Submission {
                    batch: statefile.display().to_string(),
                    source,
                };
                warn!("{}", err);
                summary.rejected.push(err);
            }
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::Path;

    use crate::naming::{FieldGrouping, SeriesTarget};
    use crate::packager::Connection;
    use muninflux_adapters::MemorySink;
    use muninflux_types::FieldKey;
    use tempfile::TempDir;

    fn mapping(root: &Path) -> MetricMapping {
        let mut metrics = BTreeMap::new();
        for field in ["user", "idle"] {
            metrics.insert(
                format!("/var/lib/munin/g1/web-cpu-{}-d.rrd", field),
                SeriesTarget::for_field(
                    &FieldKey::new("g1", "web", "cpu", field),
                    FieldGrouping::ByPlugin,
                ),
            );
        }
        MetricMapping {
            version: Default::default(),
            influxdb: Connection {
                endpoint: "http://localhost:8086".to_string(),
                user: "root".to_string(),
                password: "root".to_string(),
                database: "munin".to_string(),
            },
            grouping: FieldGrouping::ByPlugin,
            statefiles: vec![root.join("state-g1-web.json"), root.join("state-g1-db.json")],
            metrics,
            lastupdate: 1_448_000_000,
        }
    }

    const STATE: &str = r#"{
        "spoolfetch": 1449000300,
        "value": {
            "/var/lib/munin/g1/web-cpu-user-d.rrd:42": [["1449000000", "12.5"], ["1448999700", "11"]],
            "/var/lib/munin/g1/web-cpu-idle-d.rrd:42": [["1449000000", "U"], ["1448999700", "80"]]
        }
    }"#;

    #[tokio::test]
    async fn submits_and_advances_watermark() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("state-g1-web.json"), STATE).unwrap();
        let mut mapping = mapping(dir.path());
        let sink = MemorySink::new();

        let summary = fetch(&mut mapping, &sink).await;

        assert_eq!(summary.parsed, 1);
        // state-g1-db.json doesn't exist
        assert_eq!(summary.unreadable.len(), 1);
        assert_eq!(summary.points, 1);
        assert_eq!(mapping.lastupdate, 1_449_000_300);

        let points = sink.points();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].time, 1_449_000_000);
        assert_eq!(points[0].fields["user"], Some(12.5));
        assert_eq!(points[0].fields["idle"], None);
    }

    #[tokio::test]
    async fn rejected_batch_keeps_watermark() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("state-g1-web.json"), STATE).unwrap();
        let mut mapping = mapping(dir.path());
        let sink = MemorySink::rejecting("timeout");

        let summary = fetch(&mut mapping, &sink).await;

        assert_eq!(summary.rejected.len(), 1);
        assert_eq!(summary.points, 0);
        assert_eq!(mapping.lastupdate, 1_448_000_000);
    }

    #[tokio::test]
    async fn empty_snapshot_is_counted() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("state-g1-web.json"),
            r#"{"spoolfetch": 1449000300, "value": {}}"#,
        )
        .unwrap();
        fs::write(dir.path().join("state-g1-db.json"), "not json").unwrap();
        let mut mapping = mapping(dir.path());

        let summary = fetch(&mut mapping, &MemorySink::new()).await;

        assert_eq!(summary.empty, 1);
        assert_eq!(summary.unreadable.len(), 1);
        assert!(matches!(summary.unreadable[0], MigrationError::Json(_)));
        assert_eq!(mapping.lastupdate, 1_448_000_000);
    }
}
