use std::path::PathBuf;
use std::sync::Arc;

use muninflux_adapters::{ArchiveDumper, PointSink};
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::prepare_model;
use crate::consolidate::{series_points, ArchiveConsolidator, ArchiveJob, Stage};
use crate::packager::{Connection, MetricMapping};
use crate::settings::MigrationSettings;
use crate::{MigrationError, Result};

/// Counts reported by `muninflux import`.
#[derive(Debug, Default)]
pub struct ImportSummary {
    pub found: usize,
    pub missing: usize,
    pub orphans: usize,
    pub skipped_lines: usize,

    /// Fields whose full history was rebuilt.
    pub consolidated: usize,
    pub failed: usize,
    pub cancelled: usize,

    /// Plugin batches accepted by the sink.
    pub batches: usize,
    pub points: usize,

    /// `Submission` errors, one per rejected plugin batch.
    pub rejected: Vec<MigrationError>,

    /// Where the mapping was written. `None` when the run was cancelled.
    pub mapping: Option<PathBuf>,

    /// Watermark recorded in the mapping. `None` when nothing was accepted
    /// or any batch was rejected.
    pub lastupdate: Option<i64>,
}

impl ImportSummary {
    /// True when every batch reached the sink.
    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty() && self.cancelled == 0
    }
}

/// Rebuild every field's history, submit it plugin by plugin and write the
/// mapping used by later fetches.
///
/// `stage` is [`Stage::DumpAndParse`] normally, or [`Stage::Parse`] to reuse
/// documents staged by an earlier `dump`.
///
/// Rejected batches are returned in [`ImportSummary::rejected`]. The mapping
/// is still written, but its watermark only moves when every batch was
/// accepted, so a later fetch never skips data that didn't arrive.
pub async fn import(
    settings: &MigrationSettings,
    dumper: Arc<dyn ArchiveDumper>,
    sink: &dyn PointSink,
    stage: Stage,
    cancel: watch::Receiver<bool>,
) -> Result<ImportSummary> {
    let prepared = prepare_model(settings)?;
    let model = &prepared.model;
    let grouping = settings.grouping();

    let jobs = ArchiveJob::from_model(model);
    info!("Consolidating {} archives", jobs.len());
    let report = ArchiveConsolidator::new(dumper, settings.policy())
        .workers(settings.consolidation.workers)
        .keep_documents(settings.consolidation.keep_temp)
        .run_until_cancelled(jobs, stage, cancel)
        .await;

    let mut summary = ImportSummary {
        found: prepared.reconcile.found,
        missing: prepared.reconcile.missing.len(),
        orphans: prepared.reconcile.orphans().len(),
        skipped_lines: prepared.skipped_lines(),
        failed: report.failures().count(),
        cancelled: report.cancelled(),
        ..Default::default()
    };
    let series = report.into_series();
    summary.consolidated = series.len();

    info!("Writing to {}", sink.description());
    let mut submitted: Option<i64> = None;
    for plugin in model.plugins() {
        let plugin_key = plugin.key();
        let keys: Vec<_> = plugin
            .plugin
            .fields
            .iter()
            .map(|f| plugin_key.field(&f.name))
            .collect();
        let plugin_series: Vec<_> = keys
            .iter()
            .filter_map(|key| series.get(key).map(|s| (key, s)))
            .collect();
        let points = series_points(plugin_series.iter().copied(), grouping);
        if points.is_empty() {
            continue;
        }

        match sink.submit(&points).await {
            Ok(()) => {
                summary.batches += 1;
                summary.points += points.len();
                let newest = plugin_series.iter().map(|(_, s)| s.lastupdate).max();
                submitted = submitted.max(newest);
            }
            Err(source) => {
                let err = MigrationError::Submission {
                    batch: plugin_key.to_string(),
                    source,
                };
                error!("{}", err);
                summary.rejected.push(err);
            }
        }
    }

    if summary.cancelled > 0 {
        warn!(
            "Import cancelled with {} archives unprocessed, mapping not written",
            summary.cancelled
        );
        return Ok(summary);
    }

    let mut mapping = MetricMapping::from_model(
        model,
        grouping,
        &settings.paths.munin,
        Connection::from(&settings.influxdb),
    );
    if summary.rejected.is_empty() {
        if let Some(lastupdate) = submitted {
            mapping.advance_watermark(lastupdate);
            summary.lastupdate = Some(lastupdate);
        }
    } else {
        warn!(
            "{} batches rejected, mapping watermark left at {}",
            summary.rejected.len(),
            mapping.lastupdate
        );
    }
    mapping.save(&settings.paths.mapping)?;
    info!(
        "Mapping for {} metrics written to {}",
        mapping.metrics.len(),
        settings.paths.mapping.display()
    );
    summary.mapping = Some(settings.paths.mapping.clone());

    Ok(summary)
}
