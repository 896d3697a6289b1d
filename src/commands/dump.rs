use std::sync::Arc;

use muninflux_adapters::ArchiveDumper;
use tokio::sync::watch;
use tracing::{info, warn};

use super::prepare_model;
use crate::consolidate::{ArchiveConsolidator, ArchiveJob, Stage};
use crate::settings::MigrationSettings;
use crate::Result;

/// Counts reported by `muninflux dump`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DumpSummary {
    pub found: usize,
    pub missing: usize,
    pub orphans: usize,
    pub skipped_lines: usize,
    pub dumped: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// Stage a document for every archive on disk.
pub async fn dump(
    settings: &MigrationSettings,
    dumper: Arc<dyn ArchiveDumper>,
    cancel: watch::Receiver<bool>,
) -> Result<DumpSummary> {
    let prepared = prepare_model(settings)?;
    let jobs = ArchiveJob::from_model(&prepared.model);
    info!(
        "Dumping {} archives to {}",
        jobs.len(),
        settings.paths.staging.display()
    );

    let report = ArchiveConsolidator::new(dumper, settings.policy())
        .workers(settings.consolidation.workers)
        .run_until_cancelled(jobs, Stage::Dump, cancel)
        .await;

    let mut failed = 0;
    for (key, err) in report.failures() {
        warn!("{}: {}", key, err);
        failed += 1;
    }

    Ok(DumpSummary {
        found: prepared.reconcile.found,
        missing: prepared.reconcile.missing.len(),
        orphans: prepared.reconcile.orphans().len(),
        skipped_lines: prepared.skipped_lines(),
        dumped: report.dumped(),
        failed,
        cancelled: report.cancelled(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::fixtures::{installation, CopyDumper};
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    #[tokio::test]
    async fn stages_every_found_archive() {
        let dir = TempDir::new().unwrap();
        let settings = installation(dir.path());
        let dumper = Arc::new(CopyDumper::default());
        let (_tx, cancel) = watch::channel(false);

        let summary = dump(&settings, dumper.clone(), cancel).await.unwrap();

        assert_eq!(summary.found, 2);
        assert_eq!(summary.missing, 1);
        assert_eq!(summary.dumped, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(dumper.calls.load(Ordering::SeqCst), 2);
        assert!(settings
            .paths
            .staging
            .join("g1-web-cpu-user-d.xml")
            .is_file());
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let dir = TempDir::new().unwrap();
        let settings = installation(dir.path());
        let dumper = Arc::new(CopyDumper::default());
        let (tx, cancel) = watch::channel(false);
        tx.send(true).unwrap();

        let summary = dump(&settings, dumper.clone(), cancel).await.unwrap();

        assert_eq!(summary.dumped, 0);
        assert_eq!(summary.cancelled, 2);
        assert_eq!(dumper.calls.load(Ordering::SeqCst), 0);
    }
}
