//! Concurrent dump and parse of every archive.
//!
//! Jobs run on a [`JoinSet`] bounded by a [`Semaphore`]. Each task owns its
//! field's result and hands it back when it finishes, so nothing is shared
//! between workers. A `watch` flag stops new jobs from starting; jobs already
//! running finish normally.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use muninflux_adapters::ArchiveDumper;
use muninflux_types::{FieldKey, MuninModel};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::document::ArchiveDocument;
use super::series::{consolidate, ConsolidatedSeries, ConsolidationPolicy};
use crate::MigrationError;

/// Position of a field's data source in its archive. Munin archives hold a
/// single data source.
pub const DEFAULT_DATA_SOURCE: usize = 0;

/// One archive to process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveJob {
    pub key: FieldKey,
    pub archive: PathBuf,
    pub document: PathBuf,
    pub data_source: usize,
}

impl ArchiveJob {
    /// A job for every field whose archive was found on disk.
    pub fn from_model(model: &MuninModel) -> Vec<ArchiveJob> {
        model
            .fields()
            .filter(|entry| entry.field.has_archive())
            .filter_map(|entry| {
                Some(ArchiveJob {
                    key: entry.key(),
                    archive: entry.field.archive.path.clone()?,
                    document: entry.field.document_path.clone()?,
                    data_source: DEFAULT_DATA_SOURCE,
                })
            })
            .collect()
    }
}

/// What a batch does with each archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Only produce the staged documents.
    Dump,
    /// Parse documents staged by an earlier run.
    Parse,
    /// Dump, then parse.
    DumpAndParse,
}

/// Result of one job.
#[derive(Debug)]
pub enum JobOutcome {
    Dumped,
    Consolidated(ConsolidatedSeries),
    Failed(MigrationError),
    /// Never started because the batch was cancelled.
    Cancelled,
}

#[derive(Debug)]
pub struct JobResult {
    pub key: FieldKey,
    pub outcome: JobOutcome,
}

/// Results of a batch, in job order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub results: Vec<JobResult>,
}

impl BatchReport {
    /// Fields that finished consolidating cleanly.
    pub fn consolidated(&self) -> impl Iterator<Item = (&FieldKey, &ConsolidatedSeries)> {
        self.results.iter().filter_map(|r| match &r.outcome {
            JobOutcome::Consolidated(series) => Some((&r.key, series)),
            _ => None,
        })
    }

    /// Consume the report, keeping only complete series.
    pub fn into_series(self) -> HashMap<FieldKey, ConsolidatedSeries> {
        self.results
            .into_iter()
            .filter_map(|r| match r.outcome {
                JobOutcome::Consolidated(series) => Some((r.key, series)),
                _ => None,
            })
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&FieldKey, &MigrationError)> {
        self.results.iter().filter_map(|r| match &r.outcome {
            JobOutcome::Failed(err) => Some((&r.key, err)),
            _ => None,
        })
    }

    pub fn dumped(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, JobOutcome::Dumped))
            .count()
    }

    pub fn cancelled(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, JobOutcome::Cancelled))
            .count()
    }

    /// Newest `lastupdate` across consolidated archives.
    pub fn lastupdate(&self) -> Option<i64> {
        self.consolidated().map(|(_, s)| s.lastupdate).max()
    }
}

/// Drives the dump collaborator and consolidates the resulting documents.
#[derive(Debug, Clone)]
pub struct ArchiveConsolidator {
    dumper: Arc<dyn ArchiveDumper>,
    policy: ConsolidationPolicy,
    workers: usize,
    keep_documents: bool,
}

impl ArchiveConsolidator {
    pub fn new(dumper: Arc<dyn ArchiveDumper>, policy: ConsolidationPolicy) -> Self {
        Self {
            dumper,
            policy,
            workers: 4,
            keep_documents: false,
        }
    }

    /// Maximum number of jobs in flight (at least one).
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Leave documents in the staging area after parsing them.
    pub fn keep_documents(mut self, keep: bool) -> Self {
        self.keep_documents = keep;
        self
    }

    /// Run every job to completion.
    pub async fn run(&self, jobs: Vec<ArchiveJob>, stage: Stage) -> BatchReport {
        let (_never, cancel) = watch::channel(false);
        self.run_until_cancelled(jobs, stage, cancel).await
    }

    /// Run jobs until `cancel` turns true. Jobs not yet started at that point
    /// are reported as [`JobOutcome::Cancelled`].
    pub async fn run_until_cancelled(
        &self,
        jobs: Vec<ArchiveJob>,
        stage: Stage,
        mut cancel: watch::Receiver<bool>,
    ) -> BatchReport {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();
        let mut in_flight = HashMap::new();
        let mut results: Vec<Option<JobResult>> = Vec::with_capacity(jobs.len());
        results.resize_with(jobs.len(), || None);
        let mut cancelled = false;

        for (index, job) in jobs.into_iter().enumerate() {
            let permit = if cancelled {
                None
            } else {
                acquire_or_cancel(&semaphore, &mut cancel).await
            };
            let Some(permit) = permit else {
                if !cancelled {
                    info!("Cancelled, abandoning unstarted archive jobs");
                    cancelled = true;
                }
                results[index] = Some(JobResult {
                    key: job.key,
                    outcome: JobOutcome::Cancelled,
                });
                continue;
            };

            let key = job.key.clone();
            let dumper = Arc::clone(&self.dumper);
            let policy = self.policy;
            let keep_documents = self.keep_documents;
            let handle = tasks.spawn(async move {
                let _permit = permit;
                let outcome =
                    process_job(&job, dumper.as_ref(), stage, &policy, keep_documents).await;
                (index, outcome)
            });
            in_flight.insert(handle.id(), (index, key));
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, (index, outcome))) => {
                    if let Some((_, key)) = in_flight.remove(&id) {
                        results[index] = Some(JobResult { key, outcome });
                    }
                }
                Err(err) => {
                    let Some((index, key)) = in_flight.remove(&err.id()) else {
                        continue;
                    };
                    error!("Archive job for {} did not finish: {}", key, err);
                    results[index] = Some(JobResult {
                        outcome: JobOutcome::Failed(MigrationError::ArchiveUnavailable {
                            field: key.to_string(),
                            reason: err.to_string(),
                        }),
                        key,
                    });
                }
            }
        }

        BatchReport {
            results: results.into_iter().flatten().collect(),
        }
    }
}

/// Wait for a worker slot, giving up as soon as `cancel` reads true.
async fn acquire_or_cancel(
    semaphore: &Arc<Semaphore>,
    cancel: &mut watch::Receiver<bool>,
) -> Option<OwnedSemaphorePermit> {
    loop {
        if *cancel.borrow_and_update() {
            return None;
        }
        tokio::select! {
            biased;
            changed = cancel.changed() => {
                if changed.is_err() {
                    // sender gone, the flag can no longer change
                    return Arc::clone(semaphore).acquire_owned().await.ok();
                }
            }
            permit = Arc::clone(semaphore).acquire_owned() => return permit.ok(),
        }
    }
}

async fn process_job(
    job: &ArchiveJob,
    dumper: &dyn ArchiveDumper,
    stage: Stage,
    policy: &ConsolidationPolicy,
    keep_documents: bool,
) -> JobOutcome {
    if stage != Stage::Parse {
        if let Err(err) = dumper.dump(&job.archive, &job.document).await {
            warn!("Could not dump {}: {}", job.key, err);
            return JobOutcome::Failed(MigrationError::ArchiveUnavailable {
                field: job.key.to_string(),
                reason: err.to_string(),
            });
        }
        if stage == Stage::Dump {
            return JobOutcome::Dumped;
        }
    }

    let outcome = match read_series(&job.key, &job.document, job.data_source, policy).await {
        Ok(series) => {
            debug!("Consolidated {} ({} samples)", job.key, series.len());
            JobOutcome::Consolidated(series)
        }
        Err(err) => {
            warn!("{}", err);
            JobOutcome::Failed(err)
        }
    };

    if !keep_documents {
        if let Err(err) = tokio::fs::remove_file(&job.document).await {
            debug!("Could not remove {}: {}", job.document.display(), err);
        }
    }
    outcome
}

/// Read and consolidate one staged document.
pub async fn read_series(
    key: &FieldKey,
    document: &Path,
    data_source: usize,
    policy: &ConsolidationPolicy,
) -> Result<ConsolidatedSeries, MigrationError> {
    let xml = tokio::fs::read_to_string(document)
        .await
        .map_err(|e| MigrationError::ArchiveUnavailable {
            field: key.to_string(),
            reason: format!("cannot read {}: {}", document.display(), e),
        })?;

    let malformed = |reason: String| MigrationError::DocumentMalformed {
        path: document.to_path_buf(),
        reason,
    };
    let doc = ArchiveDocument::parse(&xml).map_err(malformed)?;
    consolidate(&doc, data_source, policy).map_err(malformed)
}
