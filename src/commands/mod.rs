//! The `dump`, `import` and `fetch` workflows behind the binary.
//!
//! Each workflow takes its collaborators as trait objects so the binary can
//! swap InfluxDB for a file during dry runs, and tests can use in-memory
//! fakes.

mod dump;
mod fetch;
mod import;

use muninflux_types::MuninModel;
use tracing::{info, warn};

pub use dump::{dump, DumpSummary};
pub use fetch::{fetch, FetchSummary};
pub use import::{import, ImportSummary};

use crate::model::{retrieve, ParseReport};
use crate::reconcile::{ReconcileSummary, Reconciler};
use crate::settings::MigrationSettings;
use crate::Result;

/// A model ready for consolidation: loaded, reconciled and verified.
#[derive(Debug)]
pub struct PreparedModel {
    pub model: MuninModel,

    /// Datafile parse report, absent in degraded mode.
    pub parse: Option<ParseReport>,

    pub reconcile: ReconcileSummary,
}

impl PreparedModel {
    /// True when the model was rebuilt without the configuration export.
    pub fn is_degraded(&self) -> bool {
        self.parse.is_none()
    }

    pub fn skipped_lines(&self) -> usize {
        self.parse.as_ref().map(|r| r.skipped.len()).unwrap_or(0)
    }
}

/// Load the model and reconcile it with the archive tree.
///
/// Without a usable datafile the archive tree is always walked and unknown
/// archives always become fields, since nothing else describes them.
pub fn prepare_model(settings: &MigrationSettings) -> Result<PreparedModel> {
    let loaded = retrieve(&settings.datafile(), &settings.paths.www);
    let degraded = loaded.datafile_error.is_some();

    for err in loaded.report.iter().flat_map(|r| r.skipped.iter()) {
        warn!("{}", err);
    }

    let discover = degraded || settings.discovery.always;
    let insert_missing = degraded || settings.discovery.insert_missing;

    let mut model = loaded.model;
    let reconcile = Reconciler::new(settings.layout())
        .insert_missing(insert_missing)
        .reconcile(&mut model, discover)?;

    info!(
        "{} archives found, {} missing",
        reconcile.found,
        reconcile.missing.len()
    );

    Ok(PreparedModel {
        model,
        parse: loaded.report,
        reconcile,
    })
}
