//! Building the Munin hierarchy.
//!
//! The configuration export is the primary source. When it can't be read,
//! the cached dashboard listing provides the structure without settings and
//! the resulting model is flagged as degraded.

mod datafile;
mod listing;

use std::path::Path;

use muninflux_types::MuninModel;
use tracing::{info, warn};

pub use datafile::{
    load_datafile, parse_export, parse_line, Attribute, ModelBuilder, ParseReport,
    NESTED_FIELD_SEPARATOR,
};
pub use listing::{load_listing, model_from_listing, scan_listing};

use crate::{MigrationError, Result};

/// A model together with how it was obtained.
#[derive(Debug)]
pub struct LoadedModel {
    pub model: MuninModel,

    /// Present when the export was parsed.
    pub report: Option<ParseReport>,

    /// Why the export could not be used, when the listing was read instead.
    pub datafile_error: Option<MigrationError>,
}

/// Load the model from `datafile`, falling back to the listing under `www`.
///
/// A datafile that can't be read, or that parses without yielding a single
/// field, counts as unusable. If neither source is usable an empty degraded
/// model is returned, so that discovery can still rebuild it from the
/// archive tree.
pub fn retrieve(datafile: &Path, www: &Path) -> LoadedModel {
    let err = match load_datafile(datafile).and_then(|loaded| usable(datafile, loaded)) {
        Ok((model, report)) => {
            info!(
                "Found {}: extracted {} fields",
                datafile.display(),
                model.field_count()
            );
            return LoadedModel {
                model,
                report: Some(report),
                datafile_error: None,
            };
        }
        Err(err) => err,
    };

    warn!(
        "Could not process datafile ({}), reading {} instead",
        err,
        www.display()
    );
    let model = load_listing(www).unwrap_or_else(|listing_err| {
        warn!("Cached listing unavailable: {}", listing_err);
        model_from_listing(Vec::new())
    });
    LoadedModel {
        model,
        report: None,
        datafile_error: Some(err),
    }
}

fn usable(
    datafile: &Path,
    (model, report): (MuninModel, ParseReport),
) -> Result<(MuninModel, ParseReport)> {
    if model.field_count() > 0 {
        return Ok((model, report));
    }
    let reason = if report.skipped.is_empty() {
        "no fields declared".to_string()
    } else {
        format!("no fields declared, {} lines malformed", report.skipped.len())
    };
    Err(MigrationError::DatafileUnusable {
        path: datafile.to_path_buf(),
        reason,
    })
}
