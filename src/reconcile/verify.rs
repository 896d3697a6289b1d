//! On-disk verification of derived archive paths.

use std::fs;

use muninflux_types::{FieldKey, MuninModel};
use tracing::debug;

use super::Layout;
use crate::{MigrationError, Result};

/// Outcome of checking every field's archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub found: usize,
    pub missing: Vec<FieldKey>,
}

/// Check every field's archive path and record whether it exists.
///
/// Fields without a path get one derived from the layout. An unreadable
/// archive root is fatal; individual missing archives are only counted.
pub fn verify_archives(model: &mut MuninModel, layout: &Layout) -> Result<VerifyReport> {
    let root = layout.archive_root();
    fs::read_dir(root).map_err(|source| MigrationError::UnreadableRoot {
        path: root.to_path_buf(),
        source,
    })?;

    let mut report = VerifyReport::default();
    for entry in model.fields_mut() {
        let key = entry.key();
        let typecode = entry.field.typecode();
        let path = entry
            .field
            .archive
            .path
            .get_or_insert_with(|| layout.archive_path(&key, typecode))
            .clone();

        entry.field.archive.exists = path.is_file();
        if entry.field.archive.exists {
            report.found += 1;
        } else {
            debug!("No archive for {} at {}", key, path.display());
            report.missing.push(key);
        }
    }
    Ok(report)
}
