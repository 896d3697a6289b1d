//! Reconciling the model with the archive tree on disk.
//!
//! All sources feed the same [`MuninModel`], keyed by the
//! (group, node, plugin, field) quadruple:
//!
//! 1. optional discovery walks the archive root and folds what it finds in
//! 2. filename derivation sets the expected archive and document paths
//! 3. verification checks which archives exist

mod discover;
mod layout;
mod verify;

use std::path::PathBuf;

use muninflux_types::{FieldKey, MuninModel};
use tracing::info;

pub use discover::{discover_archives, parse_archive_stem, ArchiveName, DiscoveryReport};
pub use layout::{archive_stem, derive_filenames, Layout};
pub use verify::{verify_archives, VerifyReport};

use crate::Result;

/// Combined outcome of a reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Present when discovery ran.
    pub discovery: Option<DiscoveryReport>,
    pub found: usize,
    pub missing: Vec<FieldKey>,
}

impl ReconcileSummary {
    /// Archives on disk that no field claims.
    pub fn orphans(&self) -> &[PathBuf] {
        self.discovery
            .as_ref()
            .map(|d| d.orphans.as_slice())
            .unwrap_or_default()
    }
}

/// Runs discovery, derivation and verification over a model.
#[derive(Debug, Clone)]
pub struct Reconciler {
    layout: Layout,
    insert_missing: bool,
}

impl Reconciler {
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            insert_missing: true,
        }
    }

    /// Whether discovery may add fields for unknown archives.
    pub fn insert_missing(mut self, insert_missing: bool) -> Self {
        self.insert_missing = insert_missing;
        self
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Reconcile `model` with the archive tree, walking it first when
    /// `discover` is set.
    pub fn reconcile(&self, model: &mut MuninModel, discover: bool) -> Result<ReconcileSummary> {
        let discovery = if discover {
            Some(discover_archives(model, &self.layout, self.insert_missing)?)
        } else {
            None
        };

        derive_filenames(model, &self.layout);
        let verified = verify_archives(model, &self.layout)?;

        info!(
            "Found {} archives ({} missing)",
            verified.found,
            verified.missing.len()
        );

        Ok(ReconcileSummary {
            discovery,
            found: verified.found,
            missing: verified.missing,
        })
    }
}
