//! Fallback model source: the cached dashboard.
//!
//! Munin renders one page per field at
//! `<www>/<group>/<node>/<plugin>/<field>.html`. Walking that tree recovers
//! the hierarchy, but none of the declared settings.

use std::fs;
use std::path::{Path, PathBuf};

use muninflux_types::{FieldKey, ModelSource, MuninModel};
use tracing::debug;

use crate::{MigrationError, Result};

/// Directories Munin puts next to the group folders.
const IGNORED_DIRS: &[&str] = &["static"];

/// Pages that are not field pages.
const IGNORED_PAGES: &[&str] = &[
    "index",
    "comparison-day",
    "comparison-week",
    "comparison-month",
    "comparison-year",
];

/// Collect every (group, node, plugin, field) tuple under `www`, sorted by
/// path so the listing is stable between runs.
pub fn scan_listing(www: &Path) -> Result<Vec<FieldKey>> {
    let mut keys = Vec::new();

    for group_dir in subdirs(www).map_err(|e| MigrationError::file(www, e))? {
        let Some(group) = dir_name(&group_dir) else {
            continue;
        };
        if IGNORED_DIRS.contains(&group.as_str()) {
            continue;
        }

        for node_dir in subdirs(&group_dir).map_err(|e| MigrationError::file(&group_dir, e))? {
            let Some(node) = dir_name(&node_dir) else {
                continue;
            };

            for plugin_dir in
                subdirs(&node_dir).map_err(|e| MigrationError::file(&node_dir, e))?
            {
                let Some(plugin) = dir_name(&plugin_dir) else {
                    continue;
                };

                for field in field_pages(&plugin_dir)
                    .map_err(|e| MigrationError::file(&plugin_dir, e))?
                {
                    keys.push(FieldKey::new(&group, &node, &plugin, field));
                }
            }
        }
    }

    debug!("Cached listing at {} has {} fields", www.display(), keys.len());
    Ok(keys)
}

/// Build a settings-less model from listing tuples.
pub fn model_from_listing<I>(keys: I) -> MuninModel
where
    I: IntoIterator<Item = FieldKey>,
{
    let mut model = MuninModel::new();
    for key in keys {
        model.field_or_insert(&key);
    }
    model.source = ModelSource::CachedListing;
    model
}

/// Scan `www` and build a degraded model from it.
pub fn load_listing(www: &Path) -> Result<MuninModel> {
    Ok(model_from_listing(scan_listing(www)?))
}

fn subdirs(path: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn field_pages(plugin_dir: &Path) -> std::io::Result<Vec<String>> {
    let mut fields = Vec::new();
    for entry in fs::read_dir(plugin_dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("html") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            if !IGNORED_PAGES.contains(&stem) {
                fields.push(stem.to_string());
            }
        }
    }
    fields.sort();
    Ok(fields)
}

fn dir_name(path: &Path) -> Option<String> {
    path.file_name()?.to_str().map(str::to_string)
}
