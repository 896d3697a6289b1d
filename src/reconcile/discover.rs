//! Discovery of archives present on disk.

use std::fs;
use std::path::{Path, PathBuf};

use muninflux_types::{DataType, FieldKey, Group, MuninModel};
use tracing::{debug, warn};

use super::Layout;
use crate::{MigrationError, Result};

/// What the archive walk found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Group directories walked.
    pub groups: usize,

    /// Archives matched to a field already in the model.
    pub matched: usize,

    /// Fields added for archives the model lacked.
    pub synthesized: usize,

    /// Fields whose type was taken from the archive filename.
    pub types_inferred: usize,

    /// Archives with no model entry, left alone because insertion is off.
    pub orphans: Vec<PathBuf>,

    /// Entries that don't follow the archive naming convention.
    pub ignored: usize,
}

/// A decoded `<node>-<plugin>-<field>-<typecode>` archive name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveName {
    pub node: String,
    pub plugin: String,
    pub field: String,
    pub data_type: DataType,
}

/// Decode an archive file stem.
///
/// Node and plugin names may contain dashes, so names already known in
/// `group` are tried first, longest first. Unknown names split on the first
/// two dashes.
pub fn parse_archive_stem(stem: &str, group: Option<&Group>) -> Option<ArchiveName> {
    let (rest, typecode) = stem.rsplit_once('-')?;
    let mut chars = typecode.chars();
    let data_type = match (chars.next(), chars.next()) {
        (Some(c), None) => DataType::from_typecode(c)?,
        _ => return None,
    };

    if let Some(group) = group {
        if let Some(name) = match_known(rest, group, data_type) {
            return Some(name);
        }
    }

    let mut parts = rest.splitn(3, '-');
    let node = parts.next()?;
    let plugin = parts.next()?;
    let field = parts.next()?;
    if node.is_empty() || plugin.is_empty() || field.is_empty() {
        return None;
    }
    Some(ArchiveName {
        node: node.to_string(),
        plugin: plugin.to_string(),
        field: field.to_string(),
        data_type,
    })
}

fn match_known(rest: &str, group: &Group, data_type: DataType) -> Option<ArchiveName> {
    let mut nodes: Vec<_> = group.nodes.iter().collect();
    nodes.sort_by_key(|n| std::cmp::Reverse(n.name.len()));

    for node in nodes {
        let Some(after_node) = strip_segment(rest, &node.name) else {
            continue;
        };

        let mut plugins: Vec<_> = node.plugins.iter().collect();
        plugins.sort_by_key(|p| std::cmp::Reverse(p.name.len()));
        let known_plugin = plugins
            .into_iter()
            .find_map(|p| strip_segment(after_node, &p.name).map(|field| (p.name.as_str(), field)));

        let (plugin, field) = match known_plugin {
            Some(found) => found,
            None => after_node.split_once('-')?,
        };
        if plugin.is_empty() || field.is_empty() {
            return None;
        }
        return Some(ArchiveName {
            node: node.name.clone(),
            plugin: plugin.to_string(),
            field: field.to_string(),
            data_type,
        });
    }
    None
}

/// `"<prefix>-<rest>"` → `rest`
fn strip_segment<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    text.strip_prefix(prefix)?.strip_prefix('-')
}

/// Walk the archive root and fold what is found into the model.
///
/// Fields that exist get their archive path and existence flag set, and a
/// type inferred from the filename when none was declared. Archives without
/// a field are added when `insert_missing` is set and reported as orphans
/// otherwise.
pub fn discover_archives(
    model: &mut MuninModel,
    layout: &Layout,
    insert_missing: bool,
) -> Result<DiscoveryReport> {
    let root = layout.archive_root();
    let entries = fs::read_dir(root).map_err(|source| MigrationError::UnreadableRoot {
        path: root.to_path_buf(),
        source,
    })?;

    let mut group_dirs = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            group_dirs.push(path);
        }
    }
    group_dirs.sort();

    let mut report = DiscoveryReport::default();
    for dir in group_dirs {
        let Some(group) = dir.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            report.ignored += 1;
            continue;
        };
        report.groups += 1;
        scan_group(model, layout, &group, &dir, insert_missing, &mut report)?;
    }

    debug!(
        "Discovery: {} matched, {} added, {} orphans, {} ignored",
        report.matched,
        report.synthesized,
        report.orphans.len(),
        report.ignored
    );
    Ok(report)
}

fn scan_group(
    model: &mut MuninModel,
    layout: &Layout,
    group: &str,
    dir: &Path,
    insert_missing: bool,
    report: &mut DiscoveryReport,
) -> Result<()> {
    let mut files: Vec<PathBuf> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect(),
        Err(e) => {
            warn!("Skipping unreadable group directory {}: {}", dir.display(), e);
            return Ok(());
        }
    };
    files.sort();

    for path in files {
        if path.extension().and_then(|e| e.to_str()) != Some(layout.archive_extension()) {
            report.ignored += 1;
            continue;
        }
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|stem| parse_archive_stem(stem, model.group(group)));
        let Some(name) = name else {
            report.ignored += 1;
            continue;
        };

        let key = FieldKey::new(group, &name.node, &name.plugin, &name.field);
        if model.field(&key).is_some() {
            report.matched += 1;
        } else if insert_missing {
            debug!("Adding {} from {}", key, path.display());
            report.synthesized += 1;
        } else {
            report.orphans.push(path);
            continue;
        }

        let field = model.field_or_insert(&key);
        field.archive.exists = true;
        field.archive.inferred_type = Some(name.data_type);
        match field.settings.data_type() {
            None => {
                field.settings.insert("type", name.data_type.as_str());
                report.types_inferred += 1;
            }
            Some(declared) if declared != name.data_type => {
                warn!(
                    "{} is declared {} but its archive says {}",
                    key, declared, name.data_type
                );
            }
            Some(_) => {}
        }
        field.archive.path = Some(path);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn archive_tree(files: &[&str]) -> TempDir {
        let root = TempDir::new().unwrap();
        for rel in files {
            let path = root.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, b"RRD").unwrap();
        }
        root
    }

    #[test]
    fn stem_without_context() {
        let name = parse_archive_stem("host-plugin-field-d", None).unwrap();
        assert_eq!(name.node, "host");
        assert_eq!(name.plugin, "plugin");
        assert_eq!(name.field, "field");
        assert_eq!(name.data_type, DataType::Derive);

        assert!(parse_archive_stem("host-plugin-field-x", None).is_none());
        assert!(parse_archive_stem("host-plugin-d", None).is_none());
        assert!(parse_archive_stem("host-plugin-field-dd", None).is_none());
    }

    #[test]
    fn known_names_with_dashes() {
        let mut model = MuninModel::new();
        model.field_or_insert(&FieldKey::new("g", "web-01", "if_eth-0", "up"));

        let name = parse_archive_stem("web-01-if_eth-0-down-c", model.group("g")).unwrap();
        assert_eq!(name.node, "web-01");
        assert_eq!(name.plugin, "if_eth-0");
        assert_eq!(name.field, "down");

        // known node, new plugin
        let name = parse_archive_stem("web-01-load-load-g", model.group("g")).unwrap();
        assert_eq!(name.node, "web-01");
        assert_eq!(name.plugin, "load");
        assert_eq!(name.field, "load");
    }

    #[test]
    fn existing_field_gets_inferred_type() {
        let root = archive_tree(&["domain/host-plugin-field-d.rrd", "file1", "domain/notes.txt"]);
        let layout = Layout::new(root.path(), "/tmp/xml");

        let mut model = MuninModel::new();
        let key = FieldKey::new("domain", "host", "plugin", "field");
        model.field_or_insert(&key);

        let report = discover_archives(&mut model, &layout, false).unwrap();
        let field = model.field(&key).unwrap();

        assert!(field.archive.exists);
        assert_eq!(
            field.archive.path.as_deref(),
            Some(root.path().join("domain/host-plugin-field-d.rrd").as_path())
        );
        assert_eq!(field.settings.get("type"), Some("DERIVE"));
        assert_eq!(report.matched, 1);
        assert_eq!(report.types_inferred, 1);
        assert_eq!(report.ignored, 1);
    }

    #[test]
    fn declared_type_is_not_overwritten() {
        let root = archive_tree(&["g/n-cpu-user-d.rrd"]);
        let layout = Layout::new(root.path(), "/tmp/xml");

        let mut model = MuninModel::new();
        let key = FieldKey::new("g", "n", "cpu", "user");
        model.field_or_insert(&key).settings.insert("type", "COUNTER");

        let report = discover_archives(&mut model, &layout, true).unwrap();
        let field = model.field(&key).unwrap();
        assert_eq!(field.settings.get("type"), Some("COUNTER"));
        assert_eq!(report.types_inferred, 0);
    }

    #[test]
    fn missing_fields_inserted_or_orphaned() {
        let root = archive_tree(&["g/n-cpu-user-g.rrd", "g/n-cpu-system-g.rrd"]);
        let layout = Layout::new(root.path(), "/tmp/xml");

        let mut model = MuninModel::new();
        model.field_or_insert(&FieldKey::new("g", "n", "cpu", "user"));

        let mut strict = model.clone();
        let report = discover_archives(&mut strict, &layout, false).unwrap();
        assert_eq!(strict.field_count(), 1);
        assert_eq!(report.orphans.len(), 1);
        assert!(report.orphans[0].ends_with("n-cpu-system-g.rrd"));

        let report = discover_archives(&mut model, &layout, true).unwrap();
        assert_eq!(model.field_count(), 2);
        assert_eq!(report.synthesized, 1);
        assert!(report.orphans.is_empty());
        assert!(model
            .field(&FieldKey::new("g", "n", "cpu", "system"))
            .unwrap()
            .has_archive());
    }

    #[test]
    fn unreadable_root_is_fatal() {
        let root = TempDir::new().unwrap();
        let layout = Layout::new(root.path().join("missing"), "/tmp/xml");
        let result = discover_archives(&mut MuninModel::new(), &layout, true);
        assert!(matches!(result, Err(MigrationError::UnreadableRoot { .. })));
    }
}
