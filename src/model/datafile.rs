//! Parser for the Munin master's configuration export.
//!
//! Each line reads `<group>;<node>:<plugin>[.<field>...].<attribute> <value>`.
//! The export also starts with a bare `version X.Y.Z` line.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use muninflux_types::{FieldKey, ModelSource, MuninModel, PluginKey};
use tracing::{debug, warn};

use crate::{MigrationError, Result};

/// Separator used to join nested multigraph segments into one field name.
///
/// Munin names the archive of a nested data source with dashes between the
/// segments, so this keeps derived filenames in line with what is on disk.
pub const NESTED_FIELD_SEPARATOR: &str = "-";

/// One attribute assignment decoded from an export line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub group: String,
    pub node: String,
    pub plugin: String,
    /// `None` for plugin-level attributes.
    pub field: Option<String>,
    pub name: String,
    pub value: String,
}

/// Counts gathered while building a model from an export.
#[derive(Debug, Default)]
pub struct ParseReport {
    /// Version announced by the export, if any.
    pub version: Option<String>,

    /// Attributes applied to the model.
    pub attributes: usize,

    /// Lines that could not be understood.
    pub skipped: Vec<MigrationError>,

    /// Pseudo-fields removed because they were nested graph headers.
    pub subgraphs_removed: usize,
}

/// Builds a [`MuninModel`] line by line.
#[derive(Debug, Default)]
pub struct ModelBuilder {
    model: MuninModel,
    report: ParseReport,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line. `line_no` is 1-based and only used for reporting.
    pub fn push_line(&mut self, line_no: usize, line: &str) {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return;
        }

        if let Some(version) = version_line(line) {
            debug!("Configuration export version {}", version);
            self.report.version = Some(version.to_string());
            return;
        }

        match parse_line(line) {
            Ok(attr) => self.apply(attr),
            Err(reason) => {
                warn!("Skipping configuration line {}: {}", line_no, reason);
                self.report.skipped.push(MigrationError::ConfigParse {
                    line: line_no,
                    reason,
                });
            }
        }
    }

    fn apply(&mut self, attr: Attribute) {
        let plugin = PluginKey::new(attr.group, attr.node, attr.plugin);
        match attr.field {
            Some(field) => {
                self.model
                    .field_or_insert(&plugin.field(field))
                    .settings
                    .insert(attr.name, attr.value);
            }
            None => {
                self.model
                    .plugin_or_insert(&plugin)
                    .settings
                    .insert(attr.name, attr.value);
            }
        }
        self.report.attributes += 1;
    }

    /// Finish building, dropping nested graph headers that were parsed as
    /// fields.
    pub fn finish(mut self) -> (MuninModel, ParseReport) {
        self.report.subgraphs_removed = remove_subgraph_headers(&mut self.model);
        self.model.source = ModelSource::Datafile;
        (self.model, self.report)
    }
}

/// Parse an export from any buffered reader.
///
/// Malformed lines are skipped and reported. Only failing to read the input
/// at all is an error.
pub fn parse_export<R: BufRead>(reader: R) -> Result<(MuninModel, ParseReport)> {
    let mut builder = ModelBuilder::new();
    for (index, line) in reader.lines().enumerate() {
        builder.push_line(index + 1, &line?);
    }
    Ok(builder.finish())
}

/// Parse the export at `path`.
pub fn load_datafile(path: &Path) -> Result<(MuninModel, ParseReport)> {
    let file = File::open(path).map_err(|e| MigrationError::file(path, e))?;
    let (model, report) = parse_export(BufReader::new(file))?;
    debug!(
        "Parsed {} attributes from {} ({} lines skipped)",
        report.attributes,
        path.display(),
        report.skipped.len()
    );
    Ok((model, report))
}

fn version_line(line: &str) -> Option<&str> {
    if line.contains(';') {
        return None;
    }
    line.strip_prefix("version ").map(str::trim)
}

/// Decode a single `<group>;<node>:<path> <value>` line.
pub fn parse_line(line: &str) -> std::result::Result<Attribute, String> {
    let (group, rest) = line
        .split_once(';')
        .ok_or_else(|| "missing ';' separator".to_string())?;
    let (node, rest) = rest
        .split_once(':')
        .ok_or_else(|| "missing ':' separator".to_string())?;

    let (path, value) = match rest.split_once(' ') {
        Some((path, value)) => (path, value.trim()),
        None => (rest, ""),
    };

    if group.is_empty() || node.is_empty() {
        return Err("empty group or node name".to_string());
    }

    let segments: Vec<&str> = path.split('.').collect();
    if segments.len() < 2 {
        return Err(format!("expected <plugin>.<attribute>, got '{}'", path));
    }
    if segments.iter().any(|s| s.is_empty()) {
        return Err(format!("empty segment in '{}'", path));
    }

    let last = segments.len() - 1;
    let field = match &segments[1..last] {
        [] => None,
        nested => Some(nested.join(NESTED_FIELD_SEPARATOR)),
    };

    Ok(Attribute {
        group: group.to_string(),
        node: node.to_string(),
        plugin: segments[0].to_string(),
        field,
        name: segments[last].to_string(),
        value: value.to_string(),
    })
}

/// Multigraph plugins declare nested graphs as `<plugin>.<graph>.graph_*`,
/// which parses as a field named `<graph>`. Such a field is only a header
/// when sibling fields named `<graph>-<field>` exist.
fn remove_subgraph_headers(model: &mut MuninModel) -> usize {
    let mut removed = 0;
    for group in &mut model.groups {
        for node in &mut group.nodes {
            for plugin in &mut node.plugins {
                let headers: Vec<String> = plugin
                    .fields
                    .iter()
                    .filter(|candidate| {
                        let prefix = format!("{}{}", candidate.name, NESTED_FIELD_SEPARATOR);
                        plugin.fields.iter().any(|f| f.name.starts_with(&prefix))
                    })
                    .map(|f| f.name.clone())
                    .collect();

                for name in headers {
                    debug!(
                        "Dropping nested graph header {}",
                        FieldKey::new(&group.name, &node.name, &plugin.name, &name)
                    );
                    plugin.fields.retain(|f| f.name != name);
                    removed += 1;
                }
            }
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::io::Cursor;

    const EXAMPLE_EXPORT: &str = "\
version 2.0.19-3
group1;top.level.domain:postgres_locks_dbname.accesssharelock.type GAUGE
group1;top.level.domain:postgres_connections_db.template1.graph_data_size normal
group1;top.level.domain:cpu.system.info CPU time spent by the kernel in system activities
group1;top.level.domain:cpu.irq.graph_data_size normal
group1;top.level.domain:apache_volume.volume80.label port 80
group1;top.level.domain:df.graph_vlabel %
group1;top.level.domain:df.graph_title Disk usage in percent
group1;top.level.domain:apache_volume.volume80.type DERIVE
group2;mailserver:memory.mapped.update_rate 300
group2;mailserver:postfix_mailstats.delivered.label No .label provided
group2;mailserver:postfix_mailstats.delivered.update_rate 300
group2;mailserver:postfix_mailstats.delivered.extinfo NOTE: The plugin did not provide any label for the data source delivered.  It is in need of fixing.
group2;mailserver:postfix_mailstats.delivered.graph_data_size normal
group3;blackdragon.fritz.box:homematic_radiator_kummer_temperature.graph_category homematic
group3;blackdragon.fritz.box:homematic_radiator_kummer_temperature.graph_title Heizung Kummer temp
group3;blackdragon.fritz.box:homematic_radiator_kummer_temperature.graph_vlabel temp
group3;blackdragon.fritz.box:homematic_radiator_kummer_temperature.graph_printf %3.0lf
group3;blackdragon.fritz.box:homematic_radiator_kummer_temperature.graph_args --base 1000 --lower-limit -10 --upper-limit 45
group3;blackdragon.fritz.box:homematic_radiator_kummer_temperature.a.value 10
";

    fn parse(text: &str) -> (MuninModel, ParseReport) {
        parse_export(Cursor::new(text)).unwrap()
    }

    #[test]
    fn example_export_structure() {
        let (model, report) = parse(EXAMPLE_EXPORT);

        let groups: Vec<&str> = model.groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(groups, vec!["group1", "group2", "group3"]);

        let plugins: BTreeSet<String> =
            model.plugins().map(|p| p.plugin.name.clone()).collect();
        let expected: BTreeSet<String> = [
            "postgres_locks_dbname",
            "cpu",
            "apache_volume",
            "postgres_connections_db",
            "homematic_radiator_kummer_temperature",
            "postfix_mailstats",
            "memory",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(plugins, expected);

        let nodes: BTreeSet<&str> = model.fields().map(|f| f.node).collect();
        assert_eq!(
            nodes,
            ["blackdragon.fritz.box", "mailserver", "top.level.domain"]
                .into_iter()
                .collect()
        );

        let fields: BTreeSet<&str> = model.fields().map(|f| f.field.name.as_str()).collect();
        assert_eq!(
            fields,
            [
                "a",
                "delivered",
                "template1",
                "irq",
                "system",
                "accesssharelock",
                "volume80",
                "mapped"
            ]
            .into_iter()
            .collect()
        );

        assert_eq!(report.version.as_deref(), Some("2.0.19-3"));
        assert!(report.skipped.is_empty());
        assert_eq!(report.attributes, 19);
    }

    #[test]
    fn attributes_land_on_the_right_level() {
        let (model, _) = parse(EXAMPLE_EXPORT);

        let volume = model
            .field(&FieldKey::new("group1", "top.level.domain", "apache_volume", "volume80"))
            .unwrap();
        assert_eq!(volume.settings.get("label"), Some("port 80"));
        assert_eq!(volume.settings.get("type"), Some("DERIVE"));

        let df = model
            .plugin(&PluginKey::new("group1", "top.level.domain", "df"))
            .unwrap();
        assert_eq!(df.settings.get("graph_title"), Some("Disk usage in percent"));
        assert!(df.fields.is_empty());

        let delivered = model
            .field(&FieldKey::new("group2", "mailserver", "postfix_mailstats", "delivered"))
            .unwrap();
        assert_eq!(delivered.settings.get("label"), Some("No .label provided"));
    }

    #[test]
    fn reparsing_attribute_lines_reaches_every_field() {
        let (model, _) = parse(EXAMPLE_EXPORT);
        for entry in model.fields() {
            for (name, value) in entry.field.settings.iter() {
                let line = format!(
                    "{};{}:{}.{}.{} {}",
                    entry.group, entry.node, entry.plugin.name, entry.field.name, name, value
                );
                let (reparsed, _) = parse(&line);
                assert!(reparsed.field(&entry.key()).is_some(), "{}", line);
            }
        }
    }

    #[test]
    fn malformed_lines_are_skipped_and_counted() {
        let text = "\
group1;web:cpu.user.label user
no separators at all
group1 web:cpu.user.type DERIVE
group1;web cpu.user.type DERIVE
group1;web:cpu GAUGE
group1;web:cpu..type GAUGE
group1;web:cpu.system.label system
";
        let (model, report) = parse(text);

        assert_eq!(model.field_count(), 2);
        assert_eq!(report.skipped.len(), 5);
        assert!(matches!(
            report.skipped[0],
            MigrationError::ConfigParse { line: 2, .. }
        ));
    }

    #[test]
    fn nested_segments_form_one_field() {
        let attr = parse_line("g;n:diskstats_iops.sda.rdio.label read").unwrap();
        assert_eq!(attr.plugin, "diskstats_iops");
        assert_eq!(attr.field.as_deref(), Some("sda-rdio"));
        assert_eq!(attr.name, "label");
        assert_eq!(attr.value, "read");
    }

    #[test]
    fn nested_graph_headers_are_removed() {
        let text = "\
g;n:diskstats_iops.sda.graph_title IOs for /dev/sda
g;n:diskstats_iops.sda.rdio.label read
g;n:diskstats_iops.sda.wrio.label write
g;n:diskstats_iops.sdb.graph_title IOs for /dev/sdb
";
        let (model, report) = parse(text);
        let names: Vec<&str> = model.fields().map(|f| f.field.name.as_str()).collect();

        assert_eq!(names, vec!["sda-rdio", "sda-wrio", "sdb"]);
        assert_eq!(report.subgraphs_removed, 1);
    }

    #[test]
    fn empty_value_is_allowed() {
        let attr = parse_line("g;n:cpu.user.info").unwrap();
        assert_eq!(attr.value, "");
    }
}
