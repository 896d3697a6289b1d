//! Archive and staging filename conventions.

use std::path::{Path, PathBuf};

use muninflux_types::{FieldKey, MuninModel};

/// Where archives live and where their dumped documents are staged.
///
/// Archives: `<archive_root>/<group>/<node>-<plugin>-<field>-<typecode>.<ext>`.
/// Documents: `<staging_root>/<group>-<node>-<plugin>-<field>-<typecode>.<doc_ext>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    archive_root: PathBuf,
    staging_root: PathBuf,
    archive_extension: String,
    document_extension: String,
}

impl Layout {
    pub fn new(archive_root: impl Into<PathBuf>, staging_root: impl Into<PathBuf>) -> Self {
        Self {
            archive_root: archive_root.into(),
            staging_root: staging_root.into(),
            archive_extension: "rrd".to_string(),
            document_extension: "xml".to_string(),
        }
    }

    pub fn with_archive_extension(mut self, ext: impl Into<String>) -> Self {
        self.archive_extension = ext.into();
        self
    }

    pub fn with_document_extension(mut self, ext: impl Into<String>) -> Self {
        self.document_extension = ext.into();
        self
    }

    pub fn archive_root(&self) -> &Path {
        &self.archive_root
    }

    pub fn staging_root(&self) -> &Path {
        &self.staging_root
    }

    pub fn archive_extension(&self) -> &str {
        &self.archive_extension
    }

    pub fn document_extension(&self) -> &str {
        &self.document_extension
    }

    /// Expected archive path for a field.
    pub fn archive_path(&self, key: &FieldKey, typecode: char) -> PathBuf {
        self.archive_root.join(&key.group).join(format!(
            "{}.{}",
            archive_stem(key, typecode),
            self.archive_extension
        ))
    }

    /// Staging path for a field's dumped document.
    pub fn document_path(&self, key: &FieldKey, typecode: char) -> PathBuf {
        self.staging_root.join(format!(
            "{}-{}.{}",
            key.group,
            archive_stem(key, typecode),
            self.document_extension
        ))
    }
}

/// `<node>-<plugin>-<field>-<typecode>`
pub fn archive_stem(key: &FieldKey, typecode: char) -> String {
    format!("{}-{}-{}-{}", key.node, key.plugin, key.field, typecode)
}

/// Set the expected archive and document path on every field.
///
/// A typecode seen on disk by discovery wins over the declared type, so an
/// archive whose name disagrees with the configuration is still found.
/// Only the model is read, never the filesystem, so running this again on
/// an unchanged model yields the same paths.
pub fn derive_filenames(model: &mut MuninModel, layout: &Layout) {
    for entry in model.fields_mut() {
        let key = entry.key();
        let typecode = entry
            .field
            .archive
            .inferred_type
            .map(|t| t.typecode())
            .unwrap_or_else(|| entry.field.typecode());
        entry.field.archive.path = Some(layout.archive_path(&key, typecode));
        entry.field.document_path = Some(layout.document_path(&key, typecode));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_model() -> MuninModel {
        let mut model = MuninModel::new();
        model.field_or_insert(&FieldKey::new(
            "group3",
            "blackdragon.fritz.box",
            "homematic_radiator_kummer_temperature",
            "a",
        ));
        model
            .field_or_insert(&FieldKey::new(
                "group1",
                "top.level.domain",
                "apache_volume",
                "volume80",
            ))
            .settings
            .insert("type", "DERIVE");
        model
    }

    #[test]
    fn derived_paths_follow_convention() {
        let layout = Layout::new("/var/lib/munin", "/tmp/munin-influxdb/xml");
        let mut model = sample_model();
        derive_filenames(&mut model, &layout);

        let a = model
            .field(&FieldKey::new(
                "group3",
                "blackdragon.fritz.box",
                "homematic_radiator_kummer_temperature",
                "a",
            ))
            .unwrap();
        assert_eq!(
            a.archive.path.as_deref(),
            Some(Path::new(
                "/var/lib/munin/group3/blackdragon.fritz.box-homematic_radiator_kummer_temperature-a-g.rrd"
            ))
        );
        assert_eq!(
            a.document_path.as_deref(),
            Some(Path::new(
                "/tmp/munin-influxdb/xml/group3-blackdragon.fritz.box-homematic_radiator_kummer_temperature-a-g.xml"
            ))
        );

        let volume = model
            .field(&FieldKey::new(
                "group1",
                "top.level.domain",
                "apache_volume",
                "volume80",
            ))
            .unwrap();
        assert_eq!(
            volume.archive.path.as_deref(),
            Some(Path::new(
                "/var/lib/munin/group1/top.level.domain-apache_volume-volume80-d.rrd"
            ))
        );
    }

    #[test]
    fn archive_typecode_wins_over_declared_type() {
        let layout = Layout::new("/var/lib/munin", "/tmp/xml");
        let key = FieldKey::new("g", "n", "if_eth0", "down");
        let mut model = MuninModel::new();
        let field = model.field_or_insert(&key);
        field.settings.insert("type", "DERIVE");
        field.archive.inferred_type = Some(muninflux_types::DataType::Gauge);

        derive_filenames(&mut model, &layout);
        let field = model.field(&key).unwrap();
        assert_eq!(
            field.archive.path.as_deref(),
            Some(Path::new("/var/lib/munin/g/n-if_eth0-down-g.rrd"))
        );
        assert_eq!(
            field.document_path.as_deref(),
            Some(Path::new("/tmp/xml/g-n-if_eth0-down-g.xml"))
        );
    }

    #[test]
    fn derivation_is_idempotent() {
        let layout = Layout::new("/var/lib/munin", "/tmp/xml");
        let mut once = sample_model();
        derive_filenames(&mut once, &layout);

        let mut twice = once.clone();
        derive_filenames(&mut twice, &layout);

        assert_eq!(once, twice);
    }

    #[test]
    fn custom_extensions() {
        let layout = Layout::new("/data", "/stage")
            .with_archive_extension("rrd2")
            .with_document_extension("dump");
        let key = FieldKey::new("g", "n", "p", "f");

        assert_eq!(layout.archive_path(&key, 'c'), PathBuf::from("/data/g/n-p-f-c.rrd2"));
        assert_eq!(layout.document_path(&key, 'c'), PathBuf::from("/stage/g-n-p-f-c.dump"));
    }
}
