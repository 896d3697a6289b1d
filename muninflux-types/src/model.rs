//! The Group → Node → Plugin → Field hierarchy of a Munin installation.

use std::fmt;
use std::path::PathBuf;

use crate::{DataType, Settings};

/// Where the structure of a [`MuninModel`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ModelSource {
    /// Parsed from the master's configuration export, settings included.
    #[default]
    Datafile,
    /// Rebuilt from the cached dashboard listing. No settings are known, so
    /// consumers are running in degraded mode.
    CachedListing,
}

/// Full identity of a field: the (group, node, plugin, field) quadruple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldKey {
    pub group: String,
    pub node: String,
    pub plugin: String,
    pub field: String,
}

impl FieldKey {
    pub fn new(
        group: impl Into<String>,
        node: impl Into<String>,
        plugin: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            node: node.into(),
            plugin: plugin.into(),
            field: field.into(),
        }
    }

    /// Identity of the plugin owning this field.
    pub fn plugin_key(&self) -> PluginKey {
        PluginKey::new(&self.group, &self.node, &self.plugin)
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{}:{}.{}", self.group, self.node, self.plugin, self.field)
    }
}

/// Identity of a plugin: the (group, node, plugin) triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PluginKey {
    pub group: String,
    pub node: String,
    pub plugin: String,
}

impl PluginKey {
    pub fn new(
        group: impl Into<String>,
        node: impl Into<String>,
        plugin: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            node: node.into(),
            plugin: plugin.into(),
        }
    }

    /// Identity of one of this plugin's fields.
    pub fn field(&self, field: impl Into<String>) -> FieldKey {
        FieldKey::new(&self.group, &self.node, &self.plugin, field)
    }
}

impl fmt::Display for PluginKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{}:{}", self.group, self.node, self.plugin)
    }
}

/// Physical archive backing a field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ArchiveRef {
    /// Expected location of the archive on disk.
    pub path: Option<PathBuf>,

    /// Whether the archive was seen on disk.
    pub exists: bool,

    /// Type decoded from the archive filename, when discovery found one.
    pub inferred_type: Option<DataType>,
}

/// One measurable series.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Field {
    pub name: String,
    pub settings: Settings,
    pub archive: ArchiveRef,

    /// Where the dumped archive document is staged.
    pub document_path: Option<PathBuf>,
}

impl Field {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Declared type, falling back to the type inferred from the archive.
    pub fn data_type(&self) -> Option<DataType> {
        self.settings.data_type().or(self.archive.inferred_type)
    }

    /// Typecode used in this field's archive filename.
    pub fn typecode(&self) -> char {
        self.data_type()
            .map(|t| t.typecode())
            .unwrap_or(crate::DEFAULT_TYPECODE)
    }

    /// Check whether an archive was found on disk for this field.
    pub fn has_archive(&self) -> bool {
        self.archive.exists && self.archive.path.is_some()
    }
}

/// A logical metric source on a node.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Plugin {
    pub name: String,

    /// Plugin-level attributes (graph title, category, ...).
    pub settings: Settings,

    /// Fields in discovery order.
    pub fields: Vec<Field>,
}

impl Plugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.iter_mut().find(|f| f.name == name)
    }

    /// Get a field, appending it if it doesn't exist yet.
    pub fn field_or_insert(&mut self, name: &str) -> &mut Field {
        find_or_push(&mut self.fields, name, |f| &f.name, || Field::new(name))
    }
}

/// A monitored host.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Node {
    pub name: String,
    pub plugins: Vec<Plugin>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            plugins: Vec::new(),
        }
    }

    pub fn plugin(&self, name: &str) -> Option<&Plugin> {
        self.plugins.iter().find(|p| p.name == name)
    }

    pub fn plugin_or_insert(&mut self, name: &str) -> &mut Plugin {
        find_or_push(&mut self.plugins, name, |p| &p.name, || Plugin::new(name))
    }
}

/// Top-level namespace grouping nodes.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Group {
    pub name: String,
    pub nodes: Vec<Node>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
        }
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn node_or_insert(&mut self, name: &str) -> &mut Node {
        find_or_push(&mut self.nodes, name, |n| &n.name, || Node::new(name))
    }
}

/// Borrowed view of a plugin together with its parents' names.
#[derive(Debug, Clone, Copy)]
pub struct PluginRef<'a> {
    pub group: &'a str,
    pub node: &'a str,
    pub plugin: &'a Plugin,
}

impl PluginRef<'_> {
    pub fn key(&self) -> PluginKey {
        PluginKey::new(self.group, self.node, &self.plugin.name)
    }
}

/// Borrowed view of a field together with its parents.
#[derive(Debug, Clone, Copy)]
pub struct FieldRef<'a> {
    pub group: &'a str,
    pub node: &'a str,
    pub plugin: &'a Plugin,
    pub field: &'a Field,
}

impl FieldRef<'_> {
    pub fn key(&self) -> FieldKey {
        FieldKey::new(self.group, self.node, &self.plugin.name, &self.field.name)
    }
}

/// Mutable access to a field, with its parents' names.
#[derive(Debug)]
pub struct FieldMut<'a> {
    pub group: &'a str,
    pub node: &'a str,
    pub plugin: &'a str,
    pub field: &'a mut Field,
}

impl FieldMut<'_> {
    pub fn key(&self) -> FieldKey {
        FieldKey::new(self.group, self.node, self.plugin, &self.field.name)
    }
}

/// The reconstructed configuration of a Munin master.
///
/// Every level owns its children and keeps them in discovery order, so
/// traversal yields entries in the order they were first seen.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MuninModel {
    pub groups: Vec<Group>,
    pub source: ModelSource,
}

impl MuninModel {
    /// Create an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the model has no groups at all.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// True when the model was rebuilt without declared settings.
    pub fn is_degraded(&self) -> bool {
        self.source == ModelSource::CachedListing
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn group_or_insert(&mut self, name: &str) -> &mut Group {
        find_or_push(&mut self.groups, name, |g| &g.name, || Group::new(name))
    }

    pub fn plugin(&self, key: &PluginKey) -> Option<&Plugin> {
        self.group(&key.group)?.node(&key.node)?.plugin(&key.plugin)
    }

    /// Get a plugin, creating any missing level on the way.
    pub fn plugin_or_insert(&mut self, key: &PluginKey) -> &mut Plugin {
        self.group_or_insert(&key.group)
            .node_or_insert(&key.node)
            .plugin_or_insert(&key.plugin)
    }

    pub fn field(&self, key: &FieldKey) -> Option<&Field> {
        self.plugin(&key.plugin_key())?.field(&key.field)
    }

    pub fn field_mut(&mut self, key: &FieldKey) -> Option<&mut Field> {
        self.groups
            .iter_mut()
            .find(|g| g.name == key.group)?
            .nodes
            .iter_mut()
            .find(|n| n.name == key.node)?
            .plugins
            .iter_mut()
            .find(|p| p.name == key.plugin)?
            .field_mut(&key.field)
    }

    /// Get a field, creating any missing level on the way.
    pub fn field_or_insert(&mut self, key: &FieldKey) -> &mut Field {
        self.plugin_or_insert(&key.plugin_key())
            .field_or_insert(&key.field)
    }

    /// Enumerate every (group, node, plugin) in discovery order.
    ///
    /// Plugins carrying only plugin-level attributes have no series and are
    /// skipped; they stay reachable through [`MuninModel::plugin`].
    pub fn plugins(&self) -> impl Iterator<Item = PluginRef<'_>> {
        self.groups.iter().flat_map(|group| {
            group.nodes.iter().flat_map(move |node| {
                node.plugins
                    .iter()
                    .filter(|plugin| !plugin.fields.is_empty())
                    .map(move |plugin| PluginRef {
                    group: &group.name,
                    node: &node.name,
                    plugin,
                })
            })
        })
    }

    /// Enumerate every (group, node, plugin, field) in discovery order.
    pub fn fields(&self) -> impl Iterator<Item = FieldRef<'_>> {
        self.plugins().flat_map(|p| {
            p.plugin.fields.iter().map(move |field| FieldRef {
                group: p.group,
                node: p.node,
                plugin: p.plugin,
                field,
            })
        })
    }

    /// Mutable traversal of every field in discovery order.
    pub fn fields_mut(&mut self) -> impl Iterator<Item = FieldMut<'_>> {
        let mut out = Vec::new();
        for group in &mut self.groups {
            for node in &mut group.nodes {
                for plugin in &mut node.plugins {
                    for field in &mut plugin.fields {
                        out.push(FieldMut {
                            group: &group.name,
                            node: &node.name,
                            plugin: &plugin.name,
                            field,
                        });
                    }
                }
            }
        }
        out.into_iter()
    }

    /// Number of plugins across all nodes.
    pub fn plugin_count(&self) -> usize {
        self.plugins().count()
    }

    /// Number of fields across all plugins.
    pub fn field_count(&self) -> usize {
        self.fields().count()
    }
}

fn find_or_push<'a, T>(
    items: &'a mut Vec<T>,
    name: &str,
    name_of: impl Fn(&T) -> &String,
    make: impl FnOnce() -> T,
) -> &'a mut T {
    let index = match items.iter().position(|item| name_of(item) == name) {
        Some(index) => index,
        None => {
            items.push(make());
            items.len() - 1
        }
    };
    &mut items[index]
}
