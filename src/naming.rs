//! Destination naming for Munin series.
//!
//! Measurement, field and tag names are always derived from a field's
//! identity. Import records the result in the persisted mapping so live
//! fetches never have to re-derive it.

use std::collections::BTreeMap;

use muninflux_types::FieldKey;
use serde::{Deserialize, Serialize};

/// Field name used when every Munin field gets its own measurement.
pub const VALUE_FIELD: &str = "value";

/// How Munin fields map onto destination measurements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldGrouping {
    /// One measurement per plugin, one destination field per Munin field.
    #[default]
    ByPlugin,
    /// One measurement per Munin field with a single `value` field.
    PerField,
}

/// Where a single Munin field lands in the destination.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesTarget {
    pub measurement: String,
    pub field: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl SeriesTarget {
    /// Derive the target for a field under the given grouping.
    pub fn for_field(key: &FieldKey, grouping: FieldGrouping) -> Self {
        let mut tags = BTreeMap::new();
        tags.insert("group".to_string(), key.group.clone());
        tags.insert("node".to_string(), key.node.clone());
        tags.insert("plugin".to_string(), key.plugin.clone());

        match grouping {
            FieldGrouping::ByPlugin => Self {
                measurement: key.plugin.clone(),
                field: key.field.clone(),
                tags,
            },
            FieldGrouping::PerField => {
                tags.insert("field".to_string(), key.field.clone());
                Self {
                    measurement: format!("{}.{}", key.plugin, key.field),
                    field: VALUE_FIELD.to_string(),
                    tags,
                }
            }
        }
    }

    /// Key identifying the destination series this target writes into.
    pub fn series_key(&self) -> (String, BTreeMap<String, String>) {
        (self.measurement.clone(), self.tags.clone())
    }
}
