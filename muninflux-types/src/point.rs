//! Write-ready records for the destination database.

use std::collections::BTreeMap;

/// A field's value; `None` when the reading was unknown.
pub type FieldValue = Option<f64>;

/// A destination-ready record: one measurement, its tags, a timestamp and
/// a set of field values.
///
/// A field whose source reading was unknown is kept as `None`. The unknown
/// sentinel of the legacy store never shows up as a number here.
///
/// # Example
///
/// ```rust
/// use muninflux_types::WritePoint;
///
/// let point = WritePoint::builder("memory")
///     .tag("group", "group2")
///     .tag("node", "mailserver")
///     .tag("plugin", "memory")
///     .time(1_449_000_300)
///     .field("mapped", Some(1024.0))
///     .field("swap", None)
///     .build();
///
/// assert_eq!(point.known_fields().count(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WritePoint {
    /// Measurement (series name) in the destination.
    pub measurement: String,

    /// Tags identifying the series, keyed by tag name.
    pub tags: BTreeMap<String, String>,

    /// Unix timestamp in seconds.
    pub time: i64,

    /// Field values; `None` marks an explicitly unknown reading.
    pub fields: BTreeMap<String, FieldValue>,
}

impl WritePoint {
    /// Create a builder for the given measurement.
    pub fn builder(measurement: impl Into<String>) -> WritePointBuilder {
        WritePointBuilder::new(measurement)
    }

    /// Iterate over fields that carry a value.
    pub fn known_fields(&self) -> impl Iterator<Item = (&str, f64)> {
        self.fields
            .iter()
            .filter_map(|(name, value)| value.map(|v| (name.as_str(), v)))
    }

    /// Check whether every field of this point is unknown.
    pub fn is_all_unknown(&self) -> bool {
        self.fields.values().all(Option::is_none)
    }
}

/// Builder for [`WritePoint`].
#[derive(Debug, Default)]
pub struct WritePointBuilder {
    measurement: String,
    tags: BTreeMap<String, String>,
    time: i64,
    fields: BTreeMap<String, FieldValue>,
}

impl WritePointBuilder {
    /// Create a new builder.
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            ..Default::default()
        }
    }

    /// Add a tag.
    pub fn tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(name.into(), value.into());
        self
    }

    /// Replace all tags.
    pub fn tags(mut self, tags: BTreeMap<String, String>) -> Self {
        self.tags = tags;
        self
    }

    /// Set the timestamp (seconds since Unix epoch).
    pub fn time(mut self, time: i64) -> Self {
        self.time = time;
        self
    }

    /// Set a field value.
    pub fn field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Build the point.
    pub fn build(self) -> WritePoint {
        WritePoint {
            measurement: self.measurement,
            tags: self.tags,
            time: self.time,
            fields: self.fields,
        }
    }
}
