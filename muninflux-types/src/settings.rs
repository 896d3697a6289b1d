//! Declared attributes of plugins and fields.

use std::collections::BTreeMap;
use std::fmt;

/// Typecode used when a field declares no type, or one Munin doesn't know.
///
/// Munin treats undeclared data sources as gauges.
pub const DEFAULT_TYPECODE: char = 'g';

/// Loosely-typed bag of attributes declared in the Munin configuration.
///
/// Values are kept as the raw strings found in the export. Writing the same
/// attribute twice keeps the last value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Settings(BTreeMap<String, String>);

impl Settings {
    /// Create an empty settings bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an attribute, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Get the raw value of an attribute.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Check if an attribute has been declared.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Number of declared attributes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if no attribute has been declared.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over all attributes in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The declared data source type, if it is one Munin knows.
    pub fn data_type(&self) -> Option<DataType> {
        self.get("type").and_then(DataType::parse)
    }

    /// Single-letter typecode used in archive filenames.
    pub fn typecode(&self) -> char {
        self.data_type()
            .map(|t| t.typecode())
            .unwrap_or(DEFAULT_TYPECODE)
    }
}

/// Data source type of a Munin field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum DataType {
    Gauge,
    Derive,
    Counter,
    Absolute,
}

impl DataType {
    /// Parse the value of a `type` attribute (case-insensitive, surrounding
    /// whitespace ignored).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "GAUGE" => Some(DataType::Gauge),
            "DERIVE" => Some(DataType::Derive),
            "COUNTER" => Some(DataType::Counter),
            "ABSOLUTE" => Some(DataType::Absolute),
            _ => None,
        }
    }

    /// Resolve the type encoded in an archive filename.
    pub fn from_typecode(code: char) -> Option<Self> {
        match code {
            'g' => Some(DataType::Gauge),
            'd' => Some(DataType::Derive),
            'c' => Some(DataType::Counter),
            'a' => Some(DataType::Absolute),
            _ => None,
        }
    }

    /// Single-letter abbreviation used in archive filenames.
    pub fn typecode(&self) -> char {
        match self {
            DataType::Gauge => 'g',
            DataType::Derive => 'd',
            DataType::Counter => 'c',
            DataType::Absolute => 'a',
        }
    }

    /// The name Munin uses in configuration exports.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Gauge => "GAUGE",
            DataType::Derive => "DERIVE",
            DataType::Counter => "COUNTER",
            DataType::Absolute => "ABSOLUTE",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_write_wins() {
        let mut settings = Settings::new();
        settings.insert("label", "first");
        settings.insert("label", "second");
        assert_eq!(settings.get("label"), Some("second"));
        assert_eq!(settings.len(), 1);
    }

    #[test]
    fn typecode_defaults_to_gauge() {
        let mut settings = Settings::new();
        assert_eq!(settings.typecode(), 'g');

        settings.insert("type", "bogus");
        assert_eq!(settings.typecode(), DEFAULT_TYPECODE);

        settings.insert("type", " derive ");
        assert_eq!(settings.typecode(), 'd');
    }

    #[test]
    fn typecode_and_name_agree() {
        for t in [
            DataType::Gauge,
            DataType::Derive,
            DataType::Counter,
            DataType::Absolute,
        ] {
            assert_eq!(DataType::from_typecode(t.typecode()), Some(t));
            assert_eq!(DataType::parse(t.as_str()), Some(t));
        }
        assert_eq!(DataType::from_typecode('x'), None);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn settings_serialize_as_plain_map() {
        let mut settings = Settings::new();
        settings.insert("type", "GAUGE");
        let json = serde_json::to_string(&settings).unwrap();
        assert_eq!(json, r#"{"type":"GAUGE"}"#);
    }
}
