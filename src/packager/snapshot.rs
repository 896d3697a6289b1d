//! Live state snapshots written by a running Munin.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{de, Deserialize, Deserializer};

use crate::{MigrationError, Result};

/// Munin's value for "no reading".
pub const UNKNOWN_SENTINEL: &str = "U";

/// One state file: the latest two readings of every metric a node reports.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetricSnapshot {
    /// When the snapshot was taken.
    #[serde(rename = "spoolfetch", deserialize_with = "epoch_from_raw")]
    pub epoch: i64,

    /// Raw metric key → readings.
    #[serde(rename = "value", default)]
    pub metrics: BTreeMap<String, ReadingPair>,
}

impl MetricSnapshot {
    pub fn new(epoch: i64) -> Self {
        Self {
            epoch,
            metrics: BTreeMap::new(),
        }
    }

    pub fn with_metric(mut self, key: impl Into<String>, readings: ReadingPair) -> Self {
        self.metrics.insert(key.into(), readings);
        self
    }

    /// Read and parse a state file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| MigrationError::file(path, e))?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Latest and previous reading of a metric, in that order on disk.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Vec<Reading>")]
pub struct ReadingPair {
    pub latest: Reading,
    pub previous: Option<Reading>,
}

impl ReadingPair {
    pub fn new(latest: Reading) -> Self {
        Self {
            latest,
            previous: None,
        }
    }
}

impl TryFrom<Vec<Reading>> for ReadingPair {
    type Error = String;

    fn try_from(readings: Vec<Reading>) -> std::result::Result<Self, String> {
        let mut readings = readings.into_iter();
        let latest = readings
            .next()
            .ok_or_else(|| "metric has no readings".to_string())?;
        Ok(Self {
            latest,
            previous: readings.next(),
        })
    }
}

/// A single `[time, value]` pair.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "(RawTime, RawValue)")]
pub struct Reading {
    pub time: i64,
    pub value: RawValue,
}

impl Reading {
    pub fn new(time: i64, value: RawValue) -> Self {
        Self { time, value }
    }
}

impl TryFrom<(RawTime, RawValue)> for Reading {
    type Error = String;

    fn try_from((time, value): (RawTime, RawValue)) -> std::result::Result<Self, String> {
        Ok(Self {
            time: time.epoch()?,
            value,
        })
    }
}

/// A reading's value as Munin stored it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

impl RawValue {
    /// The value as a destination field. The unknown sentinel and anything
    /// that isn't a finite number become an explicit absence.
    pub fn to_field_value(&self) -> Option<f64> {
        match self {
            RawValue::Number(v) => Some(*v).filter(|v| v.is_finite()),
            RawValue::Text(s) if s.trim() == UNKNOWN_SENTINEL => None,
            RawValue::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        }
    }
}

/// A timestamp as Munin stored it: integer, float or numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawTime {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl RawTime {
    /// Whole seconds since the epoch.
    pub fn epoch(&self) -> std::result::Result<i64, String> {
        match self {
            RawTime::Integer(t) => Ok(*t),
            RawTime::Float(t) if t.is_finite() => Ok(*t as i64),
            RawTime::Float(t) => Err(format!("invalid timestamp {}", t)),
            RawTime::Text(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .or_else(|_| s.parse::<f64>().map(|t| t as i64))
                    .map_err(|_| format!("invalid timestamp {:?}", s))
            }
        }
    }
}

fn epoch_from_raw<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    RawTime::deserialize(deserializer)?
        .epoch()
        .map_err(de::Error::custom)
}
