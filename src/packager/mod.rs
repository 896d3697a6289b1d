//! Packaging live readings into write points.
//!
//! Fetch runs after import, once per collection cycle. Each state file is
//! matched against the persisted mapping; metrics the mapping doesn't know
//! are either new (warned about) or retired (dropped quietly).

mod mapping;
mod snapshot;

use std::collections::BTreeMap;

use muninflux_types::WritePoint;
use tracing::{debug, warn};

use crate::MigrationError;

pub use mapping::{canonical_key, state_file, Connection, MetricMapping};
pub use snapshot::{MetricSnapshot, RawTime, RawValue, Reading, ReadingPair, UNKNOWN_SENTINEL};

/// Data source index Munin appends to every live metric key.
pub const INDEX_SUFFIX: &str = ":42";

/// Unmapped metrics older than this are assumed to belong to removed plugins.
pub const STALE_AFTER_DAYS: i64 = 7;

const SECONDS_PER_DAY: i64 = 24 * 3600;

/// Strip the data source suffix from a live metric key.
pub fn canonical_name(raw: &str) -> &str {
    raw.strip_suffix(INDEX_SUFFIX).unwrap_or(raw)
}

/// What one snapshot turned into.
#[derive(Debug, Default)]
pub struct PackOutcome {
    /// One point per destination series that received a field.
    pub points: Vec<WritePoint>,

    /// `MappingMiss` for each recent metric without a mapping.
    pub warnings: Vec<MigrationError>,

    /// Metrics written into a point.
    pub mapped: usize,

    /// Unmapped metrics past the staleness threshold.
    pub retired: usize,
}

impl PackOutcome {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[derive(Default)]
struct Accumulator {
    time: i64,
    fields: BTreeMap<String, Option<f64>>,
}

/// Turns snapshots into points using a persisted mapping.
pub struct MetricPackager<'a> {
    mapping: &'a MetricMapping,
    stale_after_days: i64,
}

impl<'a> MetricPackager<'a> {
    pub fn new(mapping: &'a MetricMapping) -> Self {
        Self {
            mapping,
            stale_after_days: STALE_AFTER_DAYS,
        }
    }

    pub fn stale_after_days(mut self, days: i64) -> Self {
        self.stale_after_days = days;
        self
    }

    pub fn pack(&self, snapshot: &MetricSnapshot) -> PackOutcome {
        let mut outcome = PackOutcome::default();
        let mut series: BTreeMap<(String, BTreeMap<String, String>), Accumulator> =
            BTreeMap::new();

        for (raw, readings) in &snapshot.metrics {
            let name = canonical_name(raw);
            let latest = &readings.latest;

            match self.mapping.resolve(name) {
                Some(target) => {
                    let acc = series.entry(target.series_key()).or_default();
                    acc.time = latest.time;
                    acc.fields
                        .insert(target.field.clone(), latest.value.to_field_value());
                    outcome.mapped += 1;
                }
                None => {
                    let age_days = (snapshot.epoch - latest.time).div_euclid(SECONDS_PER_DAY);
                    if age_days < self.stale_after_days {
                        warn!(
                            "Not found measurement {} (updated {} days ago)",
                            name, age_days
                        );
                        outcome.warnings.push(MigrationError::MappingMiss {
                            metric: name.to_string(),
                            age_days,
                        });
                    } else {
                        debug!("Ignoring retired metric {} ({} days old)", name, age_days);
                        outcome.retired += 1;
                    }
                }
            }
        }

        outcome.points = series
            .into_iter()
            .map(|((measurement, tags), acc)| WritePoint {
                measurement,
                tags,
                time: acc.time,
                fields: acc.fields,
            })
            .collect();
        outcome
    }
}
