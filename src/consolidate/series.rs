//! Merging multi-resolution archive blocks into one series.
//!
//! A dump stores the same data source several times, once per resolution,
//! each as a circular buffer ending at `lastupdate`. Rows are timestamped
//! backwards from the newest one and merged coarsest first, so wherever two
//! blocks cover the same instant the finer reading is the one kept.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::document::{ArchiveBlock, ArchiveDocument};

/// Consolidation function kept when shadow archives are dropped.
pub const PRIMARY_FUNCTION: &str = "AVERAGE";

/// Timestamp given to the newest row of each block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampAlignment {
    /// The document's `lastupdate`.
    #[default]
    LastUpdate,
    /// `lastupdate` rounded down to a multiple of the block's resolution.
    /// This matches the timestamps rrdtool prints next to each row.
    ResolutionBoundary,
}

/// Which row count positions are measured against.
///
/// Rows are always numbered by the values actually yielded for the data
/// source. The two policies differ only when a block declares rows that
/// carry no value for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowCounting {
    /// Count every row the block declares.
    #[default]
    Declared,
    /// Count only rows that yielded a value, so the last value always lands
    /// on the newest timestamp.
    Yielded,
}

/// How blocks are timestamped, filtered and merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsolidationPolicy {
    pub alignment: TimestampAlignment,
    pub row_counting: RowCounting,

    /// Drop blocks whose consolidation function isn't AVERAGE.
    pub keep_average_only: bool,
}

impl Default for ConsolidationPolicy {
    fn default() -> Self {
        Self {
            alignment: TimestampAlignment::default(),
            row_counting: RowCounting::default(),
            keep_average_only: true,
        }
    }
}

/// Chronological samples of one field, independent of how many resolutions
/// the archive held.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsolidatedSeries {
    /// `lastupdate` of the source document.
    pub lastupdate: i64,

    samples: BTreeMap<i64, f64>,

    /// Rows skipped because they held the no-data sentinel or garbage.
    pub unknown_rows: usize,
}

impl ConsolidatedSeries {
    pub fn new(lastupdate: i64) -> Self {
        Self {
            lastupdate,
            ..Default::default()
        }
    }

    pub fn get(&self, timestamp: i64) -> Option<f64> {
        self.samples.get(&timestamp).copied()
    }

    /// Samples in ascending timestamp order.
    pub fn iter(&self) -> impl Iterator<Item = (i64, f64)> + '_ {
        self.samples.iter().map(|(t, v)| (*t, *v))
    }

    pub fn samples(&self) -> &BTreeMap<i64, f64> {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn insert(&mut self, timestamp: i64, value: f64) {
        self.samples.insert(timestamp, value);
    }
}

/// Consolidate data source `ds` of a parsed document.
///
/// Fails when the header is incomplete, a kept block lacks a usable
/// `pdp_per_row`, or `ds` is beyond the declared data sources.
pub fn consolidate(
    doc: &ArchiveDocument,
    ds: usize,
    policy: &ConsolidationPolicy,
) -> Result<ConsolidatedSeries, String> {
    let header = doc.header()?;

    if !doc.data_sources.is_empty() && ds >= doc.data_sources.len() {
        return Err(format!(
            "data source {} requested but only {} declared",
            ds,
            doc.data_sources.len()
        ));
    }

    let mut blocks: Vec<(i64, &ArchiveBlock)> = Vec::with_capacity(doc.blocks.len());
    for block in &doc.blocks {
        if policy.keep_average_only
            && !block
                .function()
                .is_some_and(|cf| cf.eq_ignore_ascii_case(PRIMARY_FUNCTION))
        {
            continue;
        }
        let pdp = block.pdp_per_row()?;
        let resolution = header.step.checked_mul(pdp).ok_or_else(|| {
            format!(
                "resolution overflows: step {} x pdp_per_row {}",
                header.step, pdp
            )
        })?;
        blocks.push((resolution, block));
    }

    // coarsest first; the sort is stable so equal resolutions keep document order
    blocks.sort_by_key(|(resolution, _)| std::cmp::Reverse(*resolution));

    let mut series = ConsolidatedSeries::new(header.lastupdate);
    for (resolution, block) in blocks {
        let newest = match policy.alignment {
            TimestampAlignment::LastUpdate => header.lastupdate,
            TimestampAlignment::ResolutionBoundary => header
                .lastupdate
                .checked_sub(header.lastupdate.rem_euclid(resolution))
                .ok_or_else(|| format!("lastupdate {} out of range", header.lastupdate))?,
        };

        let values: Vec<&str> = block.values(ds).collect();
        let row_count = match policy.row_counting {
            RowCounting::Declared => block.declared_rows(),
            RowCounting::Yielded => values.len(),
        };
        let row_count = i64::try_from(row_count).map_err(|_| "too many rows".to_string())?;

        for (i, raw) in values.into_iter().enumerate() {
            let Some(value) = parse_value(raw) else {
                series.unknown_rows += 1;
                continue;
            };
            let timestamp = row_timestamp(newest, row_count, i, resolution).ok_or_else(|| {
                format!("timestamp of row {} overflows at resolution {}", i, resolution)
            })?;
            series.insert(timestamp, value);
        }
    }

    Ok(series)
}

/// `newest - (row_count - 1 - index) * resolution`, or `None` on overflow.
fn row_timestamp(newest: i64, row_count: i64, index: usize, resolution: i64) -> Option<i64> {
    let index = i64::try_from(index).ok()?;
    let rows_back = row_count.checked_sub(1)?.checked_sub(index)?;
    newest.checked_sub(rows_back.checked_mul(resolution)?)
}

/// A stored value, or `None` for NaN and anything unparsable.
fn parse_value(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}
