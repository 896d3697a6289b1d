//! Flattening consolidated series into write points.

use std::collections::BTreeMap;

use muninflux_types::{FieldKey, WritePoint};

use super::series::ConsolidatedSeries;
use crate::naming::{FieldGrouping, SeriesTarget};

type SeriesKey = (String, BTreeMap<String, String>);

/// Build points for a set of fields, usually the fields of one plugin.
///
/// Fields landing in the same destination series are merged: one point per
/// distinct timestamp, carrying every field that has a sample there. Output
/// is sorted by series then time, so the same input always yields the same
/// points.
pub fn series_points<'a, I>(fields: I, grouping: FieldGrouping) -> Vec<WritePoint>
where
    I: IntoIterator<Item = (&'a FieldKey, &'a ConsolidatedSeries)>,
{
    let mut merged: BTreeMap<SeriesKey, BTreeMap<i64, BTreeMap<String, Option<f64>>>> =
        BTreeMap::new();

    for (key, series) in fields {
        let target = SeriesTarget::for_field(key, grouping);
        let rows = merged.entry(target.series_key()).or_default();
        for (time, value) in series.iter() {
            rows.entry(time)
                .or_default()
                .insert(target.field.clone(), Some(value));
        }
    }

    let mut points = Vec::new();
    for ((measurement, tags), rows) in merged {
        for (time, fields) in rows {
            points.push(WritePoint {
                measurement: measurement.clone(),
                tags: tags.clone(),
                time,
                fields,
            });
        }
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consolidate::document::ArchiveDocument;
    use crate::consolidate::series::{consolidate, ConsolidationPolicy};

    fn series(rows: &[&str]) -> ConsolidatedSeries {
        let body: String = rows
            .iter()
            .map(|v| format!("<row><v>{}</v></row>", v))
            .collect();
        let xml = format!(
            "<rrd><lastupdate>1000</lastupdate><step>100</step>\
             <rra><cf>AVERAGE</cf><pdp_per_row>1</pdp_per_row>\
             <database>{}</database></rra></rrd>",
            body
        );
        consolidate(
            &ArchiveDocument::parse(&xml).unwrap(),
            0,
            &ConsolidationPolicy::default(),
        )
        .unwrap()
    }

    #[test]
    fn grouped_points_share_timestamps() {
        let user = FieldKey::new("g", "n", "cpu", "user");
        let idle = FieldKey::new("g", "n", "cpu", "idle");
        let user_series = series(&["1", "2", "3"]);
        let idle_series = series(&["NaN", "90"]);

        let points = series_points(
            [(&user, &user_series), (&idle, &idle_series)],
            FieldGrouping::ByPlugin,
        );

        assert_eq!(points.len(), 3);
        assert!(points.iter().all(|p| p.measurement == "cpu"));
        assert_eq!(points[0].time, 800);
        assert_eq!(points[0].fields.len(), 1);
        assert_eq!(points[2].time, 1000);
        assert_eq!(points[2].fields["user"], Some(3.0));
        assert_eq!(points[2].fields["idle"], Some(90.0));
        assert_eq!(points[2].tags["plugin"], "cpu");
    }

    #[test]
    fn per_field_points() {
        let user = FieldKey::new("g", "n", "cpu", "user");
        let idle = FieldKey::new("g", "n", "cpu", "idle");
        let a = series(&["1", "2"]);
        let b = series(&["5"]);

        let points = series_points([(&user, &a), (&idle, &b)], FieldGrouping::PerField);

        assert_eq!(points.len(), 3);
        assert_eq!(points[0].measurement, "cpu.idle");
        assert_eq!(points[0].fields["value"], Some(5.0));
        assert!(points[1..].iter().all(|p| p.measurement == "cpu.user"));
    }

    #[test]
    fn output_does_not_depend_on_input_order() {
        let user = FieldKey::new("g", "n", "cpu", "user");
        let idle = FieldKey::new("g", "n", "cpu", "idle");
        let a = series(&["1", "2"]);
        let b = series(&["7", "8"]);

        let forward = series_points([(&user, &a), (&idle, &b)], FieldGrouping::ByPlugin);
        let backward = series_points([(&idle, &b), (&user, &a)], FieldGrouping::ByPlugin);
        assert_eq!(forward, backward);
    }
}
