//! InfluxDB line protocol encoding.
//!
//! One line per point: `measurement,tag=value field=1.5 1449000000`. Tags are
//! written in name order, unknown field values are left out, and a point with
//! no known value at all is skipped since the protocol requires one field.

use std::fmt::Write;

use muninflux_types::WritePoint;

/// Encode a batch of points, one line each, timestamps in seconds.
pub fn encode(points: &[WritePoint]) -> String {
    let mut out = String::new();
    for point in points {
        if let Some(line) = encode_point(point) {
            out.push_str(&line);
            out.push('\n');
        }
    }
    out
}

/// Encode a single point, or `None` if it carries no known value.
pub fn encode_point(point: &WritePoint) -> Option<String> {
    let fields: Vec<(&str, f64)> = point
        .known_fields()
        .filter(|(_, value)| value.is_finite())
        .collect();
    if fields.is_empty() {
        return None;
    }

    let mut line = escape(&point.measurement, &[',', ' ']);
    for (name, value) in &point.tags {
        if value.is_empty() {
            continue;
        }
        let _ = write!(
            line,
            ",{}={}",
            escape(name, &[',', '=', ' ']),
            escape(value, &[',', '=', ' '])
        );
    }

    for (i, (name, value)) in fields.iter().enumerate() {
        line.push(if i == 0 { ' ' } else { ',' });
        let _ = write!(line, "{}={}", escape(name, &[',', '=', ' ']), value);
    }

    let _ = write!(line, " {}", point.time);
    Some(line)
}

fn escape(raw: &str, special: &[char]) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c == '\\' || special.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_tags_fields_and_time() {
        let point = WritePoint::builder("cpu")
            .tag("node", "web01")
            .tag("group", "group1")
            .time(1_449_000_000)
            .field("system", Some(1.5))
            .field("irq", Some(0.0))
            .build();

        assert_eq!(
            encode_point(&point).unwrap(),
            "cpu,group=group1,node=web01 irq=0,system=1.5 1449000000"
        );
    }

    #[test]
    fn unknown_values_are_omitted() {
        let point = WritePoint::builder("memory")
            .time(10)
            .field("mapped", None)
            .field("swap", Some(2.0))
            .build();
        assert_eq!(encode_point(&point).unwrap(), "memory swap=2 10");

        let empty = WritePoint::builder("memory")
            .time(10)
            .field("mapped", None)
            .build();
        assert!(encode_point(&empty).is_none());
        assert_eq!(encode(&[empty]), "");
    }

    #[test]
    fn special_characters_are_escaped() {
        let point = WritePoint::builder("apache volume")
            .tag("node", "host,one")
            .tag("label", "a=b")
            .time(1)
            .field("port 80", Some(3.0))
            .build();

        assert_eq!(
            encode_point(&point).unwrap(),
            r"apache\ volume,label=a\=b,node=host\,one port\ 80=3 1"
        );
    }

    #[test]
    fn empty_tag_values_are_dropped() {
        let point = WritePoint::builder("df")
            .tag("node", "")
            .time(3)
            .field("root", Some(50.0))
            .build();
        assert_eq!(encode_point(&point).unwrap(), "df root=50 3");
    }
}
