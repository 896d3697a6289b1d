//! The XML document produced by `rrdtool dump`.
//!
//! Only what consolidation needs is modelled; everything else in the dump
//! (`version`, `params`, `cdp_prep`, comments) is skipped. Leaf values are
//! kept as text and parsed on access, since rrdtool pads them with spaces.

use serde::Deserialize;

/// Root `<rrd>` element.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArchiveDocument {
    /// Base sampling interval in seconds.
    #[serde(default)]
    pub step: Option<String>,

    /// Epoch seconds of the last write.
    #[serde(default)]
    pub lastupdate: Option<String>,

    #[serde(rename = "ds", default)]
    pub data_sources: Vec<DataSourceDecl>,

    #[serde(rename = "rra", default)]
    pub blocks: Vec<ArchiveBlock>,
}

/// `<ds>` declaration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DataSourceDecl {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// `<rra>`: one round-robin archive at a single resolution.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArchiveBlock {
    /// Consolidation function (AVERAGE, MIN, MAX, LAST).
    #[serde(default)]
    pub cf: Option<String>,

    /// Base steps aggregated into one row.
    #[serde(default)]
    pub pdp_per_row: Option<String>,

    #[serde(default)]
    pub database: Database,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Database {
    #[serde(rename = "row", default)]
    pub rows: Vec<Row>,
}

/// One stored row, with one `<v>` per data source.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Row {
    #[serde(rename = "v", default)]
    pub values: Vec<String>,
}

/// Required top-level values of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentHeader {
    pub step: i64,
    pub lastupdate: i64,
}

impl ArchiveDocument {
    /// Parse a dumped document.
    pub fn parse(xml: &str) -> Result<Self, String> {
        quick_xml::de::from_str(xml).map_err(|e| format!("invalid XML: {}", e))
    }

    /// Read `step` and `lastupdate`, both of which must be present.
    pub fn header(&self) -> Result<DocumentHeader, String> {
        let step = required_int(self.step.as_deref(), "step")?;
        if step <= 0 {
            return Err(format!("step must be positive, got {}", step));
        }
        let lastupdate = required_int(self.lastupdate.as_deref(), "lastupdate")?;
        Ok(DocumentHeader { step, lastupdate })
    }
}

impl ArchiveBlock {
    /// The consolidation function, trimmed.
    pub fn function(&self) -> Option<&str> {
        self.cf.as_deref().map(str::trim)
    }

    pub fn pdp_per_row(&self) -> Result<i64, String> {
        let pdp = required_int(self.pdp_per_row.as_deref(), "pdp_per_row")?;
        if pdp <= 0 {
            return Err(format!("pdp_per_row must be positive, got {}", pdp));
        }
        Ok(pdp)
    }

    /// Number of rows the block stores.
    pub fn declared_rows(&self) -> usize {
        self.database.rows.len()
    }

    /// The raw value of data source `ds` in each row that has one.
    pub fn values(&self, ds: usize) -> impl Iterator<Item = &str> {
        self.database
            .rows
            .iter()
            .filter_map(move |row| row.values.get(ds).map(|v| v.trim()))
    }
}

fn required_int(value: Option<&str>, name: &str) -> Result<i64, String> {
    let text = value
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| format!("missing <{}>", name))?;
    text.parse()
        .map_err(|_| format!("<{}> is not an integer: '{}'", name, text))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE rrd SYSTEM "https://oss.oetiker.ch/rrdtool/rrdtool.dtd">
<!-- Round Robin Database Dump -->
<rrd>
	<version>0003</version>
	<step>300</step> <!-- Seconds -->
	<lastupdate>1449000000</lastupdate> <!-- 2015-12-01 20:00:00 UTC -->

	<ds>
		<name> 42 </name>
		<type> DERIVE </type>
		<minimal_heartbeat>600</minimal_heartbeat>
		<min>0.0000000000e+00</min>
		<max>NaN</max>
		<last_ds>U</last_ds>
		<value>0.0000000000e+00</value>
		<unknown_sec> 0 </unknown_sec>
	</ds>

	<!-- Round Robin Archives -->
	<rra>
		<cf>AVERAGE</cf>
		<pdp_per_row>1</pdp_per_row> <!-- 300 seconds -->
		<params>
		<xff>5.0000000000e-01</xff>
		</params>
		<cdp_prep>
			<ds>
			<primary_value>0.0000000000e+00</primary_value>
			<unknown_datapoints>0</unknown_datapoints>
			</ds>
		</cdp_prep>
		<database>
			<!-- 2015-12-01 19:50:00 UTC / 1448999400 --> <row><v>NaN</v></row>
			<!-- 2015-12-01 19:55:00 UTC / 1448999700 --> <row><v>1.5000000000e+00</v></row>
			<!-- 2015-12-01 20:00:00 UTC / 1449000000 --> <row><v>2.0000000000e+00</v></row>
		</database>
	</rra>
	<rra>
		<cf>MAX</cf>
		<pdp_per_row>6</pdp_per_row> <!-- 1800 seconds -->
		<params>
		<xff>5.0000000000e-01</xff>
		</params>
		<database>
			<!-- 2015-12-01 20:00:00 UTC / 1449000000 --> <row><v>9.0000000000e+00</v></row>
		</database>
	</rra>
</rrd>
"#;

    #[test]
    fn parses_rrdtool_dump() {
        let doc = ArchiveDocument::parse(DUMP).unwrap();
        let header = doc.header().unwrap();

        assert_eq!(header, DocumentHeader { step: 300, lastupdate: 1_449_000_000 });
        assert_eq!(doc.data_sources.len(), 1);
        assert_eq!(doc.data_sources[0].name.as_deref().map(str::trim), Some("42"));
        assert_eq!(doc.blocks.len(), 2);

        let average = &doc.blocks[0];
        assert_eq!(average.function(), Some("AVERAGE"));
        assert_eq!(average.pdp_per_row(), Ok(1));
        assert_eq!(average.declared_rows(), 3);
        assert_eq!(
            average.values(0).collect::<Vec<_>>(),
            vec!["NaN", "1.5000000000e+00", "2.0000000000e+00"]
        );

        assert_eq!(doc.blocks[1].function(), Some("MAX"));
        assert_eq!(doc.blocks[1].pdp_per_row(), Ok(6));
    }

    #[test]
    fn missing_header_values() {
        let doc = ArchiveDocument::parse("<rrd><step>300</step></rrd>").unwrap();
        assert_eq!(doc.header(), Err("missing <lastupdate>".to_string()));

        let doc = ArchiveDocument::parse("<rrd><lastupdate>10</lastupdate></rrd>").unwrap();
        assert_eq!(doc.header(), Err("missing <step>".to_string()));

        let doc =
            ArchiveDocument::parse("<rrd><step>abc</step><lastupdate>10</lastupdate></rrd>")
                .unwrap();
        assert!(doc.header().unwrap_err().contains("not an integer"));
    }

    #[test]
    fn rows_missing_a_value_are_not_yielded() {
        let doc = ArchiveDocument::parse(
            "<rrd><rra><pdp_per_row>3</pdp_per_row><database>\
             <row><v>10.0</v></row><row/></database></rra></rrd>",
        )
        .unwrap();

        let block = &doc.blocks[0];
        assert_eq!(block.declared_rows(), 2);
        assert_eq!(block.values(0).count(), 1);
        assert_eq!(block.values(1).count(), 0);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(ArchiveDocument::parse("<rrd><step>").is_err());
    }
}
