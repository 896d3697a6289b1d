//! Turning archives into consolidated series and write points.
//!
//! ```text
//!  archive ──dump──▶ document ──parse──▶ blocks ──merge──▶ series ──▶ points
//!            (ArchiveDumper)   (quick-xml)       (policy)       (per plugin)
//! ```

mod batch;
mod document;
mod points;
mod series;

pub use batch::{
    read_series, ArchiveConsolidator, ArchiveJob, BatchReport, JobOutcome, JobResult, Stage,
    DEFAULT_DATA_SOURCE,
};
pub use document::{ArchiveBlock, ArchiveDocument, DataSourceDecl, DocumentHeader};
pub use points::series_points;
pub use series::{
    consolidate, ConsolidatedSeries, ConsolidationPolicy, RowCounting, TimestampAlignment,
    PRIMARY_FUNCTION,
};
