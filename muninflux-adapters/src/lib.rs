//! # muninflux-adapters
//!
//! Boundary adapters used by the muninflux migration core.
//!
//! The core never touches the legacy archive format or the network itself.
//! It talks to two collaborators:
//!
//! - an [`ArchiveDumper`] that turns an opaque RRD archive into a structured
//!   XML document, and
//! - a [`PointSink`] that accepts whole batches of [`WritePoint`]s.
//!
//! ## Implementations
//!
//! - **rrdtool** (`rrdtool` feature) - [`rrdtool::RrdtoolDumper`] runs `rrdtool dump`
//! - **InfluxDB** (`influxdb` feature) - [`influxdb::InfluxDbSink`] writes line protocol over HTTP
//! - [`MemorySink`] and [`FileSink`] are always available for tests and dry runs
//!
//! ## Quick Start (InfluxDB)
//!
//! ```rust,no_run
//! # #[cfg(feature = "influxdb")]
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use muninflux_adapters::influxdb::InfluxDbSink;
//! use muninflux_adapters::{PointSink, WritePoint};
//!
//! let sink = InfluxDbSink::builder()
//!     .endpoint("http://localhost:8086")
//!     .credentials("root", "root")
//!     .database("munin")
//!     .build()?;
//!
//! let point = WritePoint::builder("cpu").time(1_449_000_000).field("user", Some(3.0)).build();
//! sink.submit(&[point]).await?;
//! # Ok(())
//! # }
//! ```

use std::fmt::Debug;
use std::path::Path;

use async_trait::async_trait;

pub mod error;
pub mod line_protocol;
mod sink;

#[cfg(feature = "rrdtool")]
pub mod rrdtool;

#[cfg(feature = "influxdb")]
pub mod influxdb;

pub use error::AdapterError;
pub use sink::{FileSink, MemorySink};

// Re-export types for convenience
pub use muninflux_types::WritePoint;

/// Converts a legacy archive into the structured document the consolidator
/// parses.
#[async_trait]
pub trait ArchiveDumper: Send + Sync + Debug {
    /// Dump `archive` to `document`, creating parent directories as needed.
    async fn dump(&self, archive: &Path, document: &Path) -> Result<(), AdapterError>;
}

/// Destination for write-ready points.
///
/// A batch either succeeds as a whole or fails as a whole; implementations
/// must not report partial success.
#[async_trait]
pub trait PointSink: Send + Sync + Debug {
    /// Submit one batch of points.
    async fn submit(&self, batch: &[WritePoint]) -> Result<(), AdapterError>;

    /// Returns a human-readable description of the destination.
    fn description(&self) -> &str;
}
