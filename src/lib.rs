//! # muninflux
//!
//! Migrates a Munin installation's history to InfluxDB, then keeps
//! forwarding its live readings.
//!
//! ## Architecture
//!
//! ```text
//!                           import
//!  ┌──────────┐    ┌───────────┐    ┌─────────────┐    ┌──────────┐
//!  │  model   │───▶│ reconcile │───▶│ consolidate │───▶│   sink   │
//!  │(datafile,│    │ (archives │    │(dump, merge │    │(InfluxDB,│
//!  │ listing) │    │  on disk) │    │ resolutions)│    │   file)  │
//!  └──────────┘    └───────────┘    └──────┬──────┘    └──────────┘
//!                                          │ mapping
//!                           fetch          ▼
//!  state-*.json ──────────────────▶ ┌─────────────┐    ┌──────────┐
//!                                   │  packager   │───▶│   sink   │
//!                                   └─────────────┘    └──────────┘
//! ```
//!
//! - **[`model`]**: builds the Group → Node → Plugin → Field hierarchy from
//!   the configuration export, falling back to the cached dashboard listing
//! - **[`reconcile`]**: derives archive and document paths, discovers and
//!   verifies archives on disk
//! - **[`consolidate`]**: dumps archives through an [`ArchiveDumper`] and
//!   merges their resolutions into one series per field
//! - **[`packager`]**: turns live state snapshots into points using the
//!   mapping written at import time
//! - **[`commands`]**: the `dump`, `import` and `fetch` workflows
//!
//! ## Usage
//!
//! ### As a CLI tool
//!
//! ```bash
//! # Migrate all history, then write /etc/munin/fetch_config.json
//! muninflux import
//!
//! # Preview the line protocol without touching InfluxDB
//! muninflux import --dry-run points.lp
//!
//! # Forward the latest readings (run from cron)
//! muninflux fetch
//! ```
//!
//! ### Consolidating a single staged document
//!
//! ```no_run
//! use std::path::Path;
//! use muninflux::consolidate::{read_series, ConsolidationPolicy, DEFAULT_DATA_SOURCE};
//! use muninflux::FieldKey;
//!
//! # tokio_test::block_on(async {
//! let key = FieldKey::new("group1", "web01", "cpu", "user");
//! let series = read_series(
//!     &key,
//!     Path::new("/tmp/munin-influxdb/xml/group1-web01-cpu-user-d.xml"),
//!     DEFAULT_DATA_SOURCE,
//!     &ConsolidationPolicy::default(),
//! )
//! .await
//! .unwrap();
//! println!("{} samples, newest at {}", series.len(), series.lastupdate);
//! # });
//! ```
//!
//! ### Packaging a live snapshot
//!
//! ```
//! use std::path::Path;
//! use muninflux::packager::{MetricMapping, MetricPackager, MetricSnapshot};
//!
//! # fn demo(mapping: &MetricMapping) -> muninflux::Result<()> {
//! let snapshot = MetricSnapshot::load(Path::new("/var/lib/munin/state-group1-web01.json"))?;
//! let outcome = MetricPackager::new(mapping).pack(&snapshot);
//! println!("{} points, {} warnings", outcome.points.len(), outcome.warnings.len());
//! # Ok(())
//! # }
//! ```

pub mod commands;
pub mod consolidate;
pub mod error;
pub mod model;
pub mod naming;
pub mod packager;
pub mod reconcile;
pub mod settings;

pub use error::{MigrationError, Result};
pub use naming::{FieldGrouping, SeriesTarget};
pub use settings::MigrationSettings;

// Re-export shared types for convenience
pub use muninflux_adapters::{ArchiveDumper, PointSink};
pub use muninflux_types::{FieldKey, MuninModel, PluginKey, WritePoint};
