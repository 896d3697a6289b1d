//! # muninflux-types
//!
//! Core types shared by every stage of a Munin to InfluxDB migration. This
//! crate defines the hierarchical configuration model reconstructed from a
//! Munin master (groups, nodes, plugins, fields) and the write-ready point
//! that both the historical import and the live fetch produce.
//!
//! ## Design Goals
//!
//! - **Zero required dependencies**: Core types work without any serialization framework
//! - **Optional serialization**: Enable the `serde` feature to persist or exchange types
//! - **Owned hierarchy**: Each level exclusively owns its children, no shared pointers
//! - **Derived identity**: A field is always addressed by its (group, node, plugin, field) path
//!
//! ## Example
//!
//! ```rust
//! use muninflux_types::{FieldKey, MuninModel, WritePoint};
//!
//! let mut model = MuninModel::new();
//! let key = FieldKey::new("group1", "web01", "cpu", "system");
//! model
//!     .field_or_insert(&key)
//!     .settings
//!     .insert("type", "DERIVE");
//!
//! assert_eq!(model.field_count(), 1);
//!
//! let point = WritePoint::builder("cpu")
//!     .tag("group", "group1")
//!     .time(1_449_000_000)
//!     .field("system", Some(12.5))
//!     .build();
//! assert_eq!(point.fields.len(), 1);
//! ```
//!
//! ## Mapping Version
//!
//! The current mapping version is **1**. It is written into the persisted
//! metric mapping so that later fetch runs can detect a mapping produced by
//! an incompatible release.

mod model;
mod point;
mod settings;
mod version;

pub use model::*;
pub use point::*;
pub use settings::*;
pub use version::*;

/// Current version of the persisted metric mapping format.
///
/// Increment this when making breaking changes to the mapping document.
pub const MAPPING_VERSION: u32 = 1;
