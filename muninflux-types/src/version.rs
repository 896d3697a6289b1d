//! Versioning of the persisted metric mapping.

use crate::MAPPING_VERSION;

/// Version information embedded in the persisted metric mapping.
///
/// A fetch run refuses a mapping whose major version differs from its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MappingVersion {
    /// Major version - breaking changes increment this.
    pub major: u32,

    /// Minor version - backwards-compatible additions increment this.
    pub minor: u32,
}

impl MappingVersion {
    /// Create a new mapping version.
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// The mapping version written by this library.
    pub const fn current() -> Self {
        Self {
            major: MAPPING_VERSION,
            minor: 0,
        }
    }

    /// Returns true if the major version matches (minor differences are OK).
    pub fn is_compatible(&self) -> bool {
        self.major == MAPPING_VERSION
    }
}

impl Default for MappingVersion {
    fn default() -> Self {
        Self::current()
    }
}
