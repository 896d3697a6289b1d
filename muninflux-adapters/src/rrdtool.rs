//! Archive dumping through the `rrdtool` command line utility.
//!
//! `rrdtool dump <archive> <document>` writes the full content of an RRD file
//! as XML, every consolidation archive included. Dumping is slow for large
//! installations, which is why callers run several dumps concurrently.
//!
//! ## Example
//!
//! ```rust,no_run
//! use muninflux_adapters::rrdtool::RrdtoolDumper;
//! use muninflux_adapters::ArchiveDumper;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dumper = RrdtoolDumper::new();
//!     dumper
//!         .dump(
//!             Path::new("/var/lib/munin/group1/web01-cpu-system-d.rrd"),
//!             Path::new("/tmp/munin-influxdb/xml/group1-web01-cpu-system-d.xml"),
//!         )
//!         .await?;
//!     Ok(())
//! }
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::{AdapterError, ArchiveDumper};

/// Runs `rrdtool dump` for each archive.
#[derive(Debug, Clone)]
pub struct RrdtoolDumper {
    program: PathBuf,
}

impl RrdtoolDumper {
    /// Use `rrdtool` from `PATH`.
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("rrdtool"),
        }
    }

    /// Use a specific executable.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Returns the executable being run.
    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Default for RrdtoolDumper {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArchiveDumper for RrdtoolDumper {
    async fn dump(&self, archive: &Path, document: &Path) -> Result<(), AdapterError> {
        if let Some(parent) = document.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        debug!("Dumping {} to {}", archive.display(), document.display());
        let output = Command::new(&self.program)
            .arg("dump")
            .arg(archive)
            .arg(document)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AdapterError::Dump(format!(
                "{} exited with {} for {}: {}",
                self.program.display(),
                output.status,
                archive.display(),
                stderr.trim()
            )));
        }

        Ok(())
    }
}
