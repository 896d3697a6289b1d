//! Point sinks that need no external service.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use muninflux_types::WritePoint;

use crate::{line_protocol, AdapterError, PointSink};

/// Keeps every accepted batch in memory.
///
/// Used by tests and by dry runs that only want counts. A rejecting sink
/// refuses every batch, which lets callers exercise their failure paths.
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<Vec<WritePoint>>>,
    reject: Option<String>,
}

impl MemorySink {
    /// Create a sink that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sink that rejects every batch with the given reason.
    pub fn rejecting(reason: impl Into<String>) -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            reject: Some(reason.into()),
        }
    }

    /// All accepted batches, in submission order.
    pub fn batches(&self) -> Vec<Vec<WritePoint>> {
        self.batches.lock().clone()
    }

    /// All accepted points, flattened.
    pub fn points(&self) -> Vec<WritePoint> {
        self.batches.lock().iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl PointSink for MemorySink {
    async fn submit(&self, batch: &[WritePoint]) -> Result<(), AdapterError> {
        if let Some(reason) = &self.reject {
            return Err(AdapterError::Rejected(reason.clone()));
        }
        self.batches.lock().push(batch.to_vec());
        Ok(())
    }

    fn description(&self) -> &str {
        "memory"
    }
}

/// Appends each batch to a file as line protocol.
///
/// Lets an import be rehearsed without a database; the file can later be
/// replayed with the `influx` CLI.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    description: String,
    // Serializes appends so concurrent batches don't interleave
    lock: tokio::sync::Mutex<()>,
}

impl FileSink {
    /// Create a sink writing to `path`. The file is created on first submit.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let description = format!("file: {}", path.display());
        Self {
            path,
            description,
            lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Returns the path being written.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PointSink for FileSink {
    async fn submit(&self, batch: &[WritePoint]) -> Result<(), AdapterError> {
        let encoded = line_protocol::encode(batch);
        let _guard = self.lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(encoded.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    fn description(&self) -> &str {
        &self.description
    }
}
