//! # Failure Log
//!
//! Append-only audit trail of songs that did not download. Every worker of a
//! batch appends concurrently, so each sink serializes its writes.
//!
//! ```ignore
//! use core_download::failure_log::{FailureSink, FileFailureLog};
//!
//! let log = FileFailureLog::new("download_failures.log");
//! log.append(entry).await?;
//! ```

use crate::error::Result;
use crate::models::FailureLogEntry;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Destination for failure records.
#[async_trait]
pub trait FailureSink: Send + Sync {
    async fn append(&self, entry: FailureLogEntry) -> Result<()>;
}

/// Appends human-readable records to a file.
///
/// Each record is written with a single `write_all` while holding the lock,
/// so records from different workers never interleave.
#[derive(Debug)]
pub struct FileFailureLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileFailureLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FailureSink for FileFailureLog {
    async fn append(&self, entry: FailureLogEntry) -> Result<()> {
        let record = entry.to_record();
        let _guard = self.lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(record.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Collects entries in memory.
#[derive(Debug, Default)]
pub struct MemoryFailureLog {
    entries: Mutex<Vec<FailureLogEntry>>,
}

impl MemoryFailureLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<FailureLogEntry> {
        self.entries.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl FailureSink for MemoryFailureLog {
    async fn append(&self, entry: FailureLogEntry) -> Result<()> {
        self.entries.lock().await.push(entry);
        Ok(())
    }
}
