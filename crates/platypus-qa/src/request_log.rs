//! Append-only JSON-lines log of answered requests.

use crate::executor::AttemptRecord;
use crate::service::{Outcome, Stage};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum RequestLogError {
    #[error("request log I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("request log serialization: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One line of the log.
#[derive(Debug, Clone, Serialize)]
pub struct RequestRecord {
    pub request_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub question: String,
    pub language: Option<String>,
    /// Stages in the order they were entered.
    pub stages: Vec<Stage>,
    /// Canonical text of the analyzed candidates, best first.
    pub candidates: Vec<String>,
    pub attempts: Vec<AttemptRecord>,
    pub outcome: Outcome,
    pub elapsed_ms: u64,
}

/// Appends one JSON object per line; concurrent requests serialize on the
/// file lock.
pub struct JsonLinesRequestLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesRequestLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RequestLogError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &RequestRecord) -> Result<(), RequestLogError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut file = self.file.lock();
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for JsonLinesRequestLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLinesRequestLog")
            .field("path", &self.path)
            .finish()
    }
}
