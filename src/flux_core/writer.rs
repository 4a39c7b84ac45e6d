//! Unified writer interface for flux summaries
//!
//! Routes writes to either the JSONL or SQLite backend based on
//! configuration.

use std::path::PathBuf;

use crate::config::BackendType;
use super::jsonl_writer::JsonlSummaryWriter;
use super::sqlite_writer::SqliteSummaryWriter;
use super::summary::OutputRecord;
use super::writer_backend::{SummaryWriterBackend, SummaryWriterError};

/// Unified writer that routes to either JSONL or SQLite backend
pub enum SummaryWriter {
    Jsonl(JsonlSummaryWriter),
    Sqlite(SqliteSummaryWriter),
}

impl SummaryWriter {
    /// Create a new summary writer based on backend type
    pub fn new(backend: BackendType, path: PathBuf) -> Result<Self, SummaryWriterError> {
        match backend {
            BackendType::Jsonl => {
                let writer = JsonlSummaryWriter::new(path)?;
                Ok(SummaryWriter::Jsonl(writer))
            }
            BackendType::Sqlite => {
                let writer = SqliteSummaryWriter::new(path)?;
                Ok(SummaryWriter::Sqlite(writer))
            }
        }
    }

    /// Write one summary record to the configured backend
    pub fn write_record(&mut self, record: &OutputRecord) -> Result<(), SummaryWriterError> {
        match self {
            SummaryWriter::Jsonl(w) => w.write_record(record),
            SummaryWriter::Sqlite(w) => w.write_record(record),
        }
    }

    /// Flush pending writes to storage
    pub fn flush(&mut self) -> Result<(), SummaryWriterError> {
        match self {
            SummaryWriter::Jsonl(w) => w.flush(),
            SummaryWriter::Sqlite(w) => w.flush(),
        }
    }

    /// Get backend type for logging
    pub fn backend_type(&self) -> &'static str {
        match self {
            SummaryWriter::Jsonl(w) => w.backend_type(),
            SummaryWriter::Sqlite(w) => w.backend_type(),
        }
    }
}
