//! Writer backend trait for flux summaries
//!
//! Defines the interface for writing summarized flux records to different
//! backends.

use super::summary::OutputRecord;

#[derive(Debug)]
pub enum SummaryWriterError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
    Database(String),
}

impl From<std::io::Error> for SummaryWriterError {
    fn from(err: std::io::Error) -> Self {
        SummaryWriterError::Io(err)
    }
}

impl From<serde_json::Error> for SummaryWriterError {
    fn from(err: serde_json::Error) -> Self {
        SummaryWriterError::Serialization(err)
    }
}

impl std::fmt::Display for SummaryWriterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SummaryWriterError::Io(e) => write!(f, "IO error: {}", e),
            SummaryWriterError::Serialization(e) => write!(f, "Serialization error: {}", e),
            SummaryWriterError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for SummaryWriterError {}

/// Backend trait for writing flux summary records
pub trait SummaryWriterBackend: Send {
    /// Write a single summary record
    fn write_record(&mut self, record: &OutputRecord) -> Result<(), SummaryWriterError>;

    /// Flush pending writes to storage
    fn flush(&mut self) -> Result<(), SummaryWriterError>;

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;
}
