//! Error taxonomy for the flux pipeline
//!
//! File-level parse failures are recoverable (callers skip the file and keep
//! going); ordering violations and an entirely empty result are fatal and
//! abort the run with an explicit diagnostic, since the processor usually
//! runs unattended on a schedule.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, FluxError>;

#[derive(Error, Debug)]
pub enum FluxError {
    /// A single input file could not be parsed. Recoverable: batch readers
    /// log and skip the file.
    #[error("failed to parse {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },

    /// A series arrived in descending time order. This signals structural
    /// timestamp corruption upstream, so the whole run aborts.
    #[error("series ordering violation in {context}: timestamps run backwards")]
    OrderingViolation { context: String },

    /// Every measurement window came up empty for the configured range.
    #[error("no measurement window produced any data for the configured range")]
    EmptyResult,

    /// The rotation template failed validation at load time.
    #[error("invalid rotation template: {0}")]
    Template(String),

    /// SQLite error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
