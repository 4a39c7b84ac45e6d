//! Flux Core - Chamber Flux Estimation Engine
//!
//! This module provides the infrastructure for turning raw high-frequency
//! gas-concentration series and a chamber rotation schedule into per-event
//! flux estimates with quality flags.
//!
//! # Architecture
//!
//! ```text
//! Instrument files → InstrumentReader → primary TimeSeries
//!     ↓
//! WindowCatalogBuilder (rotation template × anchors)
//!     ↓
//! AsofMergeEngine (by-time / by-id / by-time-and-id aux joins)
//!     ↓
//! WindowValidator (quality predicates per cycle slice)
//!     ↓
//! FluxEstimator (OLS slope, Pearson r, ideal-gas flux per species)
//!     ↓
//! Summarizer → SummaryWriter → JSONL or SQLite backend
//! ```

pub mod estimate;
pub mod jsonl_writer;
pub mod merge;
pub mod reader;
pub mod runner;
pub mod schedule;
pub mod series;
pub mod sqlite_writer;
pub mod summary;
pub mod validate;
pub mod writer;
pub mod writer_backend;

pub use estimate::{CovariateColumns, CovariateDefaults, FluxEstimator, FluxRecord, Species};
pub use jsonl_writer::JsonlSummaryWriter;
pub use merge::{AsofMergeEngine, AuxSourceConfig, Direction, JoinStrategy};
pub use reader::{
    read_instrument_files, AuxSourceLoader, CsvAuxLoader, CsvAuxSourceSet, CsvInstrumentReader,
    InstrumentReader, Li7810Reader,
};
pub use runner::FluxPipeline;
pub use schedule::{read_anchor_file, RotationEntry, Window, WindowCatalogBuilder};
pub use series::{FieldValue, TimeSeries, TimeSeriesRecord};
pub use sqlite_writer::SqliteSummaryWriter;
pub use summary::{OutputRecord, Summarizer};
pub use validate::{ReasonCode, ValidationResult, WindowValidator};
pub use writer::SummaryWriter;
pub use writer_backend::{SummaryWriterBackend, SummaryWriterError};
