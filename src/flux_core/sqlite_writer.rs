//! SQLite writer for flux summaries

use rusqlite::{params, Connection};
use std::path::Path;

use super::estimate::Species;
use super::series::TIMESTAMP_FORMAT;
use super::summary::OutputRecord;
use super::writer_backend::{SummaryWriterBackend, SummaryWriterError};

const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS flux_summaries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    chamber_id TEXT NOT NULL,
    is_valid INTEGER NOT NULL,
    quality_flags TEXT NOT NULL,
    ch4_slope REAL,
    ch4_pearsons_r REAL,
    ch4_flux REAL,
    co2_slope REAL,
    co2_pearsons_r REAL,
    co2_flux REAL,
    h2o_slope REAL,
    h2o_pearsons_r REAL,
    h2o_flux REAL
)";

const INSERT_SQL: &str = "INSERT INTO flux_summaries (
    timestamp, chamber_id, is_valid, quality_flags,
    ch4_slope, ch4_pearsons_r, ch4_flux,
    co2_slope, co2_pearsons_r, co2_flux,
    h2o_slope, h2o_pearsons_r, h2o_flux
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)";

/// SQLite backend for flux summaries. All three species columns exist in the
/// schema; species not configured for a run stay NULL.
pub struct SqliteSummaryWriter {
    conn: Connection,
}

impl SqliteSummaryWriter {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, SummaryWriterError> {
        let conn = Connection::open(db_path)
            .map_err(|e| SummaryWriterError::Database(e.to_string()))?;
        conn.execute(CREATE_TABLE_SQL, [])
            .map_err(|e| SummaryWriterError::Database(e.to_string()))?;

        log::info!("✅ SQLite summary writer initialized");
        Ok(Self { conn })
    }
}

fn species_triplet(record: &OutputRecord, species: Species) -> (Option<f64>, Option<f64>, Option<f64>) {
    record
        .gases
        .iter()
        .find(|g| g.species == species)
        .map(|g| (g.slope, g.pearsons_r, g.flux))
        .unwrap_or((None, None, None))
}

impl SummaryWriterBackend for SqliteSummaryWriter {
    fn write_record(&mut self, record: &OutputRecord) -> Result<(), SummaryWriterError> {
        let (ch4_slope, ch4_r, ch4_flux) = species_triplet(record, Species::Ch4);
        let (co2_slope, co2_r, co2_flux) = species_triplet(record, Species::Co2);
        let (h2o_slope, h2o_r, h2o_flux) = species_triplet(record, Species::H2o);

        self.conn
            .execute(
                INSERT_SQL,
                params![
                    record.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                    record.chamber_id,
                    record.is_valid,
                    record.reasons.join(","),
                    ch4_slope,
                    ch4_r,
                    ch4_flux,
                    co2_slope,
                    co2_r,
                    co2_flux,
                    h2o_slope,
                    h2o_r,
                    h2o_flux,
                ],
            )
            .map_err(|e| SummaryWriterError::Database(e.to_string()))?;

        log::debug!(
            "✅ Summary written: chamber {} at {} (valid: {})",
            record.chamber_id,
            record.timestamp,
            record.is_valid
        );
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SummaryWriterError> {
        // Autocommit connection, nothing buffered.
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "SQLite"
    }
}
