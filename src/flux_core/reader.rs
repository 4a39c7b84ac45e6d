//! Instrument and auxiliary source file readers
//!
//! Readers return ordered time series; a file that fails to parse is logged
//! and skipped so a batch of many files degrades gracefully.

use std::path::{Path, PathBuf};

use crate::error::{FluxError, Result};
use super::merge::AuxSourceConfig;
use super::series::{parse_timestamp, FieldValue, TimeSeries, TimeSeriesRecord};

/// Parses one instrument file into an ordered time series.
///
/// Implementations form a closed set per instrument model; the pipeline only
/// sees the trait.
pub trait InstrumentReader {
    fn read(&self, path: &Path) -> Result<TimeSeries>;
}

/// Generic delimited-text reader. Numeric cells become floats, anything else
/// is kept as text, empty cells become nulls.
pub struct CsvInstrumentReader {
    delimiter: u8,
    skip_rows: usize,
    timestamp_column: String,
}

impl CsvInstrumentReader {
    /// Comma-delimited file with the header on the first line.
    pub fn comma(timestamp_column: &str) -> Self {
        Self {
            delimiter: b',',
            skip_rows: 0,
            timestamp_column: timestamp_column.to_string(),
        }
    }

    /// Tab-delimited file preceded by `skip_rows` preamble lines.
    pub fn tab(timestamp_column: &str, skip_rows: usize) -> Self {
        Self {
            delimiter: b'\t',
            skip_rows,
            timestamp_column: timestamp_column.to_string(),
        }
    }

    fn parse_error(&self, path: &Path, reason: impl ToString) -> FluxError {
        FluxError::Parse {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

impl InstrumentReader for CsvInstrumentReader {
    fn read(&self, path: &Path) -> Result<TimeSeries> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| self.parse_error(path, e))?;
        let body: String = contents
            .lines()
            .skip(self.skip_rows)
            .collect::<Vec<_>>()
            .join("\n");

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(body.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| self.parse_error(path, e))?
            .clone();
        let ts_index = headers
            .iter()
            .position(|h| h == self.timestamp_column)
            .ok_or_else(|| {
                self.parse_error(
                    path,
                    format!("missing timestamp column '{}'", self.timestamp_column),
                )
            })?;

        let mut records = Vec::new();
        for row in reader.records() {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    log::warn!("skipping malformed row in {}: {}", path.display(), e);
                    continue;
                }
            };
            let timestamp = match row.get(ts_index).and_then(parse_timestamp) {
                Some(ts) => ts,
                None => {
                    log::warn!(
                        "skipping row with unparseable timestamp in {}",
                        path.display()
                    );
                    continue;
                }
            };

            let mut record = TimeSeriesRecord::new(timestamp);
            for (index, header) in headers.iter().enumerate() {
                if index == ts_index {
                    continue;
                }
                let raw = row.get(index).unwrap_or("").trim();
                let value = if raw.is_empty() {
                    FieldValue::Null
                } else if let Ok(number) = raw.parse::<f64>() {
                    FieldValue::Float(number)
                } else {
                    FieldValue::Text(raw.to_string())
                };
                record.set(header, value);
            }
            records.push(record);
        }

        if records.is_empty() {
            log::warn!("{} yielded no rows", path.display());
        }
        Ok(TimeSeries::from_records(records))
    }
}

/// Reader for LI-7810 style analyzer exports: tab-delimited with a
/// two-line serial/model preamble and mixed-case column names, normalized
/// here to the lowercase canonical schema (diag, ch4, co2, h2o, ...).
pub struct Li7810Reader {
    inner: CsvInstrumentReader,
}

impl Li7810Reader {
    pub fn new() -> Self {
        Self {
            inner: CsvInstrumentReader::tab("TIMESTAMP", 2),
        }
    }
}

impl Default for Li7810Reader {
    fn default() -> Self {
        Self::new()
    }
}

impl InstrumentReader for Li7810Reader {
    fn read(&self, path: &Path) -> Result<TimeSeries> {
        let series = self.inner.read(path)?;
        let records = series
            .records
            .into_iter()
            .map(|record| {
                let mut normalized = TimeSeriesRecord::new(record.timestamp);
                for (name, value) in record.fields {
                    normalized.set(&name.to_ascii_lowercase(), value);
                }
                normalized
            })
            .collect();
        Ok(TimeSeries::from_records(records))
    }
}

/// Read a batch of instrument files into one combined, ordered series.
///
/// Parse failures are per-file: the file is skipped with a warning and the
/// batch continues. The combined series is re-checked for ordering, which is
/// all-or-nothing: a descending series aborts the run.
pub fn read_instrument_files<R: InstrumentReader>(
    reader: &R,
    paths: &[PathBuf],
) -> Result<TimeSeries> {
    let mut combined = TimeSeries::new();
    let mut loaded = 0usize;
    for path in paths {
        match reader.read(path) {
            Ok(series) => {
                log::debug!("read {} rows from {}", series.len(), path.display());
                combined.extend(series);
                loaded += 1;
            }
            Err(e) => log::warn!("skipping instrument file: {}", e),
        }
    }
    log::info!("📖 Loaded {}/{} instrument files", loaded, paths.len());
    combined.ensure_ascending("combined instrument series")?;
    Ok(combined)
}

/// Supplies auxiliary series together with their join configuration.
pub trait AuxSourceLoader {
    fn load_sources(&self) -> Result<Vec<(AuxSourceConfig, TimeSeries)>>;
}

/// One auxiliary CSV file bound to a join configuration.
pub struct CsvAuxLoader {
    pub config: AuxSourceConfig,
    pub path: PathBuf,
    pub timestamp_column: String,
}

impl CsvAuxLoader {
    pub fn new(config: AuxSourceConfig, path: PathBuf) -> Self {
        Self {
            config,
            path,
            timestamp_column: "timestamp".to_string(),
        }
    }

    pub fn load(&self) -> Result<(AuxSourceConfig, TimeSeries)> {
        let reader = CsvInstrumentReader::comma(&self.timestamp_column);
        let series = reader.read(&self.path)?;
        Ok((self.config.clone(), series))
    }
}

/// A set of auxiliary CSV files. Loading skips files that fail to parse,
/// matching the per-file recovery of the instrument batch reader.
pub struct CsvAuxSourceSet {
    pub loaders: Vec<CsvAuxLoader>,
}

impl AuxSourceLoader for CsvAuxSourceSet {
    fn load_sources(&self) -> Result<Vec<(AuxSourceConfig, TimeSeries)>> {
        let mut sources = Vec::with_capacity(self.loaders.len());
        for loader in &self.loaders {
            match loader.load() {
                Ok(pair) => sources.push(pair),
                Err(e) => log::warn!("skipping auxiliary source: {}", e),
            }
        }
        Ok(sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::merge::{Direction, JoinStrategy};
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_csv_reader_types_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "data.csv",
            "timestamp,ch4,diag,note\n\
             2021-10-03 02:00:00,2000.5,0,\n\
             2021-10-03 02:00:01,2000.6,0,calibrating\n",
        );

        let series = CsvInstrumentReader::comma("timestamp").read(&path).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.records[0].number("ch4"), Some(2000.5));
        assert_eq!(series.records[0].get("note"), Some(&FieldValue::Null));
        assert_eq!(
            series.records[1].get("note"),
            Some(&FieldValue::Text("calibrating".to_string()))
        );
    }

    #[test]
    fn test_csv_reader_skips_bad_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "data.csv",
            "timestamp,ch4\n\
             2021-10-03 02:00:00,2000.5\n\
             garbage-timestamp,2000.6\n\
             2021-10-03 02:00:02,2000.7\n",
        );

        let series = CsvInstrumentReader::comma("timestamp").read(&path).unwrap();
        assert_eq!(series.len(), 2);
    }

    #[test]
    fn test_csv_reader_missing_timestamp_column_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "data.csv", "time,ch4\n2021-10-03 02:00:00,2.0\n");
        assert!(CsvInstrumentReader::comma("timestamp").read(&path).is_err());
    }

    #[test]
    fn test_li7810_reader_normalizes_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "analyzer.data",
            "Model: LI-7810\n\
             SN: TG10-01234\n\
             TIMESTAMP\tDIAG\tCH4\tCO2\tH2O\n\
             2021-10-03 02:00:00\t0\t2000.5\t415.2\t9000.1\n",
        );

        let series = Li7810Reader::new().read(&path).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series.records[0].number("ch4"), Some(2000.5));
        assert_eq!(series.records[0].number("diag"), Some(0.0));
        assert_eq!(series.records[0].number("h2o"), Some(9000.1));
    }

    #[test]
    fn test_batch_read_skips_unreadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_file(
            dir.path(),
            "good.csv",
            "timestamp,ch4\n2021-10-03 02:00:00,2000.5\n",
        );
        let missing = dir.path().join("missing.csv");

        let reader = CsvInstrumentReader::comma("timestamp");
        let series = read_instrument_files(&reader, &[good, missing]).unwrap();
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn test_batch_read_sorts_interleaved_files() {
        let dir = tempfile::tempdir().unwrap();
        let later = write_file(
            dir.path(),
            "later.csv",
            "timestamp,ch4\n\
             2021-10-03 03:00:00,2001.0\n\
             2021-10-03 03:00:01,2001.1\n",
        );
        let earlier = write_file(
            dir.path(),
            "earlier.csv",
            "timestamp,ch4\n\
             2021-10-03 02:00:00,2000.0\n\
             2021-10-03 02:00:01,2000.1\n",
        );

        let reader = CsvInstrumentReader::comma("timestamp");
        let series = read_instrument_files(&reader, &[later, earlier]).unwrap();
        assert_eq!(series.len(), 4);
        assert_eq!(series.records[0].number("ch4"), Some(2000.0));
        assert_eq!(series.records[3].number("ch4"), Some(2001.1));
    }

    #[test]
    fn test_aux_loader_returns_config_with_series() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "soil.csv",
            "timestamp,soil_temp\n2021-10-03 02:00:00,4.5\n",
        );
        let loader = CsvAuxLoader::new(
            AuxSourceConfig::new(
                "soil",
                JoinStrategy::ByTime {
                    direction: Direction::Nearest,
                    tolerance_s: 30,
                },
            ),
            path,
        );

        let (config, series) = loader.load().unwrap();
        assert_eq!(config.name, "soil");
        assert_eq!(series.len(), 1);
        assert_eq!(series.records[0].number("soil_temp"), Some(4.5));
    }
}
