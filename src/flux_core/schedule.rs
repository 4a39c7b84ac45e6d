//! Rotation schedule expansion into measurement window catalogs

use chrono::{Duration, NaiveDateTime, NaiveTime};
use std::path::Path;

use crate::error::{FluxError, Result};
use super::series::{parse_timestamp, TimeSeries};

/// One row of the chamber rotation template: second offsets from the cycle
/// anchor plus the chamber the row measures.
#[derive(Debug, Clone, PartialEq)]
pub struct RotationEntry {
    pub start_of_measurement_s: i64,
    pub end_of_measurement_s: i64,
    pub end_of_cycle_s: i64,
    pub chamber_id: String,
}

impl RotationEntry {
    pub fn new(
        start_of_measurement_s: i64,
        end_of_measurement_s: i64,
        end_of_cycle_s: i64,
        chamber_id: &str,
    ) -> Self {
        Self {
            start_of_measurement_s,
            end_of_measurement_s,
            end_of_cycle_s,
            chamber_id: chamber_id.to_string(),
        }
    }

    /// Offsets must stay ordered so the generated window timestamps are.
    fn validate(&self) -> std::result::Result<(), String> {
        if self.start_of_measurement_s < 0 {
            return Err(format!(
                "chamber {}: negative measurement start offset",
                self.chamber_id
            ));
        }
        if self.start_of_measurement_s > self.end_of_measurement_s
            || self.end_of_measurement_s > self.end_of_cycle_s
        {
            return Err(format!(
                "chamber {}: offsets must satisfy start <= end <= cycle end ({} / {} / {})",
                self.chamber_id,
                self.start_of_measurement_s,
                self.end_of_measurement_s,
                self.end_of_cycle_s
            ));
        }
        Ok(())
    }

    /// Load an ordered rotation template from a CSV file with columns
    /// `start_of_measurement_s,end_of_measurement_s,end_of_cycle_s,chamber_id`.
    /// A malformed template is fatal: a schedule typo silently shifting every
    /// window is worse than a refused run.
    pub fn load_template(path: &Path) -> Result<Vec<RotationEntry>> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| FluxError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let mut template = Vec::new();
        for (line, row) in reader.deserialize::<TemplateRow>().enumerate() {
            let row = row.map_err(|e| FluxError::Template(format!("row {}: {}", line + 1, e)))?;
            let entry = RotationEntry::new(
                row.start_of_measurement_s,
                row.end_of_measurement_s,
                row.end_of_cycle_s,
                &row.chamber_id,
            );
            entry.validate().map_err(FluxError::Template)?;
            template.push(entry);
        }
        log::info!("Loaded rotation template with {} rows", template.len());
        Ok(template)
    }
}

#[derive(serde::Deserialize)]
struct TemplateRow {
    start_of_measurement_s: i64,
    end_of_measurement_s: i64,
    end_of_cycle_s: i64,
    chamber_id: String,
}

/// A single measurement event.
///
/// `[cycle_start, cycle_end]` selects every row belonging to the event;
/// `[fit_start, fit_end]` is the sub-range the regression runs over.
/// Immutable after the catalog builder sets `overlap`.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub chamber_id: String,
    pub cycle_start: NaiveDateTime,
    pub fit_start: NaiveDateTime,
    pub fit_end: NaiveDateTime,
    pub cycle_end: NaiveDateTime,
    pub overlap: bool,
}

impl Window {
    fn from_anchor(anchor: NaiveDateTime, entry: &RotationEntry) -> Self {
        Self {
            chamber_id: entry.chamber_id.clone(),
            cycle_start: anchor,
            fit_start: anchor + Duration::seconds(entry.start_of_measurement_s),
            fit_end: anchor + Duration::seconds(entry.end_of_measurement_s),
            cycle_end: anchor + Duration::seconds(entry.end_of_cycle_s),
            overlap: false,
        }
    }

    pub fn cycle_duration_s(&self) -> i64 {
        (self.cycle_end - self.cycle_start).num_seconds()
    }
}

/// Expands a rotation template over a set of anchor timestamps into the
/// ordered window catalog.
pub struct WindowCatalogBuilder {
    template: Vec<RotationEntry>,
}

impl WindowCatalogBuilder {
    pub fn new(template: Vec<RotationEntry>) -> Self {
        Self { template }
    }

    /// One window per (anchor, template row) pair, sorted by cycle start,
    /// with overlapping neighbours marked.
    ///
    /// Overlap marking is asymmetric on purpose: when a window's cycle runs
    /// into the next one, only the earlier window is flagged. An empty anchor
    /// set or template yields an empty catalog, which callers treat as
    /// "nothing to process".
    pub fn build(&self, anchors: &[NaiveDateTime]) -> Vec<Window> {
        let mut windows: Vec<Window> = Vec::with_capacity(anchors.len() * self.template.len());
        for &anchor in anchors {
            for entry in &self.template {
                windows.push(Window::from_anchor(anchor, entry));
            }
        }
        windows.sort_by_key(|w| w.cycle_start);

        for i in 0..windows.len().saturating_sub(1) {
            if windows[i].cycle_end > windows[i + 1].cycle_start {
                windows[i].overlap = true;
            }
        }
        windows
    }

    /// One midnight anchor per distinct calendar date in the primary series,
    /// for daily rotation templates.
    pub fn anchors_from_series(series: &TimeSeries) -> Vec<NaiveDateTime> {
        series
            .distinct_dates()
            .into_iter()
            .map(|date| date.and_time(NaiveTime::MIN))
            .collect()
    }
}

/// Read explicit event anchors from a CSV file with a `timestamp` column.
/// Unparseable rows are skipped with a warning.
pub fn read_anchor_file(path: &Path) -> Result<Vec<NaiveDateTime>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| FluxError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let headers = reader
        .headers()
        .map_err(|e| FluxError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
        .clone();
    let ts_index = headers
        .iter()
        .position(|h| h == "timestamp")
        .ok_or_else(|| FluxError::Parse {
            path: path.to_path_buf(),
            reason: "missing 'timestamp' column".to_string(),
        })?;

    let mut anchors = Vec::new();
    for row in reader.records() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                log::warn!("skipping malformed anchor row in {}: {}", path.display(), e);
                continue;
            }
        };
        match row.get(ts_index).and_then(parse_timestamp) {
            Some(anchor) => anchors.push(anchor),
            None => log::warn!(
                "skipping anchor row with unparseable timestamp in {}",
                path.display()
            ),
        }
    }
    anchors.sort();
    Ok(anchors)
}
