//! Per-window data-quality predicates

use super::schedule::Window;
use super::series::{FieldValue, TimeSeries};

/// Why a window failed validation. Every triggered code is retained, not
/// just the first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReasonCode {
    NoData,
    InstrumentError,
    MissingColumn(String),
    Overlap,
    TooManyRows,
    TooFewRows,
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReasonCode::NoData => write!(f, "no data"),
            ReasonCode::InstrumentError => write!(f, "instrument error"),
            ReasonCode::MissingColumn(name) => write!(f, "missing column {}", name),
            ReasonCode::Overlap => write!(f, "overlap"),
            ReasonCode::TooManyRows => write!(f, "too many measurements"),
            ReasonCode::TooFewRows => write!(f, "too few measurements"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub reasons: Vec<ReasonCode>,
}

impl ValidationResult {
    pub fn reason_strings(&self) -> Vec<String> {
        self.reasons.iter().map(ReasonCode::to_string).collect()
    }

    /// Comma-joined reason codes, the form attached to annotated rows.
    pub fn flags_field(&self) -> String {
        self.reason_strings().join(",")
    }
}

/// Evaluates every quality predicate over a window's cycle slice.
///
/// Row-count bounds derive the expected count from the cycle duration and
/// the instrument sample interval, with a ±10% allowance for clock drift
/// and dropped samples.
pub struct WindowValidator {
    diagnostic_column: String,
    required_columns: Vec<String>,
    sample_interval_s: f64,
}

impl WindowValidator {
    pub fn new(
        diagnostic_column: &str,
        required_columns: Vec<String>,
        sample_interval_s: f64,
    ) -> Self {
        Self {
            diagnostic_column: diagnostic_column.to_string(),
            required_columns,
            sample_interval_s,
        }
    }

    /// Validate one window against the merged series.
    ///
    /// Returns the validation result and the cycle slice with `is_valid` and
    /// `quality_flags` annotations written onto every row. Predicates do not
    /// short-circuit: an empty overlapping window reports both conditions.
    pub fn validate(&self, window: &Window, merged: &TimeSeries) -> (ValidationResult, TimeSeries) {
        let mut slice = merged.slice_range(window.cycle_start, window.cycle_end);
        let mut reasons = Vec::new();

        if slice.is_empty() {
            reasons.push(ReasonCode::NoData);
        }
        if slice.column_sum(&self.diagnostic_column) != 0.0 {
            reasons.push(ReasonCode::InstrumentError);
        }
        for column in &self.required_columns {
            if !slice.has_column(column) {
                reasons.push(ReasonCode::MissingColumn(column.clone()));
            }
        }
        if window.overlap {
            reasons.push(ReasonCode::Overlap);
        }

        let expected = window.cycle_duration_s() as f64 / self.sample_interval_s;
        let actual = slice.len() as f64;
        if actual > expected * 1.1 {
            reasons.push(ReasonCode::TooManyRows);
        }
        if actual < expected * 0.9 {
            reasons.push(ReasonCode::TooFewRows);
        }

        let result = ValidationResult {
            is_valid: reasons.is_empty(),
            reasons,
        };

        let flags = result.flags_field();
        for record in &mut slice.records {
            record.set("is_valid", FieldValue::Bool(result.is_valid));
            record.set("quality_flags", FieldValue::Text(flags.clone()));
        }
        (result, slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::series::{parse_timestamp, TimeSeriesRecord};
    use chrono::{Duration, NaiveDateTime};

    fn ts(raw: &str) -> NaiveDateTime {
        parse_timestamp(raw).unwrap()
    }

    fn test_window(overlap: bool) -> Window {
        Window {
            chamber_id: "1".to_string(),
            cycle_start: ts("2021-10-03 02:00:00"),
            fit_start: ts("2021-10-03 02:02:00"),
            fit_end: ts("2021-10-03 02:05:00"),
            cycle_end: ts("2021-10-03 02:06:00"),
            overlap,
        }
    }

    /// 1 Hz series spanning the whole cycle with clean diagnostics.
    fn clean_series(diag: f64) -> TimeSeries {
        let start = ts("2021-10-03 02:00:00");
        let records = (0..=360)
            .map(|i| {
                TimeSeriesRecord::new(start + Duration::seconds(i))
                    .with_field("ch4", FieldValue::Float(2.0))
                    .with_field("diag", FieldValue::Float(if i == 180 { diag } else { 0.0 }))
                    .with_field("air_temperature", FieldValue::Float(10.0))
            })
            .collect();
        TimeSeries::from_records(records)
    }

    fn validator() -> WindowValidator {
        WindowValidator::new("diag", vec!["air_temperature".to_string()], 1.0)
    }

    #[test]
    fn test_clean_window_is_valid() {
        let (result, slice) = validator().validate(&test_window(false), &clean_series(0.0));
        assert!(result.is_valid);
        assert!(result.reasons.is_empty());
        assert_eq!(slice.len(), 361);
        assert_eq!(
            slice.records[0].get("is_valid"),
            Some(&FieldValue::Bool(true))
        );
        assert_eq!(
            slice.records[0].get("quality_flags"),
            Some(&FieldValue::Text(String::new()))
        );
    }

    #[test]
    fn test_empty_window_reports_no_data() {
        let (result, slice) = validator().validate(&test_window(false), &TimeSeries::new());
        assert!(!result.is_valid);
        assert!(result.reasons.contains(&ReasonCode::NoData));
        assert!(result.reasons.contains(&ReasonCode::TooFewRows));
        assert!(slice.is_empty());
    }

    #[test]
    fn test_diagnostic_flag_fails_window() {
        let (result, slice) = validator().validate(&test_window(false), &clean_series(8.0));
        assert!(!result.is_valid);
        assert_eq!(result.reasons, vec![ReasonCode::InstrumentError]);
        assert_eq!(
            slice.records[0].get("quality_flags"),
            Some(&FieldValue::Text("instrument error".to_string()))
        );
    }

    #[test]
    fn test_missing_required_column() {
        let validator = WindowValidator::new("diag", vec!["snow_depth".to_string()], 1.0);
        let (result, _) = validator.validate(&test_window(false), &clean_series(0.0));
        assert_eq!(
            result.reasons,
            vec![ReasonCode::MissingColumn("snow_depth".to_string())]
        );
    }

    #[test]
    fn test_reasons_accumulate_without_short_circuit() {
        let (result, _) = validator().validate(&test_window(true), &TimeSeries::new());
        assert_eq!(
            result.reasons,
            vec![
                ReasonCode::NoData,
                ReasonCode::MissingColumn("air_temperature".to_string()),
                ReasonCode::Overlap,
                ReasonCode::TooFewRows,
            ]
        );
    }

    #[test]
    fn test_row_count_bounds() {
        // Expected 360 rows at 1 Hz; 361 rows sits inside the +10% band.
        let (result, _) = validator().validate(&test_window(false), &clean_series(0.0));
        assert!(result.is_valid);

        // Drop to half rate: 181 rows < 324 lower bound.
        let start = ts("2021-10-03 02:00:00");
        let sparse = TimeSeries::from_records(
            (0..=180)
                .map(|i| {
                    TimeSeriesRecord::new(start + Duration::seconds(i * 2))
                        .with_field("diag", FieldValue::Float(0.0))
                        .with_field("air_temperature", FieldValue::Float(10.0))
                })
                .collect(),
        );
        let (result, _) = validator().validate(&test_window(false), &sparse);
        assert_eq!(result.reasons, vec![ReasonCode::TooFewRows]);
    }
}
