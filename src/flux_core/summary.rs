//! Window summarization - collapses each measurement event to one record

use chrono::NaiveDateTime;
use serde_json::{json, Map, Value};

use super::estimate::FluxRecord;
use super::schedule::Window;
use super::series::{TIMESTAMP_FORMAT, TimeSeries};
use super::validate::ValidationResult;

/// One output row per window: event identity, validity, and the per-species
/// flux triplets. The raw high-frequency concentration and covariate columns
/// are not carried over, keeping the output one audit row per event.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRecord {
    pub timestamp: NaiveDateTime,
    pub chamber_id: String,
    pub is_valid: bool,
    pub reasons: Vec<String>,
    pub gases: Vec<FluxRecord>,
}

impl OutputRecord {
    /// Flat JSON object with `{species}_slope`, `{species}_pearsons_r`,
    /// `{species}_flux` columns per species.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert(
            "timestamp".to_string(),
            json!(self.timestamp.format(TIMESTAMP_FORMAT).to_string()),
        );
        map.insert("chamber_id".to_string(), json!(self.chamber_id));
        map.insert("is_valid".to_string(), json!(self.is_valid));
        map.insert("quality_flags".to_string(), json!(self.reasons.join(",")));
        for gas in &self.gases {
            let prefix = gas.species.column();
            map.insert(format!("{}_slope", prefix), json!(gas.slope));
            map.insert(format!("{}_pearsons_r", prefix), json!(gas.pearsons_r));
            map.insert(format!("{}_flux", prefix), json!(gas.flux));
        }
        Value::Object(map)
    }
}

/// Collapses a window's annotated cycle slice into a single output record.
pub struct Summarizer;

impl Summarizer {
    pub fn new() -> Self {
        Self
    }

    /// One record per window, invalid and empty windows included so the
    /// output series stays complete for audit. The record's timestamp is the
    /// first annotated row's; an empty slice falls back to the window's
    /// cycle start.
    pub fn summarize(
        &self,
        window: &Window,
        annotated: &TimeSeries,
        validation: &ValidationResult,
        gases: Vec<FluxRecord>,
    ) -> OutputRecord {
        let timestamp = annotated
            .records
            .first()
            .map(|r| r.timestamp)
            .unwrap_or(window.cycle_start);
        OutputRecord {
            timestamp,
            chamber_id: window.chamber_id.clone(),
            is_valid: validation.is_valid,
            reasons: validation.reason_strings(),
            gases,
        }
    }
}

impl Default for Summarizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::estimate::Species;
    use super::super::series::{parse_timestamp, FieldValue, TimeSeriesRecord};
    use super::super::validate::ReasonCode;

    fn ts(raw: &str) -> NaiveDateTime {
        parse_timestamp(raw).unwrap()
    }

    fn test_window() -> Window {
        Window {
            chamber_id: "3".to_string(),
            cycle_start: ts("2021-10-03 02:00:00"),
            fit_start: ts("2021-10-03 02:02:00"),
            fit_end: ts("2021-10-03 02:05:00"),
            cycle_end: ts("2021-10-03 02:06:00"),
            overlap: false,
        }
    }

    fn ch4_record() -> FluxRecord {
        FluxRecord {
            species: Species::Ch4,
            slope: Some(0.05),
            pearsons_r: Some(0.99),
            flux: Some(0.0123),
            is_valid: true,
        }
    }

    #[test]
    fn test_summary_uses_first_row_timestamp() {
        let annotated = TimeSeries::from_records(vec![
            TimeSeriesRecord::new(ts("2021-10-03 02:00:04"))
                .with_field("ch4", FieldValue::Float(2.0)),
            TimeSeriesRecord::new(ts("2021-10-03 02:00:05"))
                .with_field("ch4", FieldValue::Float(2.1)),
        ]);
        let validation = ValidationResult {
            is_valid: true,
            reasons: Vec::new(),
        };
        let record = Summarizer::new().summarize(
            &test_window(),
            &annotated,
            &validation,
            vec![ch4_record()],
        );

        assert_eq!(record.timestamp, ts("2021-10-03 02:00:04"));
        assert_eq!(record.chamber_id, "3");
        assert!(record.is_valid);
    }

    #[test]
    fn test_empty_window_still_summarized_at_cycle_start() {
        let validation = ValidationResult {
            is_valid: false,
            reasons: vec![ReasonCode::NoData],
        };
        let record = Summarizer::new().summarize(
            &test_window(),
            &TimeSeries::new(),
            &validation,
            vec![FluxRecord {
                species: Species::Ch4,
                slope: None,
                pearsons_r: None,
                flux: None,
                is_valid: false,
            }],
        );

        assert_eq!(record.timestamp, ts("2021-10-03 02:00:00"));
        assert!(!record.is_valid);
        assert_eq!(record.reasons, vec!["no data".to_string()]);
    }

    #[test]
    fn test_json_shape_strips_raw_columns() {
        let annotated = TimeSeries::from_records(vec![TimeSeriesRecord::new(
            ts("2021-10-03 02:00:00"),
        )
        .with_field("ch4", FieldValue::Float(2.0))
        .with_field("air_temperature", FieldValue::Float(10.0))]);
        let validation = ValidationResult {
            is_valid: true,
            reasons: Vec::new(),
        };
        let record = Summarizer::new().summarize(
            &test_window(),
            &annotated,
            &validation,
            vec![ch4_record()],
        );
        let json = record.to_json();

        assert_eq!(json["timestamp"], "2021-10-03 02:00:00");
        assert_eq!(json["chamber_id"], "3");
        assert_eq!(json["is_valid"], true);
        assert_eq!(json["ch4_slope"], 0.05);
        assert_eq!(json["ch4_pearsons_r"], 0.99);
        assert_eq!(json["ch4_flux"], 0.0123);
        // Raw high-frequency columns do not leak into the summary.
        assert!(json.get("air_temperature").is_none());
        assert!(json.get("ch4").is_none());
    }
}
