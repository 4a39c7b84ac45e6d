//! Row-based time series model shared by every pipeline stage

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{FluxError, Result};

/// Canonical timestamp format for all delimited input and JSONL output.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a timestamp in the canonical format, tolerating the ISO 'T'
/// separator some loggers emit.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

/// A single named value in an observation row.
///
/// `Null` is what an auxiliary join writes when no record qualified within
/// tolerance, so downstream consumers see a stable column set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Float(f64),
    Int(i64),
    Text(String),
    Bool(bool),
    Null,
}

impl FieldValue {
    /// Widen numeric variants to f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Render the value as a grouping key for identity joins.
    /// `Null` never forms a group.
    pub fn as_key(&self) -> Option<String> {
        match self {
            FieldValue::Float(v) => Some(v.to_string()),
            FieldValue::Int(v) => Some(v.to_string()),
            FieldValue::Text(v) => Some(v.clone()),
            FieldValue::Bool(v) => Some(v.to_string()),
            FieldValue::Null => None,
        }
    }
}

/// One observation instant: a timestamp plus named field values.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesRecord {
    pub timestamp: NaiveDateTime,
    pub fields: BTreeMap<String, FieldValue>,
}

impl TimeSeriesRecord {
    pub fn new(timestamp: NaiveDateTime) -> Self {
        Self {
            timestamp,
            fields: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, name: &str, value: FieldValue) {
        self.fields.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Numeric view of a field, if present and numeric.
    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(FieldValue::as_f64)
    }

    /// Builder-style field assignment, mostly useful in tests.
    pub fn with_field(mut self, name: &str, value: FieldValue) -> Self {
        self.set(name, value);
        self
    }
}

/// An ordered sequence of observation rows.
///
/// Invariant: timestamps are non-decreasing. Operations that search or join
/// by time call [`TimeSeries::ensure_ascending`] first; an
/// ascending-but-unsorted series is re-sorted with a warning, a descending
/// series aborts the run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries {
    pub records: Vec<TimeSeriesRecord>,
}

impl TimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<TimeSeriesRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn push(&mut self, record: TimeSeriesRecord) {
        self.records.push(record);
    }

    /// Append another series' rows (ordering is re-checked by callers).
    pub fn extend(&mut self, other: TimeSeries) {
        self.records.extend(other.records);
    }

    /// Union of field names across all rows.
    pub fn column_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        for record in &self.records {
            for name in record.fields.keys() {
                names.insert(name.clone());
            }
        }
        names
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.records.iter().any(|r| r.fields.contains_key(name))
    }

    /// Verify the non-decreasing timestamp invariant.
    ///
    /// A series sorted strictly backwards signals structural timestamp
    /// corruption upstream and is fatal. Anything else out of order is
    /// assumed to be interleaved file reads and is re-sorted in place.
    pub fn ensure_ascending(&mut self, context: &str) -> Result<()> {
        let ascending = self
            .records
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp);
        if ascending {
            return Ok(());
        }

        let descending = self
            .records
            .windows(2)
            .all(|pair| pair[0].timestamp >= pair[1].timestamp);
        if descending {
            return Err(FluxError::OrderingViolation {
                context: context.to_string(),
            });
        }

        log::warn!("{} has out-of-order timestamps, re-sorting", context);
        self.records.sort_by_key(|r| r.timestamp);
        Ok(())
    }

    /// Rows with `start <= timestamp <= end`, located by binary search.
    /// Requires the ascending invariant.
    pub fn slice_range(&self, start: NaiveDateTime, end: NaiveDateTime) -> TimeSeries {
        let lo = self.records.partition_point(|r| r.timestamp < start);
        let hi = self.records.partition_point(|r| r.timestamp <= end);
        TimeSeries::from_records(self.records[lo..hi].to_vec())
    }

    /// Distinct calendar dates present in the series, ascending.
    pub fn distinct_dates(&self) -> Vec<NaiveDate> {
        let dates: BTreeSet<NaiveDate> =
            self.records.iter().map(|r| r.timestamp.date()).collect();
        dates.into_iter().collect()
    }

    /// Sum over the numeric values of a column. Missing or non-numeric
    /// entries contribute nothing.
    pub fn column_sum(&self, name: &str) -> f64 {
        self.records.iter().filter_map(|r| r.number(name)).sum()
    }

    /// Mean over the numeric values of a column, `None` when the column has
    /// no numeric entries at all.
    pub fn column_mean(&self, name: &str) -> Option<f64> {
        let values: Vec<f64> = self.records.iter().filter_map(|r| r.number(name)).collect();
        if values.is_empty() {
            return None;
        }
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(raw: &str) -> NaiveDateTime {
        parse_timestamp(raw).unwrap()
    }

    fn record_at(raw: &str, ch4: f64) -> TimeSeriesRecord {
        TimeSeriesRecord::new(ts(raw)).with_field("ch4", FieldValue::Float(ch4))
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert_eq!(
            parse_timestamp("2021-10-03 02:00:00"),
            parse_timestamp("2021-10-03T02:00:00")
        );
        assert!(parse_timestamp("03/10/2021").is_none());
    }

    #[test]
    fn test_ensure_ascending_sorted_is_noop() {
        let mut series = TimeSeries::from_records(vec![
            record_at("2021-10-03 02:00:00", 2.0),
            record_at("2021-10-03 02:00:01", 2.1),
        ]);
        let before = series.clone();
        series.ensure_ascending("test").unwrap();
        assert_eq!(series, before);
    }

    #[test]
    fn test_ensure_ascending_resorts_shuffled() {
        let mut series = TimeSeries::from_records(vec![
            record_at("2021-10-03 02:00:02", 2.2),
            record_at("2021-10-03 02:00:00", 2.0),
            record_at("2021-10-03 02:00:01", 2.1),
        ]);
        series.ensure_ascending("test").unwrap();
        let values: Vec<f64> = series.records.iter().filter_map(|r| r.number("ch4")).collect();
        assert_eq!(values, vec![2.0, 2.1, 2.2]);
    }

    #[test]
    fn test_ensure_ascending_rejects_descending() {
        let mut series = TimeSeries::from_records(vec![
            record_at("2021-10-03 02:00:02", 2.2),
            record_at("2021-10-03 02:00:01", 2.1),
            record_at("2021-10-03 02:00:00", 2.0),
        ]);
        let err = series.ensure_ascending("gas analyzer").unwrap_err();
        assert!(err.to_string().contains("gas analyzer"));
    }

    #[test]
    fn test_slice_range_is_inclusive() {
        let series = TimeSeries::from_records(vec![
            record_at("2021-10-03 02:00:00", 2.0),
            record_at("2021-10-03 02:00:01", 2.1),
            record_at("2021-10-03 02:00:02", 2.2),
            record_at("2021-10-03 02:00:03", 2.3),
        ]);
        let slice = series.slice_range(ts("2021-10-03 02:00:01"), ts("2021-10-03 02:00:02"));
        assert_eq!(slice.len(), 2);
        assert_eq!(slice.records[0].number("ch4"), Some(2.1));
        assert_eq!(slice.records[1].number("ch4"), Some(2.2));
    }

    #[test]
    fn test_slice_range_outside_data_is_empty() {
        let series = TimeSeries::from_records(vec![record_at("2021-10-03 02:00:00", 2.0)]);
        let slice = series.slice_range(ts("2021-10-03 03:00:00"), ts("2021-10-03 04:00:00"));
        assert!(slice.is_empty());
    }

    #[test]
    fn test_distinct_dates() {
        let series = TimeSeries::from_records(vec![
            record_at("2021-10-03 02:00:00", 2.0),
            record_at("2021-10-03 23:59:59", 2.1),
            record_at("2021-10-04 00:00:00", 2.2),
        ]);
        let dates = series.distinct_dates();
        assert_eq!(dates.len(), 2);
        assert_eq!(dates[0].to_string(), "2021-10-03");
        assert_eq!(dates[1].to_string(), "2021-10-04");
    }

    #[test]
    fn test_column_stats_skip_non_numeric() {
        let mut series = TimeSeries::from_records(vec![
            record_at("2021-10-03 02:00:00", 2.0),
            record_at("2021-10-03 02:00:01", 4.0),
        ]);
        series.records[0].set("note", FieldValue::Text("calibration".to_string()));
        assert_eq!(series.column_sum("ch4"), 6.0);
        assert_eq!(series.column_mean("ch4"), Some(3.0));
        assert_eq!(series.column_mean("note"), None);
        assert_eq!(series.column_mean("absent"), None);
    }
}
