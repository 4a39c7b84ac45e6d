//! Time-windowed merge engine folding auxiliary series into the primary series
//!
//! Each configured auxiliary source is applied sequentially to the running
//! merged series. Three join strategies are supported:
//!
//! - **by-time**: nearest-timestamp (asof) join within a tolerance, 1:1 on
//!   the primary side
//! - **by-id**: relational join on an identity column, no temporal alignment
//! - **by-time-and-id**: asof join applied per identity partition
//!
//! When an auxiliary column name collides with a primary column, the primary
//! value wins and the auxiliary duplicate is dropped for the whole merge.

use chrono::NaiveDateTime;
use std::collections::BTreeMap;

use crate::error::Result;
use super::series::{FieldValue, TimeSeries, TimeSeriesRecord};

/// Which side of the primary timestamp an asof match may come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Backward,
    Forward,
    Nearest,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Backward => "backward",
            Direction::Forward => "forward",
            Direction::Nearest => "nearest",
        }
    }

    pub fn from_str(raw: &str) -> Option<Self> {
        match raw {
            "backward" => Some(Direction::Backward),
            "forward" => Some(Direction::Forward),
            "nearest" => Some(Direction::Nearest),
            _ => None,
        }
    }
}

/// Closed set of join strategies an auxiliary source can be configured with.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinStrategy {
    /// Temporal nearest-join within `tolerance_s` seconds.
    ByTime { direction: Direction, tolerance_s: i64 },
    /// Relational join on `identity_column`.
    ///
    /// Intended for static per-identity attributes only: an identity group
    /// with more than one auxiliary row multiplies the matching primary rows.
    ById { identity_column: String },
    /// Temporal nearest-join applied independently per identity partition.
    ByTimeAndId {
        identity_column: String,
        direction: Direction,
        tolerance_s: i64,
    },
}

/// One auxiliary source: a display name plus its join configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AuxSourceConfig {
    pub name: String,
    pub strategy: JoinStrategy,
}

impl AuxSourceConfig {
    pub fn new(name: &str, strategy: JoinStrategy) -> Self {
        Self {
            name: name.to_string(),
            strategy,
        }
    }
}

/// Folds configured auxiliary sources into the primary series.
pub struct AsofMergeEngine;

impl AsofMergeEngine {
    pub fn new() -> Self {
        Self
    }

    /// Apply every source in order. Zero sources is a pass-through; a source
    /// with zero rows is skipped with a warning. Both sides must be
    /// ascending: unsorted-ascending input is re-sorted, descending input
    /// aborts the run.
    pub fn apply_all(
        &self,
        primary: TimeSeries,
        sources: Vec<(AuxSourceConfig, TimeSeries)>,
    ) -> Result<TimeSeries> {
        let mut merged = primary;
        merged.ensure_ascending("primary series")?;

        for (config, mut aux) in sources {
            if aux.is_empty() {
                log::warn!(
                    "auxiliary source '{}' produced no rows, skipping merge",
                    config.name
                );
                continue;
            }
            aux.ensure_ascending(&format!("auxiliary series '{}'", config.name))?;
            log::debug!(
                "merging auxiliary source '{}' ({} rows)",
                config.name,
                aux.len()
            );
            merged = merge_source(&merged, &aux, &config);
        }
        Ok(merged)
    }
}

impl Default for AsofMergeEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn merge_source(primary: &TimeSeries, aux: &TimeSeries, config: &AuxSourceConfig) -> TimeSeries {
    match &config.strategy {
        JoinStrategy::ByTime {
            direction,
            tolerance_s,
        } => {
            let columns = aux_columns(primary, aux);
            let delta_column = time_delta_column(&config.name);
            join_by_time(primary, aux, &columns, &delta_column, *direction, *tolerance_s)
        }
        JoinStrategy::ById { identity_column } => join_by_id(primary, aux, identity_column),
        JoinStrategy::ByTimeAndId {
            identity_column,
            direction,
            tolerance_s,
        } => join_by_time_and_id(
            primary,
            aux,
            &config.name,
            identity_column,
            *direction,
            *tolerance_s,
        ),
    }
}

/// Diagnostic column holding the signed seconds between a primary row and
/// its matched auxiliary row.
pub fn time_delta_column(source_name: &str) -> String {
    format!("{}_time_delta_s", source_name)
}

/// Auxiliary columns that survive the collision rule (primary wins).
fn aux_columns(primary: &TimeSeries, aux: &TimeSeries) -> Vec<String> {
    let primary_columns = primary.column_names();
    aux.column_names()
        .into_iter()
        .filter(|name| {
            let keep = !primary_columns.contains(name);
            if !keep {
                log::debug!("auxiliary column '{}' collides with primary, dropped", name);
            }
            keep
        })
        .collect()
}

/// Nearest qualifying auxiliary row for `at`, honoring direction and
/// tolerance. Tolerance is inclusive, so tolerance 0 only ever matches an
/// exactly equal timestamp.
fn find_asof(
    aux: &TimeSeries,
    at: NaiveDateTime,
    direction: Direction,
    tolerance_s: i64,
) -> Option<usize> {
    let within = |idx: usize| {
        let delta_ms = (aux.records[idx].timestamp - at).num_milliseconds().abs();
        delta_ms <= tolerance_s * 1000
    };

    // Last row with timestamp <= at, and first row with timestamp >= at.
    let below = aux
        .records
        .partition_point(|r| r.timestamp <= at)
        .checked_sub(1);
    let above = {
        let idx = aux.records.partition_point(|r| r.timestamp < at);
        (idx < aux.len()).then_some(idx)
    };

    let candidate = match direction {
        Direction::Backward => below,
        Direction::Forward => above,
        Direction::Nearest => match (below, above) {
            (Some(b), Some(a)) => {
                let below_gap = (at - aux.records[b].timestamp).num_milliseconds();
                let above_gap = (aux.records[a].timestamp - at).num_milliseconds();
                // Ties resolve to the earlier row.
                if below_gap <= above_gap {
                    Some(b)
                } else {
                    Some(a)
                }
            }
            (below, above) => below.or(above),
        },
    };
    candidate.filter(|&idx| within(idx))
}

fn join_by_time(
    primary: &TimeSeries,
    aux: &TimeSeries,
    columns: &[String],
    delta_column: &str,
    direction: Direction,
    tolerance_s: i64,
) -> TimeSeries {
    let mut out = Vec::with_capacity(primary.len());
    for record in &primary.records {
        let mut merged = record.clone();
        match find_asof(aux, record.timestamp, direction, tolerance_s) {
            Some(idx) => {
                let matched = &aux.records[idx];
                for column in columns {
                    let value = matched.get(column).cloned().unwrap_or(FieldValue::Null);
                    merged.set(column, value);
                }
                let delta_s =
                    (matched.timestamp - record.timestamp).num_milliseconds() as f64 / 1000.0;
                merged.set(delta_column, FieldValue::Float(delta_s));
            }
            None => {
                for column in columns {
                    merged.set(column, FieldValue::Null);
                }
                merged.set(delta_column, FieldValue::Null);
            }
        }
        out.push(merged);
    }
    TimeSeries::from_records(out)
}

fn identity_key(record: &TimeSeriesRecord, identity_column: &str) -> Option<String> {
    record.get(identity_column).and_then(FieldValue::as_key)
}

/// Relational join on the identity column. Rows fan out when an identity
/// group holds more than one auxiliary row; primary rows without a matching
/// group are kept with null auxiliary columns.
fn join_by_id(primary: &TimeSeries, aux: &TimeSeries, identity_column: &str) -> TimeSeries {
    let columns = aux_columns(primary, aux);

    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (idx, record) in aux.records.iter().enumerate() {
        if let Some(key) = identity_key(record, identity_column) {
            groups.entry(key).or_default().push(idx);
        }
    }

    let mut out = Vec::with_capacity(primary.len());
    for record in &primary.records {
        let matched = identity_key(record, identity_column)
            .and_then(|key| groups.get(&key))
            .filter(|idxs| !idxs.is_empty());
        match matched {
            Some(idxs) => {
                for &idx in idxs {
                    let mut merged = record.clone();
                    for column in &columns {
                        let value = aux.records[idx].get(column).cloned().unwrap_or(FieldValue::Null);
                        merged.set(column, value);
                    }
                    out.push(merged);
                }
            }
            None => {
                let mut merged = record.clone();
                for column in &columns {
                    merged.set(column, FieldValue::Null);
                }
                out.push(merged);
            }
        }
    }
    TimeSeries::from_records(out)
}

/// Asof join applied independently inside each identity partition, results
/// concatenated and re-sorted by timestamp.
fn join_by_time_and_id(
    primary: &TimeSeries,
    aux: &TimeSeries,
    source_name: &str,
    identity_column: &str,
    direction: Direction,
    tolerance_s: i64,
) -> TimeSeries {
    let columns = aux_columns(primary, aux);
    let delta_column = time_delta_column(source_name);

    let mut aux_partitions: BTreeMap<String, Vec<TimeSeriesRecord>> = BTreeMap::new();
    for record in &aux.records {
        if let Some(key) = identity_key(record, identity_column) {
            aux_partitions.entry(key).or_default().push(record.clone());
        }
    }

    let mut primary_partitions: BTreeMap<Option<String>, Vec<TimeSeriesRecord>> = BTreeMap::new();
    for record in &primary.records {
        let key = identity_key(record, identity_column);
        primary_partitions.entry(key).or_default().push(record.clone());
    }

    let empty = TimeSeries::new();
    let mut out = Vec::with_capacity(primary.len());
    for (key, records) in primary_partitions {
        let partition = TimeSeries::from_records(records);
        let aux_partition = key
            .as_ref()
            .and_then(|k| aux_partitions.get(k))
            .map(|records| TimeSeries::from_records(records.clone()))
            .unwrap_or_else(|| empty.clone());
        let joined = join_by_time(
            &partition,
            &aux_partition,
            &columns,
            &delta_column,
            direction,
            tolerance_s,
        );
        out.extend(joined.records);
    }
    out.sort_by_key(|r| r.timestamp);
    TimeSeries::from_records(out)
}
