//! End-to-end batch orchestration
//!
//! One run processes one bounded time range: catalog, merge, validate,
//! estimate, summarize. Every stage fully materializes its output before the
//! next begins.

use chrono::NaiveDateTime;

use crate::error::{FluxError, Result};
use super::estimate::FluxEstimator;
use super::merge::{AsofMergeEngine, AuxSourceConfig};
use super::schedule::WindowCatalogBuilder;
use super::series::TimeSeries;
use super::summary::{OutputRecord, Summarizer};
use super::validate::WindowValidator;

/// Owns the stage components for one batch run.
pub struct FluxPipeline {
    catalog: WindowCatalogBuilder,
    merger: AsofMergeEngine,
    validator: WindowValidator,
    estimator: FluxEstimator,
    summarizer: Summarizer,
}

impl FluxPipeline {
    pub fn new(
        catalog: WindowCatalogBuilder,
        validator: WindowValidator,
        estimator: FluxEstimator,
    ) -> Self {
        Self {
            catalog,
            merger: AsofMergeEngine::new(),
            validator,
            estimator,
            summarizer: Summarizer::new(),
        }
    }

    /// Run the full pipeline over one bounded time range.
    ///
    /// An empty window catalog is "nothing to process" and returns an empty
    /// result. A non-empty catalog where no window contains any data aborts
    /// with [`FluxError::EmptyResult`], since a scheduled unattended run that
    /// silently produces nothing is indistinguishable from a broken one.
    pub fn run(
        &self,
        primary: TimeSeries,
        aux_sources: Vec<(AuxSourceConfig, TimeSeries)>,
        anchors: &[NaiveDateTime],
    ) -> Result<Vec<OutputRecord>> {
        let windows = self.catalog.build(anchors);
        if windows.is_empty() {
            log::warn!("rotation produced no measurement windows, nothing to process");
            return Ok(Vec::new());
        }
        log::info!(
            "🗓️ {} measurement windows from {} anchors",
            windows.len(),
            anchors.len()
        );

        let merged = self.merger.apply_all(primary, aux_sources)?;
        log::info!("Merged series holds {} rows", merged.len());

        let mut outputs = Vec::with_capacity(windows.len());
        let mut any_rows = false;
        let mut invalid = 0usize;
        for window in &windows {
            let (validation, annotated) = self.validator.validate(window, &merged);
            any_rows |= !annotated.is_empty();
            if !validation.is_valid {
                invalid += 1;
            }
            let gases = self.estimator.estimate(window, &merged, &validation);
            outputs.push(
                self.summarizer
                    .summarize(window, &annotated, &validation, gases),
            );
        }

        if !any_rows {
            return Err(FluxError::EmptyResult);
        }
        log::info!(
            "✅ Summarized {} windows ({} flagged invalid)",
            outputs.len(),
            invalid
        );
        Ok(outputs)
    }
}
