//! Per-window regression and ideal-gas flux estimation

use chrono::{Datelike, NaiveDateTime, Timelike};
use linregress::{FormulaRegressionBuilder, RegressionDataBuilder};
use std::collections::HashMap;

use crate::config::RunConfig;
use super::schedule::Window;
use super::series::TimeSeries;
use super::validate::ValidationResult;

/// Universal gas constant, J/(mol*K).
const GAS_CONSTANT: f64 = 8.314;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Gas species the estimator knows how to convert to a mass flux.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Species {
    Ch4,
    Co2,
    H2o,
}

impl Species {
    /// Concentration column name in the merged series, and the prefix of the
    /// output columns.
    pub fn column(&self) -> &'static str {
        match self {
            Species::Ch4 => "ch4",
            Species::Co2 => "co2",
            Species::H2o => "h2o",
        }
    }

    /// Molar mass, g/mol.
    pub fn molar_mass(&self) -> f64 {
        match self {
            Species::Ch4 => 16.0,
            Species::Co2 => 44.0,
            Species::H2o => 18.0,
        }
    }

    /// Normalizes the instrument's concentration unit to ppm (CH4 analyzers
    /// report ppb).
    pub fn conversion(&self) -> f64 {
        match self {
            Species::Ch4 => 1000.0,
            Species::Co2 => 1.0,
            Species::H2o => 1.0,
        }
    }

    pub fn all() -> [Species; 3] {
        [Species::Ch4, Species::Co2, Species::H2o]
    }

    pub fn from_str(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "ch4" => Some(Species::Ch4),
            "co2" => Some(Species::Co2),
            "h2o" => Some(Species::H2o),
            _ => None,
        }
    }
}

/// Regression and flux outcome for one window and one species.
#[derive(Debug, Clone, PartialEq)]
pub struct FluxRecord {
    pub species: Species,
    /// Concentration change per second.
    pub slope: Option<f64>,
    /// Absolute Pearson correlation of the fit; diagnostic only.
    pub pearsons_r: Option<f64>,
    /// Mass flux, mg/(m^2*h) scale per the ideal-gas conversion.
    pub flux: Option<f64>,
    pub is_valid: bool,
}

/// Fixed covariate values used when measurements are absent or disabled.
#[derive(Debug, Clone)]
pub struct CovariateDefaults {
    pub temperature_c: f64,
    pub pressure_hpa: f64,
    pub snow_depth_m: f64,
}

/// Merged-series column names the covariates are read from.
#[derive(Debug, Clone)]
pub struct CovariateColumns {
    pub temperature: String,
    pub pressure: String,
    pub snow_depth: String,
}

/// Computes regression slope, correlation, and physical flux per window per
/// species. Invalid windows still produce flagged records.
pub struct FluxEstimator {
    species: Vec<Species>,
    chamber_heights_m: HashMap<String, f64>,
    default_chamber_height_m: f64,
    defaults: CovariateDefaults,
    columns: CovariateColumns,
    use_default_covariates: bool,
}

impl FluxEstimator {
    pub fn new(
        species: Vec<Species>,
        chamber_heights_m: HashMap<String, f64>,
        default_chamber_height_m: f64,
        defaults: CovariateDefaults,
        columns: CovariateColumns,
        use_default_covariates: bool,
    ) -> Self {
        Self {
            species,
            chamber_heights_m,
            default_chamber_height_m,
            defaults,
            columns,
            use_default_covariates,
        }
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(
            config.species.clone(),
            config.chamber_heights_m.clone(),
            config.default_chamber_height_m,
            CovariateDefaults {
                temperature_c: config.default_temperature_c,
                pressure_hpa: config.default_pressure_hpa,
                snow_depth_m: config.default_snow_depth_m,
            },
            CovariateColumns {
                temperature: config.temperature_column.clone(),
                pressure: config.pressure_column.clone(),
                snow_depth: config.snow_depth_column.clone(),
            },
            config.use_default_covariates,
        )
    }

    /// Estimate every configured species over the window's fit range.
    ///
    /// A fit range with fewer than two usable rows yields null slope,
    /// correlation, and flux; it never fails the run.
    pub fn estimate(
        &self,
        window: &Window,
        merged: &TimeSeries,
        validation: &ValidationResult,
    ) -> Vec<FluxRecord> {
        let fit = merged.slice_range(window.fit_start, window.fit_end);

        let temperature_c = self.covariate(&fit, &self.columns.temperature, self.defaults.temperature_c);
        let pressure_hpa = self.covariate(&fit, &self.columns.pressure, self.defaults.pressure_hpa);
        let snow_depth_m = self.covariate(&fit, &self.columns.snow_depth, self.defaults.snow_depth_m);

        let chamber_height_m = self
            .chamber_heights_m
            .get(&window.chamber_id)
            .copied()
            .unwrap_or(self.default_chamber_height_m);
        // Deep snowpack can top the chamber, driving this negative. Kept
        // unclamped so such events stay visible in the output.
        let effective_height_m = chamber_height_m - snow_depth_m;

        self.species
            .iter()
            .map(|&species| {
                let (slope, pearsons_r) = fit_concentration_trend(&fit, species.column());
                let flux = slope.map(|slope| {
                    flux_from_slope(slope, species, effective_height_m, temperature_c, pressure_hpa)
                });
                FluxRecord {
                    species,
                    slope,
                    pearsons_r,
                    flux,
                    is_valid: validation.is_valid,
                }
            })
            .collect()
    }

    fn covariate(&self, fit: &TimeSeries, column: &str, default: f64) -> f64 {
        if self.use_default_covariates {
            return default;
        }
        match fit.column_mean(column) {
            Some(mean) => mean,
            None => {
                log::warn!(
                    "covariate column '{}' missing from fit window, falling back to default {}",
                    column,
                    default
                );
                default
            }
        }
    }
}

/// Continuous time coordinate in days: day ordinal plus fraction of day.
/// Stays monotonic across midnight, unlike seconds-since-window-start
/// rebuilt per file.
fn day_fraction_coordinate(timestamp: NaiveDateTime) -> f64 {
    let seconds = timestamp.num_seconds_from_midnight() as f64
        + timestamp.nanosecond() as f64 / 1_000_000_000.0;
    timestamp.num_days_from_ce() as f64 + seconds / SECONDS_PER_DAY
}

/// OLS slope (per second) and absolute Pearson correlation of a species
/// concentration against the continuous time coordinate.
pub fn fit_concentration_trend(fit: &TimeSeries, column: &str) -> (Option<f64>, Option<f64>) {
    let points: Vec<(f64, f64)> = fit
        .records
        .iter()
        .filter_map(|r| {
            r.number(column)
                .map(|c| (day_fraction_coordinate(r.timestamp), c))
        })
        .collect();
    if points.len() < 2 {
        return (None, None);
    }

    // Shift the day coordinate to its first value: the slope is unchanged
    // and the regression's design matrix stays well conditioned (raw day
    // ordinals are ~7e5 with sub-1e-3 spread).
    let origin = points[0].0;
    let x: Vec<f64> = points.iter().map(|(t, _)| t - origin).collect();
    let y: Vec<f64> = points.iter().map(|(_, c)| *c).collect();

    let data = vec![("Y".to_string(), y), ("X".to_string(), x)];
    let regression_data = match RegressionDataBuilder::new().build_from(data) {
        Ok(data) => data,
        Err(e) => {
            log::warn!("could not build regression data for '{}': {}", column, e);
            return (None, None);
        }
    };
    let model = match FormulaRegressionBuilder::new()
        .data(&regression_data)
        .formula("Y ~ X")
        .fit()
    {
        Ok(model) => model,
        Err(e) => {
            log::warn!("regression fit failed for '{}': {}", column, e);
            return (None, None);
        }
    };

    // parameters() returns [intercept, slope]; slope is per day.
    let slope = model.parameters()[1] / SECONDS_PER_DAY;
    let rsquared = model.rsquared();
    let pearsons_r = rsquared.is_finite().then(|| rsquared.sqrt());
    (Some(slope), pearsons_r)
}

/// Ideal-gas conversion from a concentration slope (per second) to a mass
/// flux, rounded to 8 decimals.
fn flux_from_slope(
    slope: f64,
    species: Species,
    effective_height_m: f64,
    temperature_c: f64,
    pressure_hpa: f64,
) -> f64 {
    let flux = slope / species.conversion()
        * 60.0
        * effective_height_m
        * species.molar_mass()
        * (pressure_hpa * 100.0)
        / 1_000_000.0
        / GAS_CONSTANT
        / (273.15 + temperature_c)
        * 1000.0
        * 60.0;
    round8(flux)
}

fn round8(value: f64) -> f64 {
    (value * 1e8).round() / 1e8
}
