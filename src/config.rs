//! Run configuration from environment variables

use std::collections::HashMap;
use std::env;

use crate::flux_core::estimate::Species;
use crate::flux_core::merge::{AuxSourceConfig, Direction, JoinStrategy};

/// Output backend for summary records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Jsonl,
    Sqlite,
}

/// Parse `--backend jsonl|sqlite` from the command line, defaulting to JSONL.
pub fn parse_backend_from_args() -> BackendType {
    let args: Vec<String> = env::args().collect();
    if let Some(idx) = args.iter().position(|x| x == "--backend") {
        match args.get(idx + 1).map(|s| s.as_str()) {
            Some("sqlite") => return BackendType::Sqlite,
            Some("jsonl") => return BackendType::Jsonl,
            _ => {}
        }
    }
    BackendType::Jsonl
}

/// One auxiliary source declaration from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct AuxSourceSpec {
    pub config: AuxSourceConfig,
    pub path: String,
}

impl AuxSourceSpec {
    /// Parse one `name,path,strategy[,...]` declaration:
    ///
    /// - `soil,data/aux/soil.csv,by-time,nearest,30`
    /// - `plots,data/aux/plots.csv,by-id,chamber`
    /// - `probes,data/aux/probes.csv,by-time-and-id,chamber,backward,600`
    fn parse(raw: &str) -> Option<Self> {
        let parts: Vec<&str> = raw.split(',').map(|p| p.trim()).collect();
        if parts.len() < 3 {
            return None;
        }
        let (name, path, kind) = (parts[0], parts[1], parts[2]);
        let strategy = match kind {
            "by-time" => JoinStrategy::ByTime {
                direction: Direction::from_str(parts.get(3)?)?,
                tolerance_s: parts.get(4)?.parse().ok()?,
            },
            "by-id" => JoinStrategy::ById {
                identity_column: parts.get(3)?.to_string(),
            },
            "by-time-and-id" => JoinStrategy::ByTimeAndId {
                identity_column: parts.get(3)?.to_string(),
                direction: Direction::from_str(parts.get(4)?)?,
                tolerance_s: parts.get(5)?.parse().ok()?,
            },
            _ => return None,
        };
        Some(Self {
            config: AuxSourceConfig::new(name, strategy),
            path: path.to_string(),
        })
    }
}

/// Configuration for one batch run, loaded from `GASFLOW_*` environment
/// variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Directory holding the primary instrument files
    pub data_dir: String,

    /// Rotation template CSV path
    pub template_path: String,

    /// Optional explicit event-anchor CSV; when unset, anchors come from
    /// the distinct dates of the primary series
    pub anchor_file: Option<String>,

    /// Auxiliary source declarations (`;`-separated)
    pub aux_sources: Vec<AuxSourceSpec>,

    /// Species to estimate
    pub species: Vec<Species>,

    /// Instrument diagnostic-flag column
    pub diagnostic_column: String,

    /// Covariate columns that must be present for a window to validate
    pub required_columns: Vec<String>,

    /// Instrument sample interval in seconds
    pub sample_interval_s: f64,

    /// When true, skip measured covariates and use the fixed defaults
    pub use_default_covariates: bool,

    pub default_temperature_c: f64,
    pub default_pressure_hpa: f64,
    pub default_snow_depth_m: f64,

    pub temperature_column: String,
    pub pressure_column: String,
    pub snow_depth_column: String,

    /// Per-chamber heights in meters, `id:height` pairs
    pub chamber_heights_m: HashMap<String, f64>,
    pub default_chamber_height_m: f64,
}

impl RunConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `GASFLOW_DATA_DIR` (default: data/instrument)
    /// - `GASFLOW_TEMPLATE_PATH` (default: config/rotation.csv)
    /// - `GASFLOW_ANCHOR_FILE` (optional)
    /// - `GASFLOW_AUX_SOURCES` (optional, `;`-separated declarations)
    /// - `GASFLOW_SPECIES` (default: ch4,co2)
    /// - `GASFLOW_DIAG_COLUMN` (default: diag)
    /// - `GASFLOW_REQUIRED_COLUMNS` (optional, comma-separated)
    /// - `GASFLOW_SAMPLE_INTERVAL_S` (default: 1.0)
    /// - `GASFLOW_USE_DEFAULT_COVARIATES` (default: false)
    /// - `GASFLOW_DEFAULT_TEMPERATURE_C` (default: 10.0)
    /// - `GASFLOW_DEFAULT_PRESSURE_HPA` (default: 1000.0)
    /// - `GASFLOW_DEFAULT_SNOW_DEPTH_M` (default: 0.0)
    /// - `GASFLOW_TEMPERATURE_COLUMN` (default: air_temperature)
    /// - `GASFLOW_PRESSURE_COLUMN` (default: air_pressure)
    /// - `GASFLOW_SNOW_DEPTH_COLUMN` (default: snow_depth)
    /// - `GASFLOW_CHAMBER_HEIGHTS` (optional, `id:height` comma-separated)
    /// - `GASFLOW_CHAMBER_HEIGHT_M` (default: 0.4)
    pub fn from_env() -> Self {
        Self {
            data_dir: env::var("GASFLOW_DATA_DIR")
                .unwrap_or_else(|_| "data/instrument".to_string()),

            template_path: env::var("GASFLOW_TEMPLATE_PATH")
                .unwrap_or_else(|_| "config/rotation.csv".to_string()),

            anchor_file: env::var("GASFLOW_ANCHOR_FILE").ok(),

            aux_sources: env::var("GASFLOW_AUX_SOURCES")
                .map(|raw| parse_aux_sources(&raw))
                .unwrap_or_default(),

            species: env::var("GASFLOW_SPECIES")
                .map(|raw| parse_species(&raw))
                .unwrap_or_else(|_| vec![Species::Ch4, Species::Co2]),

            diagnostic_column: env::var("GASFLOW_DIAG_COLUMN")
                .unwrap_or_else(|_| "diag".to_string()),

            required_columns: env::var("GASFLOW_REQUIRED_COLUMNS")
                .map(|raw| {
                    raw.split(',')
                        .map(|c| c.trim().to_string())
                        .filter(|c| !c.is_empty())
                        .collect()
                })
                .unwrap_or_default(),

            sample_interval_s: env::var("GASFLOW_SAMPLE_INTERVAL_S")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1.0),

            use_default_covariates: env::var("GASFLOW_USE_DEFAULT_COVARIATES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(false),

            default_temperature_c: env::var("GASFLOW_DEFAULT_TEMPERATURE_C")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10.0),

            default_pressure_hpa: env::var("GASFLOW_DEFAULT_PRESSURE_HPA")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1000.0),

            default_snow_depth_m: env::var("GASFLOW_DEFAULT_SNOW_DEPTH_M")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.0),

            temperature_column: env::var("GASFLOW_TEMPERATURE_COLUMN")
                .unwrap_or_else(|_| "air_temperature".to_string()),

            pressure_column: env::var("GASFLOW_PRESSURE_COLUMN")
                .unwrap_or_else(|_| "air_pressure".to_string()),

            snow_depth_column: env::var("GASFLOW_SNOW_DEPTH_COLUMN")
                .unwrap_or_else(|_| "snow_depth".to_string()),

            chamber_heights_m: env::var("GASFLOW_CHAMBER_HEIGHTS")
                .map(|raw| parse_chamber_heights(&raw))
                .unwrap_or_default(),

            default_chamber_height_m: env::var("GASFLOW_CHAMBER_HEIGHT_M")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.4),
        }
    }
}

fn parse_aux_sources(raw: &str) -> Vec<AuxSourceSpec> {
    raw.split(';')
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .filter_map(|part| {
            let spec = AuxSourceSpec::parse(part);
            if spec.is_none() {
                log::warn!("ignoring malformed auxiliary source declaration: {}", part);
            }
            spec
        })
        .collect()
}

fn parse_species(raw: &str) -> Vec<Species> {
    raw.split(',')
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .filter_map(|part| {
            let species = Species::from_str(part);
            if species.is_none() {
                log::warn!("ignoring unknown species: {}", part);
            }
            species
        })
        .collect()
}

fn parse_chamber_heights(raw: &str) -> HashMap<String, f64> {
    let mut heights = HashMap::new();
    for part in raw.split(',').map(|p| p.trim()).filter(|p| !p.is_empty()) {
        match part
            .split_once(':')
            .and_then(|(id, height)| height.trim().parse::<f64>().ok().map(|h| (id.trim().to_string(), h)))
        {
            Some((id, height)) => {
                heights.insert(id, height);
            }
            None => log::warn!("ignoring malformed chamber height entry: {}", part),
        }
    }
    heights
}
