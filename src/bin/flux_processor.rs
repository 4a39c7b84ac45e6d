//! Flux Processor Binary - batch chamber flux estimation
//!
//! Reads a season of instrument files plus configured auxiliary sources,
//! expands the rotation template into measurement windows, and writes one
//! summary record per window.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin flux_processor -- --backend sqlite
//! ```
//!
//! ## Environment Variables
//!
//! - GASFLOW_DATA_DIR - Directory of primary instrument files (default: data/instrument)
//! - GASFLOW_TEMPLATE_PATH - Rotation template CSV (default: config/rotation.csv)
//! - GASFLOW_ANCHOR_FILE - Explicit event-anchor CSV (optional)
//! - GASFLOW_AUX_SOURCES - Auxiliary source declarations (optional)
//! - GASFLOW_OUTPUT_PATH - Summary output path (default depends on backend)
//! - GASFLOW_SPECIES - Species to estimate (default: ch4,co2)
//! - RUST_LOG - Logging level (optional, default: info)
//!
//! See `RunConfig::from_env` for the full list.

use std::error::Error;
use std::path::{Path, PathBuf};

use gasflow::config::{parse_backend_from_args, BackendType, RunConfig};
use gasflow::flux_core::{
    read_anchor_file, read_instrument_files, CsvAuxLoader, FluxEstimator, FluxPipeline,
    Li7810Reader, RotationEntry, SummaryWriter, WindowCatalogBuilder, WindowValidator,
};

/// Instrument files in the data directory, ordered by name so multi-day
/// batches concatenate chronologically.
fn discover_instrument_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    paths.sort();
    Ok(paths)
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    dotenv::dotenv().ok();

    let backend = parse_backend_from_args();
    let config = RunConfig::from_env();
    let output_path = match backend {
        BackendType::Sqlite => std::env::var("GASFLOW_OUTPUT_PATH")
            .unwrap_or_else(|_| "data/gasflow.db".to_string()),
        BackendType::Jsonl => std::env::var("GASFLOW_OUTPUT_PATH")
            .unwrap_or_else(|_| "data/flux_summaries.jsonl".to_string()),
    };

    log::info!("🚀 Starting flux processor");
    log::info!("   Data dir: {}", config.data_dir);
    log::info!("   Template: {}", config.template_path);
    log::info!("   Aux sources: {}", config.aux_sources.len());
    log::info!("   Species: {:?}", config.species);
    log::info!("   Output: {}", output_path);

    let template = RotationEntry::load_template(Path::new(&config.template_path))?;

    let reader = Li7810Reader::new();
    let paths = discover_instrument_files(Path::new(&config.data_dir))?;
    let primary = read_instrument_files(&reader, &paths)?;
    log::info!("Primary series holds {} rows", primary.len());

    let anchors = match &config.anchor_file {
        Some(path) => read_anchor_file(Path::new(path))?,
        None => WindowCatalogBuilder::anchors_from_series(&primary),
    };

    // Auxiliary sources are loaded with per-file recovery: one bad file
    // costs that source, not the run.
    let mut aux_sources = Vec::with_capacity(config.aux_sources.len());
    for spec in &config.aux_sources {
        let loader = CsvAuxLoader::new(spec.config.clone(), PathBuf::from(&spec.path));
        match loader.load() {
            Ok(pair) => aux_sources.push(pair),
            Err(e) => log::warn!("skipping auxiliary source '{}': {}", spec.config.name, e),
        }
    }

    let pipeline = FluxPipeline::new(
        WindowCatalogBuilder::new(template),
        WindowValidator::new(
            &config.diagnostic_column,
            config.required_columns.clone(),
            config.sample_interval_s,
        ),
        FluxEstimator::from_config(&config),
    );

    let outputs = pipeline.run(primary, aux_sources, &anchors)?;

    let mut writer = SummaryWriter::new(backend, PathBuf::from(&output_path))?;
    log::info!("📊 Backend: {}", writer.backend_type());
    for record in &outputs {
        writer.write_record(record)?;
    }
    writer.flush()?;

    log::info!("✅ Wrote {} summary records", outputs.len());
    Ok(())
}
