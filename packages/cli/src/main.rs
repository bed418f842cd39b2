#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the storm map layer pipeline.
//!
//! Without a subcommand the tool asks which onboarded country to process.
//! Logging goes through [`storm_map_cli_utils::init_logger`], so `RUST_LOG`
//! controls verbosity and log lines do not break progress bars.

mod interactive;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use storm_map_boundaries::{BoundaryDownload, DEFAULT_LISTING_URL, GeoBoundaries};
use storm_map_cli_utils::IndicatifProgress;
use storm_map_layer_models::CountryKey;
use storm_map_layer_models::progress::ProgressCallback;
use storm_map_pipeline::{
    ArtifactKey, ArtifactKind, DashboardLayer, DefaultComponents, FsStore, Pipeline,
    PipelineConfig, PipelineInputs, RunReport, catalogue, default_base_dir, discover_countries,
    layer_files,
};

#[derive(Parser)]
#[command(name = "storm_map", about = "Per-country H3 hazard, population and infrastructure layers")]
struct Cli {
    /// Data directory (defaults to `$STORM_MAP_DATA_DIR`, then `data_v2`)
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute every missing layer of one country
    Run {
        /// Continent folder (e.g., "Latin America and the Caribbean")
        continent: String,
        /// ISO 3166-1 alpha-3 code (e.g., "HTI")
        iso: String,
        /// H3 resolution, 0-15 (higher means smaller cells)
        #[arg(long, default_value = "6")]
        resolution: u8,
        /// TOML file describing raw inputs
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Compute missing layers for every country folder under the data directory
    RunAll {
        #[arg(long, default_value = "6")]
        resolution: u8,
        /// TOML file describing raw inputs
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Show which stage a country is at, without running anything
    Status {
        continent: String,
        iso: String,
        #[arg(long, default_value = "6")]
        resolution: u8,
        /// TOML file describing raw inputs (decides whether infrastructure counts)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// List the dashboard layers of a country and whether they exist
    Layers {
        #[arg(required_unless_present = "all")]
        continent: Option<String>,
        #[arg(required_unless_present = "all")]
        iso: Option<String>,
        /// List every country folder under the data directory instead
        #[arg(long, conflicts_with_all = ["continent", "iso"])]
        all: bool,
    },
    /// List countries known to geoBoundaries
    Countries {
        /// Create a `{continent}/{iso}` folder for every country
        #[arg(long)]
        create_dirs: bool,
        /// Only list the distinct continents
        #[arg(long)]
        continents: bool,
        /// Listing endpoint
        #[arg(long, default_value = DEFAULT_LISTING_URL)]
        listing_url: String,
    },
    /// Download a country's boundary unless it is already present
    FetchBoundary {
        iso: String,
        #[arg(long, default_value = DEFAULT_LISTING_URL)]
        listing_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = storm_map_cli_utils::init_logger();
    let cli = Cli::parse();
    let base_dir = cli.base_dir.unwrap_or_else(default_base_dir);

    let Some(command) = cli.command else {
        return interactive::run(&multi, &base_dir).await;
    };

    match command {
        Commands::Run {
            continent,
            iso,
            resolution,
            config,
        } => {
            let inputs = load_inputs(config.as_deref())?;
            let config = PipelineConfig::new(&base_dir, continent, iso, resolution);
            let progress = IndicatifProgress::cells_bar(&multi, "Sampling hazards");
            let report = run_country(config, inputs, progress).await?;
            print_report(&report);
        }
        Commands::RunAll { resolution, config } => {
            let inputs = load_inputs(config.as_deref())?;
            let countries = discover_countries(&base_dir);
            log::info!("Running {} countries at resolution {resolution}", countries.len());

            let steps = IndicatifProgress::steps_bar(&multi, "Countries", countries.len() as u64);
            let cells = IndicatifProgress::cells_bar(&multi, "Sampling hazards");
            let mut failed = 0_usize;
            for country in countries {
                steps.set_message(country.to_string());
                let config = PipelineConfig::new(&base_dir, &country.continent, &country.iso, resolution);
                match run_country(config, inputs.clone(), Arc::clone(&cells)).await {
                    Ok(report) => print_report(&report),
                    Err(e) => {
                        failed += 1;
                        log::error!("Failed to run {country}: {e}");
                    }
                }
                steps.inc(1);
            }
            cells.finish_and_clear();
            steps.finish(format!("done, {failed} failed"));
        }
        Commands::Status {
            continent,
            iso,
            resolution,
            config,
        } => {
            let inputs = load_inputs(config.as_deref())?;
            let config = PipelineConfig::new(&base_dir, continent, iso, resolution);
            let store = FsStore::new(&config.base_dir);
            let components = DefaultComponents::new(inputs)?;
            let pipeline = Pipeline::new(config, &store, &components);
            println!("{}: {}", pipeline.config().country(), pipeline.status());
        }
        Commands::Layers {
            continent,
            iso,
            all,
        } => match (continent, iso) {
            (Some(continent), Some(iso)) if !all => {
                let country = CountryKey::new(continent, iso);
                print_layers(&country, &layer_files(&base_dir, &country));
            }
            _ => {
                for (country, layers) in catalogue(&base_dir) {
                    print_layers(&country, &layers);
                }
            }
        },
        Commands::Countries {
            create_dirs,
            continents,
            listing_url,
        } => {
            let client = GeoBoundaries::new(listing_url)?;
            let records = client.countries().await?;
            if continents {
                for continent in storm_map_boundaries::continents(&records) {
                    println!("{continent}");
                }
            } else {
                println!("{:<6} {:<36} CONTINENT", "ISO", "NAME");
                println!("{}", "-".repeat(70));
                for record in &records {
                    println!("{:<6} {:<36} {}", record.iso, record.name, record.continent);
                }
            }
            if create_dirs {
                let created = storm_map_boundaries::ensure_country_dirs(&base_dir, &records)?;
                log::info!("Created {created} country folders under {}", base_dir.display());
            }
        }
        Commands::FetchBoundary { iso, listing_url } => {
            let client = GeoBoundaries::new(listing_url)?;
            let record = client.country(&iso).await?;
            let dest = ArtifactKey::new(record.key(), ArtifactKind::Boundary).path(&base_dir);
            match client.download_boundary(&record, &dest).await? {
                BoundaryDownload::Existing(path) => println!("Already present: {}", path.display()),
                BoundaryDownload::Downloaded(path) => println!("Downloaded: {}", path.display()),
            }
        }
    }

    Ok(())
}

fn load_inputs(path: Option<&Path>) -> Result<PipelineInputs, Box<dyn std::error::Error>> {
    Ok(path.map_or_else(|| Ok(PipelineInputs::default()), PipelineInputs::load)?)
}

async fn run_country(
    config: PipelineConfig,
    inputs: PipelineInputs,
    progress: Arc<dyn ProgressCallback>,
) -> Result<RunReport, Box<dyn std::error::Error>> {
    let store = FsStore::new(&config.base_dir);
    let components = DefaultComponents::new(inputs)?.with_progress(progress);
    let report = Pipeline::new(config, &store, &components).run().await?;
    Ok(report)
}

fn print_report(report: &RunReport) {
    if !report.boundary_found {
        println!("{}: no boundary, nothing to do", report.country);
        return;
    }
    println!("{} (resolution {})", report.country, report.resolution);
    for (stage, outcome) in &report.stages {
        println!("  {stage:<16} {outcome}");
    }
}

fn print_layers(country: &CountryKey, layers: &BTreeMap<DashboardLayer, Option<PathBuf>>) {
    println!("{country}");
    for (layer, path) in layers {
        match path {
            Some(path) => println!("  {layer:<20} {}", path.display()),
            None => println!("  {layer:<20} (not computed)"),
        }
    }
}
