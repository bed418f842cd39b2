//! Prompt-driven run over the onboarded countries.

use std::path::Path;

use dialoguer::{Confirm, Input, Select};
use storm_map_cli_utils::{IndicatifProgress, MultiProgress};
use storm_map_pipeline::{PipelineConfig, PipelineInputs, discover_countries, layer_files};

use crate::{print_layers, print_report, run_country};

/// Asks for a country, resolution and inputs file, then runs the pipeline.
///
/// # Errors
///
/// Returns an error if a prompt fails, the inputs file is invalid, or a
/// stage fails.
pub async fn run(multi: &MultiProgress, base_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let countries = discover_countries(base_dir);
    if countries.is_empty() {
        println!(
            "No country folders under {}. Run `storm_map countries --create-dirs` first.",
            base_dir.display()
        );
        return Ok(());
    }

    let labels: Vec<String> = countries.iter().map(ToString::to_string).collect();
    let idx = Select::new()
        .with_prompt("Which country?")
        .items(&labels)
        .default(0)
        .interact()?;
    let country = &countries[idx];

    let resolution: u8 = Input::new()
        .with_prompt("H3 resolution (0-15)")
        .default(6)
        .validate_with(|r: &u8| if *r <= 15 { Ok(()) } else { Err("must be 0-15") })
        .interact_text()?;

    let config_path: String = Input::new()
        .with_prompt("Inputs TOML (empty for defaults)")
        .allow_empty(true)
        .interact_text()?;
    let mut inputs = if config_path.trim().is_empty() {
        PipelineInputs::default()
    } else {
        PipelineInputs::load(Path::new(config_path.trim()))?
    };

    if !inputs.infrastructure.enabled {
        inputs.infrastructure.enabled = Confirm::new()
            .with_prompt("Compute infrastructure indicators?")
            .default(false)
            .interact()?;
    }

    let config = PipelineConfig::new(base_dir, &country.continent, &country.iso, resolution);
    let progress = IndicatifProgress::cells_bar(multi, "Sampling hazards");
    let report = run_country(config, inputs, progress).await?;

    print_report(&report);
    print_layers(country, &layer_files(base_dir, country));
    Ok(())
}
