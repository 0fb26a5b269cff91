pub mod latest;
pub mod past;

use std::path::PathBuf;

use anyhow::{anyhow, Result};

pub use latest::latest;
pub use past::past;

use crate::{
    config::Settings,
    dataset::DapClient,
    output::{self, AvailabilityLedger, Status},
    run::{run, RunConfig},
    time::RequestKey,
};

use super::RunOptions;

/// Reads the settings file, if any, and applies the command line overrides.
pub fn load_settings(options: &RunOptions) -> Result<Settings> {
    let mut settings = Settings::load(options.config.as_deref())?;

    if let Some(server_url) = &options.server_url {
        settings.server_url.clone_from(server_url);
    }
    if let Some(output_dir) = &options.output_dir {
        settings.output_dir.clone_from(output_dir);
    }
    if let Some(missing_horizons) = options.missing_horizons {
        settings.missing_horizons = missing_horizons;
    }
    if let Some(format) = options.format {
        settings.format = format;
    }

    Ok(settings)
}

/// `default_products` apply when none were named on the command line.
pub fn make_run_config(
    settings: &Settings,
    options: &RunOptions,
    default_products: &[&str],
) -> Result<RunConfig> {
    let mut names: Vec<&str> = if options.products.is_empty() {
        default_products.to_vec()
    } else {
        options.products.iter().map(String::as_str).collect()
    };
    let mut seen = Vec::with_capacity(names.len());
    names.retain(|name| {
        let first = !seen.contains(name);
        seen.push(*name);
        first
    });

    let products = names
        .iter()
        .map(|name| {
            settings
                .product(name)
                .ok_or_else(|| anyhow!("unknown product `{}`", name))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(RunConfig {
        server_url: settings.server_url.clone(),
        file_suffix: settings.file_suffix.clone(),
        output_dir: settings.output_dir.clone(),
        products,
        missing_horizons: settings.missing_horizons,
        format: settings.format,
    })
}

/// Fetches `timestamps` from the configured server. The ledger is named after
/// the first timestamp.
pub async fn download(
    settings: &Settings,
    config: &RunConfig,
    timestamps: &[String],
) -> Result<(PathBuf, AvailabilityLedger)> {
    let first = timestamps
        .first()
        .ok_or_else(|| anyhow!("no timestamps to fetch"))?;
    let key = RequestKey::resolve(first)?;
    let ledger_path = output::ledger_file_path(&config.output_dir, &key.year_month_day_hour);

    let client = DapClient::new(&settings.fetch)?;
    let ledger = run(&client, config, timestamps, &ledger_path).await?;

    Ok((ledger_path, ledger))
}

pub fn summarise(ledger_path: &std::path::Path, ledger: &AvailabilityLedger) -> String {
    format!(
        "{} of {} forecasts available, ledger saved to `{}`",
        ledger.count(Status::Available),
        ledger.records().len(),
        ledger_path.display()
    )
}

// -- Tests -------------------------------------------------------------------
