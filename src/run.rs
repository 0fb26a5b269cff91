//! The download loop: one timestamp at a time, fetch, flatten, write, and keep
//! the availability ledger current.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::{
    cli::create_progress_bar,
    dataset::DatasetSource,
    error::{Error, Result},
    extract::{flatten, MissingHorizons, Product},
    output::{self, AvailabilityLedger, OutputFormat, Status},
    time::{QueryTime, RequestKey},
};

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub server_url: String,
    pub file_suffix: String,
    pub output_dir: PathBuf,
    /// A timestamp only counts as available when every product has data.
    pub products: Vec<Product>,
    pub missing_horizons: MissingHorizons,
    pub format: OutputFormat,
}

impl RunConfig {
    pub fn dataset_url(&self, key: &RequestKey) -> String {
        format!("{}{}{}", self.server_url, key.date_path(), self.file_suffix)
    }
}

/// Downloads every timestamp in turn.
///
/// A timestamp that cannot be resolved, fetched or flattened is recorded as
/// not available and the loop moves on. Only local write failures end the run.
pub async fn run<S>(
    source: &S,
    config: &RunConfig,
    timestamps: &[String],
    ledger_path: &Path,
) -> Result<AvailabilityLedger>
where
    S: DatasetSource + ?Sized,
{
    std::fs::create_dir_all(&config.output_dir)?;

    let mut ledger = AvailabilityLedger::new();
    let pb = create_progress_bar(timestamps.len() as u64, "Downloading forecasts".to_string());

    for datetime_uct_str in timestamps {
        let status = match fetch_one(source, config, datetime_uct_str).await {
            Ok(files) => {
                info!(datetime = %datetime_uct_str, files = files.len(), "exported data");
                Status::Available
            }
            Err(e) if e.is_unavailable() => {
                warn!(datetime = %datetime_uct_str, error = %e, "did not append data");
                Status::NotAvailable
            }
            Err(e) => return Err(e),
        };

        ledger.record(datetime_uct_str, status);
        ledger.persist(ledger_path)?;
        pb.inc(1);
    }

    pb.finish_with_message(format!(
        "{} of {} timestamps available",
        ledger.count(Status::Available),
        timestamps.len()
    ));

    Ok(ledger)
}

// Writes one file per product, or none at all.
async fn fetch_one<S>(source: &S, config: &RunConfig, datetime_uct_str: &str) -> Result<Vec<PathBuf>>
where
    S: DatasetSource + ?Sized,
{
    let key = RequestKey::resolve(datetime_uct_str)?;
    let time = QueryTime::parse(datetime_uct_str)?;
    let url = config.dataset_url(&key);

    let variables: Vec<String> = config.products.iter().map(|p| p.variable.clone()).collect();
    let dataset = source.open(&url, &variables).await?;

    let mut tables = Vec::with_capacity(config.products.len());
    for product in &config.products {
        let rows = flatten(&dataset, product, time, config.missing_horizons)?;
        if rows.is_empty() {
            return Err(Error::EmptyResult {
                product: product.name.clone(),
            });
        }
        tables.push((product, rows));
    }
    drop(dataset);

    let mut files = Vec::with_capacity(tables.len());
    for (product, rows) in tables {
        let path = output::data_file_path(
            &config.output_dir,
            &product.name,
            &key.year_month_day_hour,
            config.format,
        );
        output::save_rows(&rows, &product.value_column, &path, config.format)?;
        files.push(path);
    }

    Ok(files)
}

// -- Tests -------------------------------------------------------------------
