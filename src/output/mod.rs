//! Writes flattened tables and the availability ledger to disk.

pub mod csv;
pub mod ledger;
pub mod parquet;

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{error::Result, extract::FlatRow, time::QueryTime};

pub use ledger::{AvailabilityLedger, AvailabilityRecord, Status};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Comma separated text with a header row
    #[default]
    Csv,
    /// Apache Parquet, ZSTD compressed
    Parquet,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Parquet => "parquet",
        }
    }
}

/// Column names of a flattened table, with `value_column` holding the forecast value.
pub fn header(value_column: &str) -> [&str; 11] {
    [
        "y_index",
        "x_index",
        value_column,
        "valid_period_hrs",
        "longitude",
        "latitude",
        "time",
        "time_uct_long",
        "time_uct",
        "time_nyc_long",
        "time_nyc",
    ]
}

/// `<product>_<YYYYMMDDHH>.<ext>` in `output_dir`.
pub fn data_file_path(
    output_dir: &Path,
    product: &str,
    year_month_day_hour: &str,
    format: OutputFormat,
) -> PathBuf {
    output_dir.join(format!(
        "{}_{}.{}",
        product,
        year_month_day_hour,
        format.extension()
    ))
}

/// `data_available_<YYYYMMDDHH>.csv` in `output_dir`.
pub fn ledger_file_path(output_dir: &Path, year_month_day_hour: &str) -> PathBuf {
    output_dir.join(format!("data_available_{}.csv", year_month_day_hour))
}

pub fn save_rows(
    rows: &[FlatRow],
    value_column: &str,
    file_path: &Path,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Csv => csv::save_rows(rows, value_column, file_path),
        OutputFormat::Parquet => parquet::save_rows(rows, value_column, file_path),
    }
}

// Rows of one table nearly always share a query time, so its strings are
// formatted once and reused until the time changes.
struct TimeColumns {
    time: Option<QueryTime>,
    columns: [String; 5],
}

impl TimeColumns {
    fn new() -> Self {
        TimeColumns {
            time: None,
            columns: Default::default(),
        }
    }

    fn get(&mut self, time: &QueryTime) -> &[String; 5] {
        if self.time.as_ref() != Some(time) {
            self.columns = time.columns();
            self.time = Some(*time);
        }

        &self.columns
    }
}

// -- Tests -------------------------------------------------------------------
