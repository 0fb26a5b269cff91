//! Command line interface.

pub mod command;

use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::Level;

use crate::{extract::MissingHorizons, output::OutputFormat};

#[derive(Parser)]
#[command(version, about, long_about = None)]
/// Contains the commands
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
    #[command(flatten)]
    pub options: RunOptions,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Get one forecast per day, starting from a past date
    Past {
        /// First forecast to fetch, `YYYY-MM-DD HH:MM` in UTC
        #[arg(long, default_value = "2016-01-01 00:00")]
        start: String,
        /// Number of further days to fetch after the first
        #[arg(long, default_value_t = 730)]
        days: u32,
    },
    /// Get the most recent forecast
    Latest {
        /// Use this UTC time, `YYYY-MM-DD HH:MM`, instead of the clock
        #[arg(long)]
        now: Option<String>,
    },
}

#[derive(Args, Debug, Clone)]
/// Options shared by every command. Each overrides the config file.
pub struct RunOptions {
    /// TOML settings file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Base url of the THREDDS OPeNDAP service
    #[arg(long, global = true)]
    pub server_url: Option<String>,
    /// Directory the tables and the ledger are written to
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,
    /// Product to extract (pop12, qpf, or one defined in the config file); repeatable
    #[arg(long = "product", global = true)]
    pub products: Vec<String>,
    /// What to do when a product lacks some of the 12/24/48/72 hour horizons
    #[arg(long, value_enum, global = true)]
    pub missing_horizons: Option<MissingHorizons>,
    /// Format of the data files
    #[arg(long, value_enum, global = true)]
    pub format: Option<OutputFormat>,
    #[arg(short = 'l', long, default_value_t = Level::INFO, global = true)]
    pub log_level: Level,
}

/// Creates a spinner.
pub fn create_spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner().with_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));

    bar
}

/// Creates a progress bar.
pub fn create_progress_bar(size: u64, message: String) -> ProgressBar {
    ProgressBar::new(size).with_message(message).with_style(
        ProgressStyle::with_template("[{eta_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    )
}

// -- Tests -------------------------------------------------------------------
