//! Fetch the forecast issued most recently.

use anyhow::Result;
use chrono::Utc;
use tracing::info;

use crate::{
    cli::RunOptions,
    time::{format_utc, nearest_synoptic, parse_utc},
};

use super::{download, load_settings, make_run_config, summarise};

pub async fn latest(options: &RunOptions, now: Option<&str>) -> Result<String> {
    let settings = load_settings(options)?;
    let config = make_run_config(&settings, options, &["qpf", "pop12"])?;
    let timestamp = latest_timestamp(now)?;

    info!(%timestamp, server = %config.server_url, "fetching latest forecast");
    let (ledger_path, ledger) = download(&settings, &config, &[timestamp]).await?;

    Ok(summarise(&ledger_path, &ledger))
}

// The 00:00 or 12:00 UTC issuance closest to `now`, or to the clock.
fn latest_timestamp(now: Option<&str>) -> Result<String> {
    let now = match now {
        Some(now) => parse_utc(now)?,
        None => Utc::now(),
    };

    Ok(format_utc(nearest_synoptic(now)))
}

// -- Tests -------------------------------------------------------------------
