//! Fetch a daily series of past forecasts.

use anyhow::Result;
use tracing::info;

use crate::{cli::RunOptions, time::daily_series};

use super::{download, load_settings, make_run_config, summarise};

pub async fn past(options: &RunOptions, start: &str, days: u32) -> Result<String> {
    let settings = load_settings(options)?;
    let config = make_run_config(&settings, options, &["pop12"])?;
    let timestamps = daily_series(start, days)?;

    info!(
        start,
        count = timestamps.len(),
        server = %config.server_url,
        "fetching past forecasts"
    );
    let (ledger_path, ledger) = download(&settings, &config, &timestamps).await?;

    Ok(summarise(&ledger_path, &ledger))
}
