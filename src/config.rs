//! Run settings, read from an optional TOML file and overridden from the command line.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::{
    extract::{MissingHorizons, Product},
    output::OutputFormat,
};

pub const DEFAULT_SERVER_URL: &str = "https://tds.climate.ncsu.edu/thredds/dodsC/nws/ndfd/";
pub const DEFAULT_FILE_SUFFIX: &str = "ds.midatlan.oper.bin";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Base of the dataset urls, ending in `/`.
    pub server_url: String,
    /// Appended to `YYYYMM/YYYYMMDD/YYYYMMDDHH` to name a dataset.
    pub file_suffix: String,
    pub output_dir: PathBuf,
    pub missing_horizons: MissingHorizons,
    pub format: OutputFormat,
    pub fetch: FetchSettings,
    /// Extra or replacement product definitions, matched by name.
    pub products: Vec<Product>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            server_url: DEFAULT_SERVER_URL.to_string(),
            file_suffix: DEFAULT_FILE_SUFFIX.to_string(),
            output_dir: default_output_dir(),
            missing_horizons: MissingHorizons::default(),
            format: OutputFormat::default(),
            fetch: FetchSettings::default(),
            products: vec![],
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
/// Limits applied to every request made to the server.
pub struct FetchSettings {
    pub timeout_secs: u64,
    pub retries: u32,
    pub retry_delay_secs: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        FetchSettings {
            timeout_secs: 120,
            retries: 2,
            retry_delay_secs: 5,
        }
    }
}

impl Settings {
    /// Reads settings from `path`, or returns the defaults when there is no file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config `{}`", path.display()))?;
                toml::from_str(&text).with_context(|| format!("parsing config `{}`", path.display()))
            }
            None => Ok(Settings::default()),
        }
    }

    /// Looks a product up by name, preferring definitions from the config file.
    pub fn product(&self, name: &str) -> Option<Product> {
        self.products
            .iter()
            .find(|p| p.name == name)
            .cloned()
            .or_else(|| Product::builtin(name))
    }
}

fn default_output_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ndfd")
}

// -- Tests -------------------------------------------------------------------
