//! Error type shared by the resolver, the dataset client, the flattener and the writers.

use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The timestamp was not in `%Y-%m-%d %H:%M` form
    #[error("timestamp `{0}` is not in `YYYY-MM-DD HH:MM` format")]
    InvalidFormat(String),
    /// The remote dataset could not be reached or answered with a failure status
    #[error("remote dataset `{url}` unavailable: {reason}")]
    RemoteUnavailable { url: String, reason: String },
    /// The variable does not publish the requested forecast horizon
    #[error("variable `{variable}` has no {hours} hour horizon")]
    HorizonNotFound { variable: String, hours: u32 },
    /// No rows could be produced for the product
    #[error("no data extracted for `{product}`")]
    EmptyResult { product: String },
    /// The server answered, but not with something we could parse
    #[error("malformed OPeNDAP response: {0}")]
    Protocol(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Whether the error means "this timestamp has no usable data" rather than a local failure.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Error::InvalidFormat(_)
                | Error::RemoteUnavailable { .. }
                | Error::HorizonNotFound { .. }
                | Error::EmptyResult { .. }
                | Error::Protocol(_)
                | Error::Http(_)
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
