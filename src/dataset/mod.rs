//! In-memory view of an NDFD dataset and the trait used to fetch one.
//!
//! A [`Dataset`] holds only what the flattener needs: the forecast grids that
//! were asked for and the two coordinate vectors. It is fetched fresh for every
//! timestamp and dropped once the rows have been written.

pub mod dap;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{Error, Result};

pub use dap::DapClient;

/// Fetches datasets by url.
///
/// The run loop only talks to this trait, so tests can hand it an in-memory
/// source instead of a THREDDS server.
#[async_trait]
pub trait DatasetSource: Sync + std::fmt::Debug {
    /// Opens the dataset at `url`, loading the named grid variables and the
    /// `x`/`y` coordinate vectors.
    ///
    /// Variables the dataset does not carry are left out of the result rather
    /// than reported as errors.
    async fn open(&self, url: &str, variables: &[String]) -> Result<Dataset>;
}

#[derive(Debug, Clone, Default, PartialEq)]
/// Maps a grid index along one axis to a coordinate value.
pub struct CoordinateVector(pub Vec<f64>);

impl CoordinateVector {
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Dataset {
    variables: HashMap<String, GridVariable>,
    /// The dataset's `y` vector, indexed by grid row.
    pub rows: CoordinateVector,
    /// The dataset's `x` vector, indexed by grid column.
    pub columns: CoordinateVector,
}

impl Dataset {
    pub fn new(rows: CoordinateVector, columns: CoordinateVector) -> Self {
        Dataset {
            variables: HashMap::new(),
            rows,
            columns,
        }
    }

    pub fn insert(&mut self, variable: GridVariable) {
        self.variables.insert(variable.name.clone(), variable);
    }

    pub fn variable(&self, name: &str) -> Option<&GridVariable> {
        self.variables.get(name)
    }
}

#[derive(Debug, Clone)]
/// A forecast field over (horizon, ..., row, column), stored row-major.
///
/// Dimension 0 is the forecast horizon axis and the last two are the spatial
/// grid. Any dimension in between (NDFD carries a single height level) is read
/// at index 0.
pub struct GridVariable {
    pub name: String,
    pub dimensions: Vec<String>,
    pub shape: Vec<usize>,
    /// Values of the horizon axis, in hours after issuance.
    pub horizons: Vec<f64>,
    values: Vec<f64>,
}

impl GridVariable {
    pub fn new(
        name: &str,
        dimensions: Vec<String>,
        shape: Vec<usize>,
        horizons: Vec<f64>,
        values: Vec<f64>,
    ) -> Result<Self> {
        if shape.len() < 3 || dimensions.len() != shape.len() {
            return Err(Error::Protocol(format!(
                "`{}` must have a horizon axis and two spatial axes, found shape {:?}",
                name, shape
            )));
        }
        if horizons.len() != shape[0] {
            return Err(Error::Protocol(format!(
                "`{}` has {} horizon values for an axis of length {}",
                name,
                horizons.len(),
                shape[0]
            )));
        }
        let expected: usize = shape.iter().product();
        if values.len() != expected {
            return Err(Error::Protocol(format!(
                "`{}` has {} values, expected {}",
                name,
                values.len(),
                expected
            )));
        }

        Ok(GridVariable {
            name: name.to_string(),
            dimensions,
            shape,
            horizons,
            values,
        })
    }

    pub fn rows(&self) -> usize {
        self.shape[self.shape.len() - 2]
    }

    pub fn columns(&self) -> usize {
        self.shape[self.shape.len() - 1]
    }

    /// Position of the `hours` horizon on the horizon axis. Exact match only.
    pub fn horizon_index(&self, hours: u32) -> Result<usize> {
        self.horizons
            .iter()
            .position(|&h| h == f64::from(hours))
            .ok_or_else(|| Error::HorizonNotFound {
                variable: self.name.clone(),
                hours,
            })
    }

    /// The 2-D spatial grid at horizon position `index`.
    pub fn slice(&self, index: usize) -> Option<GridSlice<'_>> {
        if index >= self.shape[0] {
            return None;
        }

        let stride: usize = self.shape[1..].iter().product();
        let cells = self.rows() * self.columns();
        let start = index * stride;

        Some(GridSlice {
            rows: self.rows(),
            columns: self.columns(),
            values: &self.values[start..start + cells],
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GridSlice<'a> {
    pub rows: usize,
    pub columns: usize,
    values: &'a [f64],
}

impl<'a> GridSlice<'a> {
    /// `(row, column, value)` for every cell, row index varying slowest.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, f64)> + 'a {
        let columns = self.columns;
        let values = self.values;
        debug_assert_eq!(values.len(), self.rows * columns);

        values
            .iter()
            .enumerate()
            .map(move |(i, &value)| (i / columns, i % columns, value))
    }
}

// -- Test fixtures -----------------------------------------------------------


// -- Tests -------------------------------------------------------------------
