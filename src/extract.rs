//! Flattens forecast grids into one row per grid cell and forecast horizon.

use serde::Deserialize;
use tracing::debug;

use crate::{
    dataset::{CoordinateVector, Dataset, GridSlice},
    error::{Error, Result},
    time::QueryTime,
};

/// Forecast horizons extracted from every product, in output order.
pub const HORIZONS: [u32; 4] = [12, 24, 48, 72];

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
/// A forecast element to extract: its short name, the grid variable that holds
/// it and the column its values are written under.
pub struct Product {
    pub name: String,
    pub variable: String,
    pub value_column: String,
}

impl Product {
    pub fn pop12() -> Self {
        Product {
            name: "pop12".to_string(),
            variable: "Total_precipitation_surface_12_Hour_Accumulation_probability_above_0p254"
                .to_string(),
            value_column: "pop12_value_perc".to_string(),
        }
    }

    pub fn qpf() -> Self {
        Product {
            name: "qpf".to_string(),
            variable: "Total_precipitation_surface_6_Hour_Accumulation".to_string(),
            value_column: "qpf_value_kgperm2".to_string(),
        }
    }

    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "pop12" => Some(Product::pop12()),
            "qpf" => Some(Product::qpf()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
/// What to do when a product publishes some, but not all, of [`HORIZONS`].
pub enum MissingHorizons {
    /// Leave the missing horizons out of the table
    #[default]
    Skip,
    /// Treat the whole product as unavailable
    Fail,
}

#[derive(Debug, Clone, PartialEq)]
/// One grid cell at one forecast horizon.
pub struct FlatRow {
    pub y_index: usize,
    pub x_index: usize,
    /// `None` where the grid holds NaN.
    pub value: Option<f64>,
    pub valid_period_hrs: u32,
    pub longitude: f64,
    pub latitude: f64,
    pub time: QueryTime,
}

/// Builds the long-format table of `product` for the dataset issued at `time`.
///
/// Rows come out horizon by horizon in [`HORIZONS`] order, and row-major within
/// a horizon. An empty table means the product is not in the dataset or none of
/// its horizons are.
pub fn flatten(
    dataset: &Dataset,
    product: &Product,
    time: QueryTime,
    policy: MissingHorizons,
) -> Result<Vec<FlatRow>> {
    let Some(variable) = dataset.variable(&product.variable) else {
        debug!(product = %product.name, "variable not in dataset");
        return Ok(vec![]);
    };

    if dataset.rows.len() != variable.rows() || dataset.columns.len() != variable.columns() {
        return Err(Error::Protocol(format!(
            "`{}` is {}x{} but coordinates are {}x{}",
            variable.name,
            variable.rows(),
            variable.columns(),
            dataset.rows.len(),
            dataset.columns.len()
        )));
    }

    let mut found = Vec::with_capacity(HORIZONS.len());
    let mut missing = None;
    for hours in HORIZONS {
        match variable.horizon_index(hours) {
            Ok(index) => found.push((hours, index)),
            Err(e) => {
                debug!(product = %product.name, axis = %variable.dimensions[0], hours, "horizon not published");
                missing.get_or_insert(e);
            }
        }
    }

    if found.is_empty() {
        return Ok(vec![]);
    }
    if let (Some(e), MissingHorizons::Fail) = (missing, policy) {
        return Err(e);
    }

    let mut rows = Vec::with_capacity(found.len() * variable.rows() * variable.columns());
    for (hours, index) in found {
        let slice = variable
            .slice(index)
            .ok_or_else(|| Error::Protocol(format!("no slice {} in `{}`", index, variable.name)))?;
        rows.extend(flatten_slice(
            slice,
            hours,
            &dataset.rows,
            &dataset.columns,
            time,
        ));
    }

    Ok(rows)
}

// Coordinates are looked up from each cell's own indices. The row vector
// supplies longitude and the column vector latitude.
fn flatten_slice<'a>(
    slice: GridSlice<'a>,
    hours: u32,
    rows: &'a CoordinateVector,
    columns: &'a CoordinateVector,
    time: QueryTime,
) -> impl Iterator<Item = FlatRow> + 'a {
    slice.cells().map(move |(y_index, x_index, value)| FlatRow {
        y_index,
        x_index,
        value: (!value.is_nan()).then_some(value),
        valid_period_hrs: hours,
        longitude: rows.0[y_index],
        latitude: columns.0[x_index],
        time,
    })
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {

    use super::*;
    use crate::dataset::fixtures;

    fn pop12_dataset(horizons: &[u32], rows: usize, columns: usize) -> Dataset {
        let variable = fixtures::grid_variable(&Product::pop12().variable, horizons, rows, columns);
        fixtures::dataset(vec![variable], rows, columns)
    }

    fn query_time() -> QueryTime {
        QueryTime::parse("2016-01-01 00:00").unwrap()
    }

    #[test]
    fn should_flatten_every_cell_of_every_horizon() {
        let dataset = pop12_dataset(&[6, 12, 18, 24, 30, 36, 42, 48, 54, 60, 66, 72], 20, 19);
        let rows = flatten(&dataset, &Product::pop12(), query_time(), MissingHorizons::Skip).unwrap();

        assert_eq!(rows.len(), 4 * 20 * 19);
        for hours in HORIZONS {
            let count = rows.iter().filter(|r| r.valid_period_hrs == hours).count();
            assert_eq!(count, 20 * 19);
        }
    }

    #[test]
    fn should_keep_horizons_in_order() {
        let dataset = pop12_dataset(&[72, 48, 24, 12, 6], 3, 2);
        let rows = flatten(&dataset, &Product::pop12(), query_time(), MissingHorizons::Skip).unwrap();

        let mut order: Vec<u32> = rows.iter().map(|r| r.valid_period_hrs).collect();
        order.dedup();
        assert_eq!(order, vec![12, 24, 48, 72]);
    }

    #[test]
    fn should_join_coordinates_from_each_horizons_own_cells() {
        let dataset = pop12_dataset(&[12, 24, 48, 72], 4, 3);
        let rows = flatten(&dataset, &Product::pop12(), query_time(), MissingHorizons::Skip).unwrap();

        for row in &rows {
            assert_eq!(row.longitude, dataset.rows.0[row.y_index]);
            assert_eq!(row.latitude, dataset.columns.0[row.x_index]);

            // the fixture encodes the cell position in its value
            let expected =
                f64::from(row.valid_period_hrs) * 1000.0 + (row.y_index * 100 + row.x_index) as f64;
            assert_eq!(row.value, Some(expected));
        }
    }

    #[test]
    fn should_flatten_row_major() {
        let dataset = pop12_dataset(&[12, 24, 48, 72], 2, 2);
        let rows = flatten(&dataset, &Product::pop12(), query_time(), MissingHorizons::Skip).unwrap();

        let cells: Vec<(usize, usize)> = rows[..4].iter().map(|r| (r.y_index, r.x_index)).collect();
        assert_eq!(cells, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
        assert_eq!(rows[4].valid_period_hrs, 24);
        assert_eq!((rows[4].y_index, rows[4].x_index), (0, 0));
    }

    #[test]
    fn should_be_idempotent() {
        let dataset = pop12_dataset(&[12, 24, 48, 72], 5, 4);
        let first = flatten(&dataset, &Product::pop12(), query_time(), MissingHorizons::Skip).unwrap();
        let second = flatten(&dataset, &Product::pop12(), query_time(), MissingHorizons::Skip).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn should_return_empty_for_absent_variable() {
        let dataset = pop12_dataset(&[12, 24, 48, 72], 2, 2);
        let rows = flatten(&dataset, &Product::qpf(), query_time(), MissingHorizons::Fail).unwrap();

        assert!(rows.is_empty());
    }

    #[test]
    fn should_return_empty_when_no_horizon_matches() {
        let dataset = pop12_dataset(&[6, 18, 30], 2, 2);

        for policy in [MissingHorizons::Skip, MissingHorizons::Fail] {
            let rows = flatten(&dataset, &Product::pop12(), query_time(), policy).unwrap();
            assert!(rows.is_empty());
        }
    }

    #[test]
    fn should_skip_missing_horizon() {
        let dataset = pop12_dataset(&[6, 18, 24, 48, 72], 2, 2);
        let rows = flatten(&dataset, &Product::pop12(), query_time(), MissingHorizons::Skip).unwrap();

        assert_eq!(rows.len(), 3 * 4);
        assert!(rows.iter().all(|r| r.valid_period_hrs != 12));
        assert_eq!(rows[0].valid_period_hrs, 24);
    }

    #[test]
    fn should_fail_on_missing_horizon() {
        let dataset = pop12_dataset(&[6, 18, 24, 48, 72], 2, 2);
        let result = flatten(&dataset, &Product::pop12(), query_time(), MissingHorizons::Fail);

        assert!(matches!(result, Err(Error::HorizonNotFound { hours: 12, .. })));
    }

    #[test]
    fn should_map_nan_to_none() {
        let variable = crate::dataset::GridVariable::new(
            &Product::qpf().variable,
            vec!["time".to_string(), "y".to_string(), "x".to_string()],
            vec![1, 1, 2],
            vec![12.0],
            vec![f64::NAN, 2.5],
        )
        .unwrap();
        let dataset = fixtures::dataset(vec![variable], 1, 2);
        let rows = flatten(&dataset, &Product::qpf(), query_time(), MissingHorizons::Skip).unwrap();

        assert_eq!(rows[0].value, None);
        assert_eq!(rows[1].value, Some(2.5));
    }

    #[test]
    fn should_reject_mismatched_coordinates() {
        let variable = fixtures::grid_variable(&Product::pop12().variable, &[12], 3, 3);
        let dataset = fixtures::dataset(vec![variable], 2, 3);
        let result = flatten(&dataset, &Product::pop12(), query_time(), MissingHorizons::Skip);

        assert!(matches!(result, Err(Error::Protocol(_))));
    }
}
