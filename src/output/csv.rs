//! Save a flattened table as comma separated text.

use std::path::Path;

use crate::{error::Result, extract::FlatRow};

use super::{header, TimeColumns};

pub fn save_rows(rows: &[FlatRow], value_column: &str, file_path: &Path) -> Result<()> {
    let mut writer = ::csv::Writer::from_path(file_path)?;
    let mut times = TimeColumns::new();

    writer.write_record(header(value_column))?;

    for row in rows {
        let [time, time_uct_long, time_uct, time_nyc_long, time_nyc] = times.get(&row.time);

        writer.write_record([
            row.y_index.to_string().as_str(),
            row.x_index.to_string().as_str(),
            row.value.map(|v| v.to_string()).unwrap_or_default().as_str(),
            row.valid_period_hrs.to_string().as_str(),
            row.longitude.to_string().as_str(),
            row.latitude.to_string().as_str(),
            time.as_str(),
            time_uct_long.as_str(),
            time_uct.as_str(),
            time_nyc_long.as_str(),
            time_nyc.as_str(),
        ])?;
    }

    writer.flush()?;

    Ok(())
}

// -- Tests -------------------------------------------------------------------
