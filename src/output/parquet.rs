//! Save a flattened table to a parquet file.

use std::{fs::File, path::Path, sync::Arc};

use arrow::{
    array::{ArrayRef, Float64Builder, StringBuilder, UInt32Builder},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use parquet::{
    arrow::ArrowWriter,
    basic::{Compression, ZstdLevel},
    file::properties::WriterProperties,
};

use crate::{error::Result, extract::FlatRow};

use super::{header, TimeColumns};

const CHUNK_SIZE: usize = 100_000;

pub fn save_rows(rows: &[FlatRow], value_column: &str, file_path: &Path) -> Result<()> {
    let file = File::create(file_path)?;
    let schema = schema(value_column);

    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::default()))
        .set_dictionary_enabled(true) // the time columns repeat on every row
        .build();

    let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;
    let mut builders = Builders::with_capacity(CHUNK_SIZE.min(rows.len()));
    let mut times = TimeColumns::new();

    for chunk in rows.chunks(CHUNK_SIZE) {
        for row in chunk {
            builders.append(row, times.get(&row.time));
        }

        let batch = RecordBatch::try_new(schema.clone(), builders.finish())?;
        writer.write(&batch)?;
    }

    writer.close()?;

    Ok(())
}

fn schema(value_column: &str) -> Arc<Schema> {
    let [y_index, x_index, value, valid_period_hrs, longitude, latitude, times @ ..] =
        header(value_column);

    let mut fields = vec![
        Field::new(y_index, DataType::UInt32, false),
        Field::new(x_index, DataType::UInt32, false),
        Field::new(value, DataType::Float64, true),
        Field::new(valid_period_hrs, DataType::UInt32, false),
        Field::new(longitude, DataType::Float64, false),
        Field::new(latitude, DataType::Float64, false),
    ];
    fields.extend(times.iter().map(|name| Field::new(*name, DataType::Utf8, false)));

    Arc::new(Schema::new(fields))
}

struct Builders {
    y_index: UInt32Builder,
    x_index: UInt32Builder,
    value: Float64Builder,
    valid_period_hrs: UInt32Builder,
    longitude: Float64Builder,
    latitude: Float64Builder,
    times: [StringBuilder; 5],
}

impl Builders {
    fn with_capacity(rows: usize) -> Self {
        Builders {
            y_index: UInt32Builder::with_capacity(rows),
            x_index: UInt32Builder::with_capacity(rows),
            value: Float64Builder::with_capacity(rows),
            valid_period_hrs: UInt32Builder::with_capacity(rows),
            longitude: Float64Builder::with_capacity(rows),
            latitude: Float64Builder::with_capacity(rows),
            times: std::array::from_fn(|_| StringBuilder::with_capacity(rows, rows * 25)),
        }
    }

    fn append(&mut self, row: &FlatRow, times: &[String; 5]) {
        self.y_index.append_value(row.y_index as u32);
        self.x_index.append_value(row.x_index as u32);
        self.value.append_option(row.value);
        self.valid_period_hrs.append_value(row.valid_period_hrs);
        self.longitude.append_value(row.longitude);
        self.latitude.append_value(row.latitude);
        for (builder, time) in self.times.iter_mut().zip(times) {
            builder.append_value(time);
        }
    }

    // Leaves the builders empty, ready for the next chunk.
    fn finish(&mut self) -> Vec<ArrayRef> {
        let mut columns: Vec<ArrayRef> = vec![
            Arc::new(self.y_index.finish()),
            Arc::new(self.x_index.finish()),
            Arc::new(self.value.finish()),
            Arc::new(self.valid_period_hrs.finish()),
            Arc::new(self.longitude.finish()),
            Arc::new(self.latitude.finish()),
        ];
        for builder in self.times.iter_mut() {
            columns.push(Arc::new(builder.finish()));
        }

        columns
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {
    use arrow::array::{Array, Float64Array, StringArray, UInt32Array};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use tempfile::TempDir;

    use crate::time::QueryTime;

    use super::*;

    #[test]
    fn should_round_trip_rows() {
        let time = QueryTime::parse("2020-06-17 12:00").unwrap();
        let rows = vec![
            FlatRow {
                y_index: 0,
                x_index: 1,
                value: Some(1.5),
                valid_period_hrs: 24,
                longitude: -78.0,
                latitude: 35.0,
                time,
            },
            FlatRow {
                y_index: 1,
                x_index: 0,
                value: None,
                valid_period_hrs: 24,
                longitude: -77.5,
                latitude: 34.5,
                time,
            },
        ];

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("qpf_2020061712.parquet");
        save_rows(&rows, "qpf_value_kgperm2", &path).unwrap();

        let file = File::open(&path).unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();
        let batches: Vec<RecordBatch> = reader.map(|b| b.unwrap()).collect();
        let batch = &batches[0];

        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 11);
        assert_eq!(batch.schema().field(2).name(), "qpf_value_kgperm2");

        let x_index = batch.column(1).as_any().downcast_ref::<UInt32Array>().unwrap();
        assert_eq!(x_index.value(0), 1);

        let value = batch.column(2).as_any().downcast_ref::<Float64Array>().unwrap();
        assert_eq!(value.value(0), 1.5);
        assert!(value.is_null(1));

        let time_nyc = batch.column(10).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(time_nyc.value(0), "2020-06-17 08:00");
    }
}
