// src/store/parquet.rs

use anyhow::{Context, Result};
use arrow::{
    array::{ArrayRef, Float64Array, Int32Array, StringArray},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use parquet::{arrow::ArrowWriter, basic::Compression, file::properties::WriterProperties};
use std::{
    fs::{self, File},
    io::BufWriter,
    path::Path,
    sync::Arc,
};
use tracing::info;

use crate::reconcile::WideTable;

fn arrow_schema(value_columns: &[String]) -> Schema {
    let mut fields = vec![
        Field::new("inst_id", DataType::Utf8, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("city", DataType::Utf8, false),
        Field::new("state", DataType::Utf8, false),
        Field::new("year", DataType::Int32, false),
    ];
    fields.extend(
        value_columns
            .iter()
            .map(|c| Field::new(c, DataType::Float64, false)),
    );
    Schema::new(fields)
}

/// Write the unified table as a single Snappy-compressed Parquet file,
/// via a `.tmp` sibling renamed into place.
pub fn export_parquet<P: AsRef<Path>>(path: P, table: &WideTable) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating export directory {}", parent.display()))?;
    }

    let value_columns = table.value_columns();
    let schema = Arc::new(arrow_schema(&value_columns));
    let recs = &table.records;

    let mut arrays: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(recs.iter().map(|r| r.inst_id.as_str()))),
        Arc::new(StringArray::from_iter_values(recs.iter().map(|r| r.name.as_str()))),
        Arc::new(StringArray::from_iter_values(recs.iter().map(|r| r.city.as_str()))),
        Arc::new(StringArray::from_iter_values(recs.iter().map(|r| r.state.as_str()))),
        Arc::new(Int32Array::from_iter_values(recs.iter().map(|r| r.year))),
    ];
    for col in &value_columns {
        arrays.push(Arc::new(Float64Array::from_iter_values(
            recs.iter().map(|r| WideTable::cell(r, col)),
        )));
    }
    let batch = RecordBatch::try_new(schema.clone(), arrays).context("building record batch")?;

    let tmp_path = path.with_extension("parquet.tmp");
    let file = File::create(&tmp_path)
        .with_context(|| format!("creating {}", tmp_path.display()))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(BufWriter::new(file), schema, Some(props))
        .context("creating Arrow writer")?;
    writer.write(&batch).context("writing batch")?;
    writer.close().context("closing Parquet writer")?;

    fs::rename(&tmp_path, path)
        .with_context(|| format!("renaming {} -> {}", tmp_path.display(), path.display()))?;
    info!(path = %path.display(), rows = table.len(), "parquet export written");
    Ok(())
}
