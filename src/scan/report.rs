// src/scan/report.rs

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use super::PresenceStatus;
use crate::error::PipelineError;

/// One row of the schema report: an identity and its presence over the years.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub question_id: String,
    pub row_label: String,
    pub column_label: String,
    /// Description from the latest year the identity was seen.
    pub question_text: String,
    pub status: PresenceStatus,
    pub first_year: i32,
    pub last_year: i32,
    /// Distinct description texts across years; >1 means the wording drifted.
    pub description_count: usize,
}

/// Write the report as CSV, replacing any previous file atomically.
pub fn write_report<P: AsRef<Path>>(path: P, records: &[IdentityRecord]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating report directory {}", parent.display()))?;
    }

    let tmp_path = path.with_extension("csv.tmp");
    {
        let mut wtr = csv::Writer::from_path(&tmp_path)
            .with_context(|| format!("creating {}", tmp_path.display()))?;
        for rec in records {
            wtr.serialize(rec).context("serializing report row")?;
        }
        wtr.flush().context("flushing report")?;
    }

    fs::rename(&tmp_path, path).with_context(|| {
        format!("renaming {} -> {}", tmp_path.display(), path.display())
    })?;
    Ok(())
}

/// Read a report written by [`write_report`], keeping row order.
pub fn read_report<P: AsRef<Path>>(path: P) -> Result<Vec<IdentityRecord>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(PipelineError::SchemaReportMissing(path.to_path_buf()).into());
    }
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("opening report {}", path.display()))?;
    let mut out = Vec::new();
    for (idx, rec) in rdr.deserialize().enumerate() {
        let rec: IdentityRecord =
            rec.with_context(|| format!("report {} row {}", path.display(), idx + 1))?;
        out.push(rec);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(qid: &str, row: &str, col: &str, status: PresenceStatus) -> IdentityRecord {
        IdentityRecord {
            question_id: qid.into(),
            row_label: row.into(),
            column_label: col.into(),
            question_text: "Expenditures, by source".into(),
            status,
            first_year: 2010,
            last_year: 2015,
            description_count: 1,
        }
    }

    #[test]
    fn report_survives_csv_round_trip_with_empty_labels() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("reports").join("schema.csv");
        let records = vec![
            record("01", "Federal government", "", PresenceStatus::Consistent),
            record("09", "Biology, general", "DOD", PresenceStatus::New),
        ];
        write_report(&path, &records)?;

        let text = fs::read_to_string(&path)?;
        assert!(text.starts_with("question_id,row_label,column_label,question_text,status"));
        assert!(text.contains("\"Biology, general\""));

        assert_eq!(read_report(&path)?, records);
        Ok(())
    }

    #[test]
    fn missing_report_is_typed_error() {
        let err = read_report("/nonexistent/schema.csv").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::SchemaReportMissing(_))
        ));
    }
}
