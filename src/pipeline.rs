// src/pipeline.rs

use anyhow::{Context, Result};
use tracing::info;

use crate::config::PipelineConfig;
use crate::extract::{discover, Discovered};
use crate::mapping::{self, read_artifact, write_artifact, LookupTable};
use crate::reconcile;
use crate::report::RunReport;
use crate::scan::{self, read_report, status_counts, write_report};
use crate::store::{self, export_parquet, OutputTables};

fn discover_all(cfg: &PipelineConfig, run: &mut RunReport) -> Result<Discovered> {
    let mut found = discover(&cfg.raw_dir, &cfg.file_globs)?;
    for rejected in found.rejected.drain(..) {
        run.record(rejected);
    }
    Ok(found)
}

/// Stage 1: discover extracts, build the identity history, write the report.
pub fn run_scan(cfg: &PipelineConfig) -> Result<RunReport> {
    let pool = cfg.thread_pool()?;
    let mut rejected = RunReport::new("scan");
    let found = discover_all(cfg, &mut rejected)?;

    let mut out = scan::scan(&found.extracts, &pool);
    let records = out.report();
    write_report(&cfg.report_path, &records)?;

    for (status, n) in status_counts(&records) {
        info!(%status, count = n, "identities");
    }
    info!(path = %cfg.report_path.display(), identities = records.len(), "schema report written");

    out.run.files.splice(0..0, rejected.files);
    out.run.log_summary();
    Ok(out.run)
}

/// Stage 2: report → mapping artifact.
pub fn run_generate(cfg: &PipelineConfig) -> Result<RunReport> {
    let records = read_report(&cfg.report_path)?;
    let generated = mapping::generate(&records);
    write_artifact(&cfg.mapping_path, &generated.artifact)?;
    info!(
        path = %cfg.mapping_path.display(),
        entries = generated.artifact.len(),
        "mapping artifact written"
    );
    generated.run.log_summary();
    Ok(generated.run)
}

/// Stage 3: extracts + mapping → unified table and data dictionary.
/// A missing mapping artifact aborts before any extract is read.
pub fn run_reconcile(cfg: &PipelineConfig) -> Result<RunReport> {
    let artifact = read_artifact(&cfg.mapping_path)?;
    let lookup = LookupTable::from_artifact(&artifact)
        .with_context(|| format!("building lookup from {}", cfg.mapping_path.display()))?;
    info!(fingerprints = lookup.len(), "lookup ready");

    let pool = cfg.thread_pool()?;
    let mut rejected = RunReport::new("reconcile");
    let found = discover_all(cfg, &mut rejected)?;

    let mut out = reconcile::reconcile(&found.extracts, &lookup, cfg.value_multiplier, &pool);

    let names = OutputTables {
        table: &cfg.table_name,
        dictionary: &cfg.dictionary_table,
    };
    store::with_connection(&cfg.database_path, |conn| {
        store::write_outputs(conn, &names, lookup.dictionary(), &out.table)
    })?;
    info!(db = %cfg.database_path.display(), table = %cfg.table_name, "unified table stored");

    if let Some(path) = &cfg.parquet_path {
        export_parquet(path, &out.table)?;
    }

    out.run.files.splice(0..0, rejected.files);
    out.run.log_summary();
    Ok(out.run)
}

/// All three stages in order.
pub fn run_all(cfg: &PipelineConfig) -> Result<Vec<RunReport>> {
    Ok(vec![run_scan(cfg)?, run_generate(cfg)?, run_reconcile(cfg)?])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use std::{fs, path::Path};
    use tempfile::tempdir;

    const HEADER: &str =
        "inst_id,inst_name_long,inst_city,inst_state_code,questionnaire_no,question,row,column,data\n";

    fn config(root: &Path) -> PipelineConfig {
        PipelineConfig {
            raw_dir: root.join("raw"),
            report_path: root.join("schema_changes_detailed.csv"),
            mapping_path: root.join("mapping.json"),
            database_path: root.join("out").join("herd.duckdb"),
            parquet_path: Some(root.join("out").join("institutions.parquet")),
            threads: 2,
            ..PipelineConfig::default()
        }
    }

    fn seed(cfg: &PipelineConfig) -> Result<()> {
        fs::create_dir_all(&cfg.raw_dir)?;
        fs::write(
            cfg.raw_dir.join("herd_2010.csv"),
            format!(
                "{}001,Alpha Univ.,Springfield,IL,01,Source of funds,Federal government,,500\n",
                HEADER
            ),
        )?;
        fs::write(
            cfg.raw_dir.join("herd_2015.csv"),
            format!(
                "{}001,Alpha University,Springfield,IL,01,Source of funds,Federal government,,500\n\
                 001,Alpha University,Springfield,IL,09,Federal by field,Biology,DOD,200\n",
                HEADER
            ),
        )?;
        Ok(())
    }

    #[test]
    fn end_to_end_two_years() -> Result<()> {
        let dir = tempdir()?;
        let cfg = config(dir.path());
        seed(&cfg)?;

        let reports = run_all(&cfg)?;
        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].succeeded(), 2);
        assert_eq!(reports[2].succeeded(), 2);

        // 1) report
        let records = read_report(&cfg.report_path)?;
        assert_eq!(records.len(), 2);

        // 2) mapping
        let artifact = read_artifact(&cfg.mapping_path)?;
        assert!(artifact.funding_sources.contains_key("src_federal_government"));
        assert!(artifact.federal_detailed.contains_key("fed_biology_dod"));

        // 3) unified table
        store::with_connection(&cfg.database_path, |conn| {
            assert_eq!(store::count_rows(conn, "institutions")?, 2);
            assert_eq!(store::count_rows(conn, "data_dictionary")?, 2);
            let (name, src, fed): (String, f64, f64) = conn.query_row(
                "SELECT name, src_federal_government, fed_biology_dod \
                 FROM institutions WHERE inst_id = '001' AND year = 2015",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )?;
            assert_eq!(name, "Alpha University");
            assert_eq!(src, 500_000.0);
            assert_eq!(fed, 200_000.0);

            let (name, fed): (String, f64) = conn.query_row(
                "SELECT name, fed_biology_dod FROM institutions WHERE year = 2010",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )?;
            assert_eq!(name, "Alpha University");
            assert_eq!(fed, 0.0);
            Ok(())
        })?;

        assert!(cfg.parquet_path.as_ref().is_some_and(|p| p.exists()));
        Ok(())
    }

    #[test]
    fn reconcile_without_mapping_fails_fast() -> Result<()> {
        let dir = tempdir()?;
        let cfg = config(dir.path());
        seed(&cfg)?;

        let err = run_reconcile(&cfg).expect_err("mapping is missing");
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::MappingArtifactMissing(_))
        ));
        assert!(!cfg.database_path.exists());
        Ok(())
    }

    #[test]
    fn generate_without_report_fails_fast() -> Result<()> {
        let dir = tempdir()?;
        let cfg = config(dir.path());
        let err = run_generate(&cfg).expect_err("report is missing");
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::SchemaReportMissing(_))
        ));
        Ok(())
    }

    #[test]
    fn rerunning_generate_is_byte_identical() -> Result<()> {
        let dir = tempdir()?;
        let cfg = config(dir.path());
        seed(&cfg)?;

        run_scan(&cfg)?;
        run_generate(&cfg)?;
        let first = fs::read(&cfg.mapping_path)?;
        run_generate(&cfg)?;
        let second = fs::read(&cfg.mapping_path)?;
        assert_eq!(first, second);
        Ok(())
    }
}
