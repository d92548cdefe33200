// src/config.rs

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Settings shared by every stage. Built once in `main` and passed by
/// reference into `scan`, `generate_mapping` and `reconcile`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding the yearly extracts (`.csv` or `.zip`).
    pub raw_dir: PathBuf,
    /// Glob patterns, relative to `raw_dir`.
    pub file_globs: Vec<String>,
    /// Schema report written by `scan`.
    pub report_path: PathBuf,
    /// Mapping artifact written by `generate-mapping`.
    pub mapping_path: PathBuf,
    /// DuckDB file receiving the unified table and data dictionary.
    pub database_path: PathBuf,
    /// Optional Parquet copy of the unified table.
    pub parquet_path: Option<PathBuf>,
    pub table_name: String,
    pub dictionary_table: String,
    /// Raw values are in thousands of currency units.
    pub value_multiplier: f64,
    /// Worker threads for per-file parsing; 0 lets rayon decide.
    pub threads: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            file_globs: vec!["*.csv".into(), "*.zip".into()],
            report_path: PathBuf::from("schema_changes_detailed.csv"),
            mapping_path: PathBuf::from("mapping.json"),
            database_path: PathBuf::from("herd.duckdb"),
            parquet_path: None,
            table_name: "institutions".into(),
            dictionary_table: "data_dictionary".into(),
            value_multiplier: 1000.0,
            threads: 0,
        }
    }
}

impl PipelineConfig {
    /// Load from a YAML file; fields not present keep their defaults.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: PipelineConfig = serde_yaml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.file_globs.is_empty() {
            anyhow::bail!("file_globs must list at least one pattern");
        }
        if !self.value_multiplier.is_finite() || self.value_multiplier <= 0.0 {
            anyhow::bail!(
                "value_multiplier must be a positive number, got {}",
                self.value_multiplier
            );
        }
        for (what, name) in [
            ("table_name", &self.table_name),
            ("dictionary_table", &self.dictionary_table),
        ] {
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                anyhow::bail!("{} `{}` is not a plain identifier", what, name);
            }
        }
        if self.table_name == self.dictionary_table {
            anyhow::bail!("table_name and dictionary_table must differ");
        }
        Ok(())
    }

    /// Scoped rayon pool sized by `threads`.
    pub fn thread_pool(&self) -> Result<rayon::ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .context("building worker pool")
    }
}
