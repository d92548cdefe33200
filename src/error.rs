// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Per-file failures. These never abort a run; the file is skipped and the
/// error ends up in the stage's [`RunReport`](crate::report::RunReport).
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("cannot read `{path}`: {reason}")]
    SourceRead { path: String, reason: String },
    #[error("`{path}` lacks required column `{field}` (tried {tried:?})")]
    SchemaResolution {
        path: String,
        field: &'static str,
        tried: &'static [&'static str],
    },
    #[error("no 4-digit year in file name `{name}`")]
    MalformedYear { name: String },
}

impl ExtractError {
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractError::SourceRead { .. } => "source_read",
            ExtractError::SchemaResolution { .. } => "schema_resolution",
            ExtractError::MalformedYear { .. } => "malformed_year",
        }
    }
}

/// Failures that stop a stage outright.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("mapping artifact `{0}` not found; run `generate-mapping` first")]
    MappingArtifactMissing(PathBuf),
    #[error("schema report `{0}` not found; run `scan` first")]
    SchemaReportMissing(PathBuf),
    #[error("fingerprint `{fingerprint}` maps to both `{first}` and `{second}`")]
    LookupConflict {
        fingerprint: String,
        first: String,
        second: String,
    },
}
