// src/report.rs

use chrono::{DateTime, Utc};
use std::{collections::BTreeMap, fmt};
use tracing::{info, warn};

use crate::error::ExtractError;

/// What happened to one input file during a stage.
#[derive(Debug)]
pub enum FileOutcome {
    Ok { name: String, rows: u64 },
    Failed { name: String, error: ExtractError },
}

impl FileOutcome {
    pub fn name(&self) -> &str {
        match self {
            FileOutcome::Ok { name, .. } | FileOutcome::Failed { name, .. } => name,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, FileOutcome::Ok { .. })
    }
}

/// Recoverable oddities surfaced at the end of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    /// File name carries no year; the file was kept but excluded from the year range.
    MalformedYear { name: String },
    /// Two identities slugged to the same canonical name; the later one won.
    NameCollision {
        canonical_name: String,
        replaced: String,
        by: String,
    },
    /// The same institution-year was produced by more than one extract.
    DuplicateInstitutionYear { inst_id: String, year: i32 },
    /// Rows dropped inside an otherwise readable file.
    SkippedRows { name: String, count: u64, reason: &'static str },
    /// Extract yielded no rows that matched the lookup.
    NoMatches { name: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::MalformedYear { name } => {
                write!(f, "{}: no year in file name, excluded from year range", name)
            }
            Warning::NameCollision {
                canonical_name,
                replaced,
                by,
            } => write!(
                f,
                "canonical name `{}` collision: `{}` overwritten by `{}`",
                canonical_name, replaced, by
            ),
            Warning::DuplicateInstitutionYear { inst_id, year } => {
                write!(f, "institution {} appears more than once for {}", inst_id, year)
            }
            Warning::SkippedRows {
                name,
                count,
                reason,
            } => write!(f, "{}: skipped {} rows ({})", name, count, reason),
            Warning::NoMatches { name } => write!(f, "{}: no rows matched the mapping", name),
        }
    }
}

/// End-of-run summary for one stage.
#[derive(Debug)]
pub struct RunReport {
    pub stage: &'static str,
    pub started: DateTime<Utc>,
    pub finished: Option<DateTime<Utc>>,
    pub files: Vec<FileOutcome>,
    pub warnings: Vec<Warning>,
}

impl RunReport {
    pub fn new(stage: &'static str) -> Self {
        Self {
            stage,
            started: Utc::now(),
            finished: None,
            files: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: FileOutcome) {
        if let FileOutcome::Failed { name, error } = &outcome {
            warn!(file = %name, kind = error.kind(), "{}", error);
        }
        self.files.push(outcome);
    }

    pub fn warn(&mut self, warning: Warning) {
        warn!("{}", warning);
        self.warnings.push(warning);
    }

    pub fn finish(&mut self) {
        self.finished = Some(Utc::now());
    }

    pub fn succeeded(&self) -> usize {
        self.files.iter().filter(|f| f.is_ok()).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &ExtractError)> {
        self.files.iter().filter_map(|f| match f {
            FileOutcome::Failed { name, error } => Some((name.as_str(), error)),
            FileOutcome::Ok { .. } => None,
        })
    }

    /// Failure counts by error kind.
    pub fn failures_by_kind(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for (_, err) in self.failed() {
            *counts.entry(err.kind()).or_insert(0) += 1;
        }
        counts
    }

    pub fn log_summary(&self) {
        let elapsed = self
            .finished
            .map(|f| (f - self.started).num_milliseconds())
            .unwrap_or_default();
        info!(
            stage = self.stage,
            ok = self.succeeded(),
            failed = self.files.len() - self.succeeded(),
            warnings = self.warnings.len(),
            elapsed_ms = elapsed,
            "stage finished"
        );
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "── {} ──", self.stage)?;
        writeln!(
            f,
            "files: {} ok, {} failed",
            self.succeeded(),
            self.files.len() - self.succeeded()
        )?;
        for (name, err) in self.failed() {
            writeln!(f, "  ✗ {} [{}] {}", name, err.kind(), err)?;
        }
        if !self.warnings.is_empty() {
            writeln!(f, "warnings: {}", self.warnings.len())?;
            for w in &self.warnings {
                writeln!(f, "  ! {}", w)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_failures_by_kind() {
        let mut report = RunReport::new("scan");
        report.record(FileOutcome::Ok {
            name: "herd_2010.csv".into(),
            rows: 10,
        });
        report.record(FileOutcome::Failed {
            name: "herd_2011.csv".into(),
            error: ExtractError::SourceRead {
                path: "herd_2011.csv".into(),
                reason: "empty file".into(),
            },
        });
        report.record(FileOutcome::Failed {
            name: "herd_2012.csv".into(),
            error: ExtractError::SourceRead {
                path: "herd_2012.csv".into(),
                reason: "bad zip".into(),
            },
        });
        report.finish();

        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failures_by_kind().get("source_read"), Some(&2));

        let text = report.to_string();
        assert!(text.contains("1 ok, 2 failed"));
        assert!(text.contains("herd_2012.csv"));
    }
}
