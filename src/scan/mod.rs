// src/scan/mod.rs

pub mod report;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    fmt,
    time::Instant,
};
use tracing::{debug, info};

pub use report::{read_report, write_report, IdentityRecord};

use crate::error::ExtractError;
use crate::extract::{Field, YearlyExtract};
use crate::identity::IdentityKey;
use crate::report::{FileOutcome, RunReport, Warning};

/// Where an identity sits relative to the scanned year range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PresenceStatus {
    /// Present in both the earliest and the latest year.
    Consistent,
    /// Present in the earliest year, gone by the latest.
    Removed,
    /// Absent from the earliest year, present in the latest.
    New,
    /// Absent from both bounding years.
    Intermittent,
}

impl PresenceStatus {
    pub fn classify(first_year: i32, last_year: i32, min_year: i32, max_year: i32) -> Self {
        match (first_year <= min_year, last_year >= max_year) {
            (true, true) => PresenceStatus::Consistent,
            (true, false) => PresenceStatus::Removed,
            (false, true) => PresenceStatus::New,
            (false, false) => PresenceStatus::Intermittent,
        }
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PresenceStatus::Consistent => "Consistent",
            PresenceStatus::Removed => "Removed",
            PresenceStatus::New => "New",
            PresenceStatus::Intermittent => "Intermittent",
        };
        f.write_str(s)
    }
}

/// Identity → (year → description text seen that year).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentityHistory {
    entries: BTreeMap<IdentityKey, BTreeMap<i32, String>>,
}

impl IdentityHistory {
    pub fn record(&mut self, key: IdentityKey, year: i32, description: &str) {
        self.entries
            .entry(key)
            .or_default()
            .insert(year, description.to_string());
    }

    /// Fold a fragment in; on the same (identity, year) the fragment wins.
    pub fn merge(&mut self, other: IdentityHistory) {
        for (key, years) in other.entries {
            self.entries.entry(key).or_default().extend(years);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &IdentityKey) -> Option<&BTreeMap<i32, String>> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IdentityKey, &BTreeMap<i32, String>)> {
        self.entries.iter()
    }

    fn year_span(&self) -> Option<(i32, i32)> {
        let years = self.entries.values().flat_map(|y| y.keys().copied());
        years.fold(None, |acc, y| match acc {
            None => Some((y, y)),
            Some((lo, hi)) => Some((lo.min(y), hi.max(y))),
        })
    }

    /// Build the per-identity report against `[min_year, max_year]`.
    pub fn report(&self, range: (i32, i32)) -> Vec<IdentityRecord> {
        let (min_year, max_year) = range;
        let mut out: Vec<IdentityRecord> = self
            .entries
            .iter()
            .filter_map(|(key, years)| {
                let (&first_year, _) = years.iter().next()?;
                let (&last_year, latest_desc) = years.iter().next_back()?;
                let distinct: HashSet<&str> = years.values().map(String::as_str).collect();
                Some(IdentityRecord {
                    question_id: key.questionnaire_id.clone(),
                    row_label: key.row_label.clone(),
                    column_label: key.column_label.clone(),
                    question_text: latest_desc.clone(),
                    status: PresenceStatus::classify(first_year, last_year, min_year, max_year),
                    first_year,
                    last_year,
                    description_count: distinct.len(),
                })
            })
            .collect();
        out.sort_by(|a, b| {
            (&a.question_id, &a.row_label, &a.column_label).cmp(&(
                &b.question_id,
                &b.row_label,
                &b.column_label,
            ))
        });
        out
    }
}

/// Everything `scan` produces.
#[derive(Debug)]
pub struct ScanOutput {
    pub history: IdentityHistory,
    /// Years taken from file names only.
    pub observed_years: BTreeSet<i32>,
    pub run: RunReport,
}

impl ScanOutput {
    /// `[min, max]` of the observed years, or of the history when no file
    /// name carried a year.
    pub fn year_range(&self) -> Option<(i32, i32)> {
        match (self.observed_years.first(), self.observed_years.last()) {
            (Some(&lo), Some(&hi)) => Some((lo, hi)),
            _ => self.history.year_span(),
        }
    }

    pub fn report(&self) -> Vec<IdentityRecord> {
        self.year_range()
            .map(|range| self.history.report(range))
            .unwrap_or_default()
    }
}

/// Private result of scanning one extract.
struct ScanFragment {
    name: String,
    file_year: Option<i32>,
    has_year_column: bool,
    history: IdentityHistory,
    rows: u64,
    yearless_rows: u64,
}

/// Scan every extract and accumulate the cross-year identity history.
#[tracing::instrument(level = "info", skip_all, fields(extracts = extracts.len()))]
pub fn scan(extracts: &[YearlyExtract], pool: &rayon::ThreadPool) -> ScanOutput {
    let start = Instant::now();
    let mut run = RunReport::new("scan");

    // 1) each worker builds a private fragment
    let fragments: Vec<Result<ScanFragment, (String, ExtractError)>> =
        pool.install(|| extracts.par_iter().map(scan_extract).collect());

    // 2) single-writer merge, in file order
    let mut history = IdentityHistory::default();
    let mut observed_years = BTreeSet::new();
    for frag in fragments {
        match frag {
            Ok(frag) => {
                match frag.file_year {
                    Some(y) => {
                        observed_years.insert(y);
                    }
                    None if frag.has_year_column => run.warn(Warning::MalformedYear {
                        name: frag.name.clone(),
                    }),
                    None => {}
                }
                if frag.yearless_rows > 0 {
                    run.warn(Warning::SkippedRows {
                        name: frag.name.clone(),
                        count: frag.yearless_rows,
                        reason: "no year",
                    });
                }
                debug!(file = %frag.name, identities = frag.history.len(), "merged fragment");
                history.merge(frag.history);
                run.record(FileOutcome::Ok {
                    name: frag.name,
                    rows: frag.rows,
                });
            }
            Err((name, error)) => run.record(FileOutcome::Failed { name, error }),
        }
    }

    run.finish();
    info!(
        identities = history.len(),
        years = observed_years.len(),
        elapsed = ?start.elapsed(),
        "scan complete"
    );
    ScanOutput {
        history,
        observed_years,
        run,
    }
}

#[tracing::instrument(level = "info", skip(extract), fields(file = %extract.name, year = ?extract.year))]
fn scan_extract(extract: &YearlyExtract) -> Result<ScanFragment, (String, ExtractError)> {
    let fail = |e| (extract.name.clone(), e);
    let parsed = extract.parse(&[Field::QuestionnaireId]).map_err(fail)?;
    if !parsed.has_year_source() {
        return Err(fail(ExtractError::MalformedYear {
            name: extract.name.clone(),
        }));
    }

    let mut history = IdentityHistory::default();
    let mut yearless_rows = 0u64;
    for row in parsed.rows() {
        if row.questionnaire_id.is_empty() {
            continue;
        }
        let Some(year) = row.year else {
            yearless_rows += 1;
            continue;
        };
        let key = IdentityKey::new(row.questionnaire_id, row.row_label, row.column_label);
        history.record(key, year, row.description);
    }

    Ok(ScanFragment {
        name: extract.name.clone(),
        file_year: extract.year,
        has_year_column: parsed.columns.year.is_some(),
        history,
        rows: parsed.records.len() as u64,
        yearless_rows,
    })
}

/// Per-status counts, for the end-of-scan summary.
pub fn status_counts(records: &[IdentityRecord]) -> BTreeMap<PresenceStatus, usize> {
    let mut counts = BTreeMap::new();
    for r in records {
        *counts.entry(r.status).or_insert(0) += 1;
    }
    counts
}
