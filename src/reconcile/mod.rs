// src/reconcile/mod.rs

pub mod wide;

use rayon::prelude::*;
use std::{
    collections::{BTreeMap, HashMap},
    time::Instant,
};
use tracing::{debug, info, warn};

pub use wide::{InstitutionYear, PivotRow, WideRecord, WideTable, FIXED_COLUMNS};

use crate::error::ExtractError;
use crate::extract::{Field, YearlyExtract};
use crate::identity::Fingerprint;
use crate::mapping::LookupTable;
use crate::report::{FileOutcome, RunReport, Warning};

const REQUIRED: [Field; 3] = [Field::QuestionnaireId, Field::InstId, Field::Value];

/// inst_id → display name, taken from the most recent extract.
#[derive(Debug, Clone, Default)]
pub struct NameRegistry {
    names: HashMap<String, String>,
}

impl NameRegistry {
    /// The latest extract by file-name year; ties and yearless runs fall
    /// back to the last extract in processing order.
    pub fn latest(extracts: &[YearlyExtract]) -> Option<&YearlyExtract> {
        extracts
            .iter()
            .enumerate()
            .max_by_key(|(idx, e)| (e.year, *idx))
            .map(|(_, e)| e)
    }

    pub fn from_extract(extract: &YearlyExtract) -> Result<Self, ExtractError> {
        let parsed = extract.parse(&[Field::InstId])?;
        let mut names = HashMap::new();
        for row in parsed.rows() {
            if !row.inst_id.is_empty() && !row.inst_name.is_empty() {
                names.insert(row.inst_id.to_string(), row.inst_name.to_string());
            }
        }
        Ok(Self { names })
    }

    /// Registry name for `inst_id`, else the extract's own value.
    pub fn resolve<'a>(&'a self, inst_id: &str, fallback: &'a str) -> &'a str {
        self.names.get(inst_id).map(String::as_str).unwrap_or(fallback)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Private long → wide result for one extract.
#[derive(Debug)]
pub struct WideFragment {
    pub name: String,
    pub file_year: Option<i32>,
    pub rows: Vec<PivotRow>,
    pub raw_rows: u64,
    pub matched: u64,
    pub skipped_no_year: u64,
    pub skipped_no_inst: u64,
}

/// Everything `reconcile` produces.
#[derive(Debug)]
pub struct ReconcileOutput {
    pub table: WideTable,
    pub run: RunReport,
}

/// Map every row of every extract through `lookup`, pivot per
/// institution-year and concatenate the yearly fragments.
#[tracing::instrument(level = "info", skip_all, fields(extracts = extracts.len(), lookup = lookup.len()))]
pub fn reconcile(
    extracts: &[YearlyExtract],
    lookup: &LookupTable,
    multiplier: f64,
    pool: &rayon::ThreadPool,
) -> ReconcileOutput {
    let start = Instant::now();
    let mut run = RunReport::new("reconcile");

    // 1) name registry from the latest extract, built before any worker starts
    let registry = match NameRegistry::latest(extracts) {
        Some(latest) => NameRegistry::from_extract(latest).unwrap_or_else(|e| {
            warn!(file = %latest.name, "name registry unavailable: {}", e);
            NameRegistry::default()
        }),
        None => NameRegistry::default(),
    };
    debug!(names = registry.len(), "name registry ready");

    // 2) per-file pivots in parallel
    let fragments: Vec<Result<WideFragment, (String, ExtractError)>> = pool.install(|| {
        extracts
            .par_iter()
            .map(|e| reconcile_extract(e, lookup, &registry))
            .collect()
    });

    // 3) single-writer concatenation, in file order
    let mut table = WideTable::default();
    let mut seen: HashMap<(String, i32), String> = HashMap::new();
    for frag in fragments {
        let frag = match frag {
            Ok(f) => f,
            Err((name, error)) => {
                run.record(FileOutcome::Failed { name, error });
                continue;
            }
        };

        if frag.file_year.is_none() {
            run.warn(Warning::MalformedYear {
                name: frag.name.clone(),
            });
        }
        if frag.skipped_no_year > 0 {
            run.warn(Warning::SkippedRows {
                name: frag.name.clone(),
                count: frag.skipped_no_year,
                reason: "no year",
            });
        }
        if frag.skipped_no_inst > 0 {
            run.warn(Warning::SkippedRows {
                name: frag.name.clone(),
                count: frag.skipped_no_inst,
                reason: "no inst_id",
            });
        }
        if frag.rows.is_empty() {
            run.warn(Warning::NoMatches {
                name: frag.name.clone(),
            });
        }

        for row in frag.rows {
            let id = (row.key.inst_id.clone(), row.key.year);
            match seen.get(&id) {
                Some(origin) if origin != &frag.name => {
                    run.warn(Warning::DuplicateInstitutionYear {
                        inst_id: id.0.clone(),
                        year: id.1,
                    });
                }
                Some(_) => {}
                None => {
                    seen.insert(id, frag.name.clone());
                }
            }
            table
                .records
                .push(WideRecord::normalize(row, multiplier, lookup));
        }

        info!(file = %frag.name, raw = frag.raw_rows, matched = frag.matched, "fragment appended");
        run.record(FileOutcome::Ok {
            name: frag.name,
            rows: frag.raw_rows,
        });
    }

    run.finish();
    info!(
        records = table.len(),
        columns = table.value_columns().len(),
        elapsed = ?start.elapsed(),
        "reconcile complete"
    );
    ReconcileOutput { table, run }
}

#[tracing::instrument(level = "info", skip(extract, lookup, registry), fields(file = %extract.name, year = ?extract.year))]
fn reconcile_extract(
    extract: &YearlyExtract,
    lookup: &LookupTable,
    registry: &NameRegistry,
) -> Result<WideFragment, (String, ExtractError)> {
    let fail = |e| (extract.name.clone(), e);
    let parsed = extract.parse(&REQUIRED).map_err(fail)?;
    if !parsed.has_year_source() {
        return Err(fail(ExtractError::MalformedYear {
            name: extract.name.clone(),
        }));
    }

    let mut groups: BTreeMap<InstitutionYear, PivotRow> = BTreeMap::new();
    let mut matched = 0u64;
    let mut skipped_no_year = 0u64;
    let mut skipped_no_inst = 0u64;

    for row in parsed.rows() {
        // 1) fingerprint → canonical name; unmatched rows are expected noise
        let fp = Fingerprint::new(row.questionnaire_id, row.row_label, row.column_label);
        let Some(canonical) = lookup.get(&fp) else {
            continue;
        };

        // 2) group key
        let Some(year) = row.year else {
            skipped_no_year += 1;
            continue;
        };
        if row.inst_id.is_empty() {
            skipped_no_inst += 1;
            continue;
        }
        let key = InstitutionYear {
            inst_id: row.inst_id.to_string(),
            name: registry.resolve(row.inst_id, row.inst_name).to_string(),
            city: row.inst_city.to_string(),
            state: row.inst_state.to_string(),
            year,
        };

        // 3) pivot; first value in row order wins
        groups
            .entry(key.clone())
            .or_insert_with(|| PivotRow {
                key,
                values: BTreeMap::new(),
            })
            .offer(canonical, row.value);
        matched += 1;
    }

    Ok(WideFragment {
        name: extract.name.clone(),
        file_year: extract.year,
        rows: groups.into_values().collect(),
        raw_rows: parsed.records.len() as u64,
        matched,
        skipped_no_year,
        skipped_no_inst,
    })
}
