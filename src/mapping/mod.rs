// src/mapping/mod.rs

pub mod artifact;
pub mod lookup;

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, instrument};

pub use artifact::{read_artifact, write_artifact, MappingArtifact, MappingEntry};
pub use lookup::{DictionaryEntry, LookupTable};

use crate::identity::slug;
use crate::report::{RunReport, Warning};
use crate::scan::IdentityRecord;

/// Which survey section an identity belongs to, decided by questionnaire id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    FundingSources,
    FederalDetailed,
    FederalAgencies,
    NonfedDetailed,
    Other,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::FundingSources,
        Category::FederalDetailed,
        Category::FederalAgencies,
        Category::NonfedDetailed,
        Category::Other,
    ];

    /// Ordered prefix test; first match wins.
    pub fn of(questionnaire_id: &str) -> Self {
        let qid = questionnaire_id.trim();
        if qid.starts_with("01") {
            Category::FundingSources
        } else if qid.starts_with("09") || qid.starts_with('9') {
            Category::FederalDetailed
        } else if qid.starts_with("10") {
            Category::FederalAgencies
        } else if qid.starts_with("11") {
            Category::NonfedDetailed
        } else {
            Category::Other
        }
    }

    /// Key used in the mapping artifact and the data dictionary.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::FundingSources => "funding_sources",
            Category::FederalDetailed => "federal_detailed",
            Category::FederalAgencies => "federal_agencies",
            Category::NonfedDetailed => "nonfed_detailed",
            Category::Other => "other_questions",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic canonical name for an identity within its category.
pub fn canonical_name(category: Category, qid: &str, row: &str, col: &str) -> String {
    match category {
        Category::FundingSources => format!("src_{}", slug(row)),
        Category::FederalDetailed => format!("fed_{}_{}", slug(row), slug(col)),
        Category::FederalAgencies => format!("agency_{}", slug(row)),
        Category::NonfedDetailed => format!("nonfed_{}_{}", slug(row), slug(col)),
        Category::Other => format!("q{}_{}", slug(qid), slug(row)),
    }
}

fn non_empty(s: &str) -> Option<String> {
    Some(s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Output of [`generate`].
#[derive(Debug)]
pub struct Generated {
    pub artifact: MappingArtifact,
    pub run: RunReport,
}

/// Assign every reported identity a canonical name and category.
///
/// When two identities produce the same canonical name the later one in
/// report order replaces the earlier; each replacement is reported.
#[instrument(level = "info", skip_all, fields(records = report.len()))]
pub fn generate(report: &[IdentityRecord]) -> Generated {
    let mut run = RunReport::new("generate-mapping");
    let mut artifact = MappingArtifact::default();
    let mut mapped = 0usize;

    for rec in report {
        let qid = rec.question_id.trim();
        if qid.is_empty() || qid.eq_ignore_ascii_case("nan") {
            continue;
        }

        let category = Category::of(qid);
        let key = canonical_name(category, qid, &rec.row_label, &rec.column_label);
        let entry = MappingEntry {
            key: key.clone(),
            question_id: qid.to_string(),
            row_match: non_empty(&rec.row_label),
            col_match: non_empty(&rec.column_label),
            description: format!(
                "{}: {} - {}",
                rec.question_text, rec.row_label, rec.column_label
            ),
            start_year: rec.first_year,
            end_year: rec.last_year,
        };

        let incoming = entry.fingerprint();
        if let Some(previous) = artifact.entries_mut(category).insert(key.clone(), entry) {
            if previous.fingerprint() != incoming {
                run.warn(Warning::NameCollision {
                    canonical_name: key.clone(),
                    replaced: previous.fingerprint().to_string(),
                    by: incoming.to_string(),
                });
            }
        }
        debug!(%category, key = %key, "mapped identity");
        mapped += 1;
    }

    run.finish();
    info!(
        mapped,
        distinct = artifact.len(),
        collisions = run.warnings.len(),
        "mapping generated"
    );
    Generated { artifact, run }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::PresenceStatus;

    fn rec(qid: &str, row: &str, col: &str) -> IdentityRecord {
        IdentityRecord {
            question_id: qid.into(),
            row_label: row.into(),
            column_label: col.into(),
            question_text: "Question".into(),
            status: PresenceStatus::Consistent,
            first_year: 2010,
            last_year: 2015,
            description_count: 1,
        }
    }

    #[test]
    fn category_prefixes_checked_in_order() {
        assert_eq!(Category::of("01"), Category::FundingSources);
        assert_eq!(Category::of("01a"), Category::FundingSources);
        assert_eq!(Category::of("09B01"), Category::FederalDetailed);
        assert_eq!(Category::of("9"), Category::FederalDetailed);
        assert_eq!(Category::of("10"), Category::FederalAgencies);
        assert_eq!(Category::of("11C"), Category::NonfedDetailed);
        assert_eq!(Category::of("1"), Category::Other);
        assert_eq!(Category::of("15"), Category::Other);
    }

    #[test]
    fn canonical_names_per_category() {
        let name = |qid: &str, row: &str, col: &str| canonical_name(Category::of(qid), qid, row, col);
        assert_eq!(name("01", "Federal government", ""), "src_federal_government");
        assert_eq!(name("09", "Biology", "DOD"), "fed_biology_dod");
        assert_eq!(name("09", "Biology", ""), "fed_biology_total");
        assert_eq!(name("10", "Dept. of Energy (DOE)", ""), "agency_dept_of_energy");
        assert_eq!(name("11", "Chemistry", "Business"), "nonfed_chemistry_business");
        assert_eq!(name("15A", "Postdocs", "x"), "q15a_postdocs");
        assert_eq!(name("04", "", ""), "q04_total");
    }

    #[test]
    fn builds_entries_with_nullable_matches() {
        let out = generate(&[rec("01", "Federal government", ""), rec("09", "Biology", "DOD")]);
        let src = &out.artifact.funding_sources["src_federal_government"];
        assert_eq!(src.row_match.as_deref(), Some("Federal government"));
        assert_eq!(src.col_match, None);
        assert_eq!(src.description, "Question: Federal government - ");
        assert_eq!((src.start_year, src.end_year), (2010, 2015));

        let fed = &out.artifact.federal_detailed["fed_biology_dod"];
        assert_eq!(fed.col_match.as_deref(), Some("DOD"));
        assert!(out.run.warnings.is_empty());
    }

    #[test]
    fn later_identity_wins_name_collision() {
        let out = generate(&[
            rec("09", "Life sciences (NEC)", "DOD"),
            rec("09", "Life sciences", "DOD"),
        ]);
        let entries = &out.artifact.federal_detailed;
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries["fed_life_sciences_dod"].row_match.as_deref(),
            Some("Life sciences")
        );
        assert_eq!(out.run.warnings.len(), 1);
        assert!(matches!(
            &out.run.warnings[0],
            Warning::NameCollision { canonical_name, .. } if canonical_name == "fed_life_sciences_dod"
        ));
    }

    #[test]
    fn generation_is_byte_identical_across_runs() -> anyhow::Result<()> {
        let report = vec![
            rec("11", "Chemistry", "Business"),
            rec("01", "Institution funds", ""),
            rec("10", "NASA", ""),
            rec("21", "Headcount", "Postdocs"),
            rec("", "ignored", ""),
        ];
        let a = generate(&report).artifact.to_json()?;
        let b = generate(&report).artifact.to_json()?;
        assert_eq!(a, b);
        assert!(!a.contains("ignored"));
        Ok(())
    }
}
