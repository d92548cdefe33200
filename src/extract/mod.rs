// src/extract/mod.rs

pub mod columns;
pub mod source;

use csv::{ReaderBuilder, StringRecord};
use once_cell::sync::Lazy;
use regex::Regex;

pub use columns::{Field, ResolvedColumns};
pub use source::{discover, Discovered, SourceLocation};

use crate::error::ExtractError;

static FOUR_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]{4}").expect("valid regex"));

/// One yearly release of the survey, as found on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct YearlyExtract {
    /// File name (or `archive.zip:entry.csv`); also the processing order key.
    pub name: String,
    /// From the first four consecutive digits of the name.
    pub year: Option<i32>,
    pub location: SourceLocation,
}

/// First run of four consecutive ASCII digits in `name`.
pub fn year_from_name(name: &str) -> Option<i32> {
    FOUR_DIGITS
        .find(name)
        .and_then(|m| m.as_str().parse().ok())
}

/// Parse a reported value: trimmed, thousands separators removed, finite.
pub fn parse_value(raw: &str) -> Option<f64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_year_cell(raw: &str) -> Option<i32> {
    let v = raw.trim();
    v.parse::<i32>().ok().or_else(|| {
        v.parse::<f64>()
            .ok()
            .filter(|f| f.fract() == 0.0 && (1000.0..=9999.0).contains(f))
            .map(|f| f as i32)
    })
}

/// A fully read extract: resolved header plus every data record.
#[derive(Debug)]
pub struct ParsedExtract {
    pub name: String,
    pub year: Option<i32>,
    pub columns: ResolvedColumns,
    pub records: Vec<StringRecord>,
}

/// One survey response row, borrowed from a [`ParsedExtract`].
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow<'a> {
    pub year: Option<i32>,
    /// Trimmed; empty when absent or a `nan` artefact.
    pub questionnaire_id: &'a str,
    pub row_label: Option<&'a str>,
    pub column_label: Option<&'a str>,
    pub description: &'a str,
    pub inst_id: &'a str,
    pub inst_name: &'a str,
    pub inst_city: &'a str,
    pub inst_state: &'a str,
    pub value: Option<f64>,
}

impl YearlyExtract {
    /// Read, decode and parse the whole extract, checking `required` fields.
    #[tracing::instrument(level = "debug", skip(self, required), fields(file = %self.name))]
    pub fn parse(&self, required: &[Field]) -> Result<ParsedExtract, ExtractError> {
        let bytes = self.location.read_bytes()?;
        let text = source::decode_text(&bytes);
        parse_text(&self.name, self.year, &text, required)
    }
}

/// Parse decoded extract text. Split out so tests can feed literals.
pub fn parse_text(
    name: &str,
    year: Option<i32>,
    text: &str,
    required: &[Field],
) -> Result<ParsedExtract, ExtractError> {
    let read_err = |reason: String| ExtractError::SourceRead {
        path: name.to_string(),
        reason,
    };

    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = rdr
        .headers()
        .map_err(|e| read_err(format!("header: {}", e)))?
        .clone();
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(read_err("missing header row".into()));
    }

    let columns = ResolvedColumns::resolve(&headers.iter().collect::<Vec<_>>());
    columns.require(name, required)?;

    let mut records = Vec::new();
    for (idx, rec) in rdr.records().enumerate() {
        let rec = rec.map_err(|e| read_err(format!("record {}: {}", idx, e)))?;
        records.push(rec);
    }

    Ok(ParsedExtract {
        name: name.to_string(),
        year,
        columns,
        records,
    })
}

impl ParsedExtract {
    pub fn rows(&self) -> impl Iterator<Item = RawRow<'_>> + '_ {
        self.records.iter().map(move |rec| self.row(rec))
    }

    fn row<'a>(&'a self, rec: &'a StringRecord) -> RawRow<'a> {
        let cell = |idx: Option<usize>| -> &'a str {
            idx.and_then(|i| rec.get(i)).map(str::trim).unwrap_or("")
        };
        let label = |idx: Option<usize>| -> Option<&'a str> {
            Some(cell(idx)).filter(|s| !s.is_empty())
        };

        let qid = cell(self.columns.questionnaire_id);
        let qid = if qid.eq_ignore_ascii_case("nan") { "" } else { qid };

        RawRow {
            year: self
                .year
                .or_else(|| parse_year_cell(cell(self.columns.year))),
            questionnaire_id: qid,
            row_label: label(self.columns.row_label),
            column_label: label(self.columns.column_label),
            description: cell(self.columns.description),
            inst_id: cell(self.columns.inst_id),
            inst_name: cell(self.columns.inst_name),
            inst_city: cell(self.columns.inst_city),
            inst_state: cell(self.columns.inst_state),
            value: parse_value(cell(self.columns.value)),
        }
    }

    /// True when rows can get a year from somewhere.
    pub fn has_year_source(&self) -> bool {
        self.year.is_some() || self.columns.year.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Inst_ID,Inst_Name_Long,Inst_City,Inst_State_Code,Questionnaire_No,Question,Row,Column,Data
001,Alpha University,Springfield,IL,01,Source of funds,Federal government,,500
001,Alpha University,Springfield,IL,09A, Federal by field ,Biology,DOD,\"1,200\"
001,Alpha University,Springfield,IL,nan,metadata,,,
";

    #[test]
    fn year_is_first_four_digits() {
        assert_eq!(year_from_name("herd_2015.csv"), Some(2015));
        assert_eq!(year_from_name("herd_2010_herd_2010_short.csv"), Some(2010));
        assert_eq!(year_from_name("herd20151.csv"), Some(2015));
        assert_eq!(year_from_name("herd_15.csv"), None);
        assert_eq!(year_from_name("herd.csv"), None);
    }

    #[test]
    fn values_parse_leniently() {
        assert_eq!(parse_value(" 500 "), Some(500.0));
        assert_eq!(parse_value("1,200"), Some(1200.0));
        assert_eq!(parse_value("-3.5"), Some(-3.5));
        assert_eq!(parse_value(""), None);
        assert_eq!(parse_value("n/a"), None);
        assert_eq!(parse_value("inf"), None);
    }

    #[test]
    fn parses_rows_with_case_insensitive_headers() {
        let parsed = parse_text(
            "herd_2015.csv",
            Some(2015),
            SAMPLE,
            &[Field::QuestionnaireId, Field::InstId, Field::Value],
        )
        .expect("parse");
        let rows: Vec<RawRow> = parsed.rows().collect();
        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].questionnaire_id, "01");
        assert_eq!(rows[0].row_label, Some("Federal government"));
        assert_eq!(rows[0].column_label, None);
        assert_eq!(rows[0].value, Some(500.0));
        assert_eq!(rows[0].year, Some(2015));
        assert_eq!(rows[0].inst_state, "IL");

        assert_eq!(rows[1].description, "Federal by field");
        assert_eq!(rows[1].column_label, Some("DOD"));
        assert_eq!(rows[1].value, Some(1200.0));

        assert_eq!(rows[2].questionnaire_id, "");
        assert_eq!(rows[2].value, None);
    }

    #[test]
    fn year_column_backs_up_missing_file_year() {
        let text = "questionnaire_no,year\n01,2013\n01,2013.0\n01,\n";
        let parsed = parse_text("herd.csv", None, text, &[Field::QuestionnaireId]).expect("parse");
        assert!(parsed.has_year_source());
        let years: Vec<Option<i32>> = parsed.rows().map(|r| r.year).collect();
        assert_eq!(years, vec![Some(2013), Some(2013), None]);
    }

    #[test]
    fn missing_header_is_source_read_error() {
        let err = parse_text("empty_2012.csv", Some(2012), "", &[]).unwrap_err();
        assert_eq!(err.kind(), "source_read");

        let err = parse_text(
            "odd_2012.csv",
            Some(2012),
            "inst_id,data\n1,2\n",
            &[Field::QuestionnaireId],
        )
        .unwrap_err();
        assert_eq!(err.kind(), "schema_resolution");
    }
}
