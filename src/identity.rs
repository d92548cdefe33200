// src/identity.rs

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
};

static PARENTHESIZED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(.*?\)").expect("valid regex"));
static NON_ALNUM_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));

/// Slug used when a label is empty, missing or has nothing left after cleaning.
pub const EMPTY_SLUG: &str = "total";

/// Turns `"Computer & Info Sciences (CIS)"` into `"computer_info_sciences"`.
///
/// Total and idempotent: every input maps to a non-empty `[a-z0-9_]` string
/// with no leading/trailing underscore, and re-slugging that is a no-op.
pub fn slug(text: &str) -> String {
    let lower = text.to_lowercase();
    let stripped = PARENTHESIZED.replace_all(&lower, "");
    let joined = NON_ALNUM_RUN.replace_all(&stripped, "_");
    let trimmed = joined.trim_matches('_');
    if trimmed.is_empty() {
        EMPTY_SLUG.to_string()
    } else {
        trimmed.to_string()
    }
}

/// `slug` over an optional label; `None` is the same as an empty label.
pub fn slug_opt(text: Option<&str>) -> String {
    slug(text.unwrap_or(""))
}

/// Normalised lookup key `"qid|row|col"`, lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(questionnaire_id: &str, row: Option<&str>, col: Option<&str>) -> Self {
        let raw = format!(
            "{}|{}|{}",
            questionnaire_id,
            row.unwrap_or(""),
            col.unwrap_or("")
        );
        Fingerprint(raw.to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One logical survey data point, independent of year.
///
/// Labels keep the casing they were first seen with; equality, hashing and
/// ordering ignore case and treat a missing label as the empty string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityKey {
    pub questionnaire_id: String,
    pub row_label: String,
    pub column_label: String,
}

impl IdentityKey {
    pub fn new(
        questionnaire_id: impl Into<String>,
        row_label: Option<&str>,
        column_label: Option<&str>,
    ) -> Self {
        Self {
            questionnaire_id: questionnaire_id.into(),
            row_label: row_label.unwrap_or("").to_string(),
            column_label: column_label.unwrap_or("").to_string(),
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::new(
            &self.questionnaire_id,
            Some(&self.row_label),
            Some(&self.column_label),
        )
    }

    fn folded(&self) -> (String, String, String) {
        (
            self.questionnaire_id.to_lowercase(),
            self.row_label.to_lowercase(),
            self.column_label.to_lowercase(),
        )
    }
}

impl PartialEq for IdentityKey {
    fn eq(&self, other: &Self) -> bool {
        self.folded() == other.folded()
    }
}

impl Eq for IdentityKey {}

impl Hash for IdentityKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.folded().hash(state);
    }
}

impl PartialOrd for IdentityKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IdentityKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.folded().cmp(&other.folded())
    }
}
