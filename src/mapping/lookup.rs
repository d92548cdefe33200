// src/mapping/lookup.rs

use std::collections::{HashMap, HashSet};

use super::{Category, MappingArtifact};
use crate::error::PipelineError;
use crate::identity::Fingerprint;

/// One row of the data dictionary table.
#[derive(Debug, Clone, PartialEq)]
pub struct DictionaryEntry {
    pub category: Category,
    pub column_name: String,
    pub description: String,
    pub start_year: i32,
    pub end_year: i32,
}

/// Fingerprint → canonical name. Built once before any row is looked up,
/// read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    names: HashMap<Fingerprint, String>,
    canonical: HashSet<String>,
    dictionary: Vec<DictionaryEntry>,
}

impl LookupTable {
    /// Flatten all categories. A fingerprint claimed by two different
    /// canonical names is a hard error.
    pub fn from_artifact(artifact: &MappingArtifact) -> Result<Self, PipelineError> {
        let mut names: HashMap<Fingerprint, String> = HashMap::with_capacity(artifact.len());
        let mut dictionary = Vec::with_capacity(artifact.len());

        for (category, entry) in artifact.iter() {
            let fp = entry.fingerprint();
            match names.get(&fp) {
                Some(existing) if existing != &entry.key => {
                    return Err(PipelineError::LookupConflict {
                        fingerprint: fp.to_string(),
                        first: existing.clone(),
                        second: entry.key.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    names.insert(fp, entry.key.clone());
                }
            }
            dictionary.push(DictionaryEntry {
                category,
                column_name: entry.key.clone(),
                description: entry.description.clone(),
                start_year: entry.start_year,
                end_year: entry.end_year,
            });
        }

        let canonical = dictionary.iter().map(|d| d.column_name.clone()).collect();
        Ok(Self {
            names,
            canonical,
            dictionary,
        })
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<&str> {
        self.names.get(fingerprint).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn dictionary(&self) -> &[DictionaryEntry] {
        &self.dictionary
    }

    pub fn is_canonical(&self, name: &str) -> bool {
        self.canonical.contains(name)
    }
}
