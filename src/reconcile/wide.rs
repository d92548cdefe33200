// src/reconcile/wide.rs

use std::collections::{BTreeMap, BTreeSet};

use crate::mapping::LookupTable;

/// Fixed leading columns of the unified table.
pub const FIXED_COLUMNS: [&str; 5] = ["inst_id", "name", "city", "state", "year"];

/// Grouping key of the long → wide pivot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstitutionYear {
    pub inst_id: String,
    pub name: String,
    pub city: String,
    pub state: String,
    pub year: i32,
}

/// One institution-year before value normalisation. `None` marks a matched
/// canonical name whose raw value was missing or unparseable.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotRow {
    pub key: InstitutionYear,
    pub values: BTreeMap<String, Option<f64>>,
}

impl PivotRow {
    /// First non-missing value per canonical name wins.
    pub fn offer(&mut self, canonical: &str, value: Option<f64>) {
        match self.values.get_mut(canonical) {
            None => {
                self.values.insert(canonical.to_string(), value);
            }
            Some(slot) => {
                if slot.is_none() {
                    *slot = value;
                }
            }
        }
    }
}

/// One row of the unified table, values in absolute currency units.
#[derive(Debug, Clone, PartialEq)]
pub struct WideRecord {
    pub inst_id: String,
    pub name: String,
    pub city: String,
    pub state: String,
    pub year: i32,
    /// Only the canonical names matched for this institution-year.
    pub values: BTreeMap<String, f64>,
}

impl WideRecord {
    /// Rescale by `multiplier` and fill missing values with zero. Applied
    /// exactly once per record, when a fragment joins the table.
    pub fn normalize(row: PivotRow, multiplier: f64, lookup: &LookupTable) -> Self {
        let values = row
            .values
            .into_iter()
            .map(|(name, v)| {
                let v = v.unwrap_or(0.0);
                let v = if lookup.is_canonical(&name) { v * multiplier } else { v };
                (name, v)
            })
            .collect();
        let InstitutionYear {
            inst_id,
            name,
            city,
            state,
            year,
        } = row.key;
        Self {
            inst_id,
            name,
            city,
            state,
            year,
            values,
        }
    }

    pub fn get(&self, column: &str) -> Option<f64> {
        self.values.get(column).copied()
    }
}

/// Concatenation of every yearly fragment, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WideTable {
    pub records: Vec<WideRecord>,
}

impl WideTable {
    /// Sorted union of canonical names over all records.
    pub fn value_columns(&self) -> Vec<String> {
        let set: BTreeSet<&String> = self.records.iter().flat_map(|r| r.values.keys()).collect();
        set.into_iter().cloned().collect()
    }

    /// Cell value for the table view: a name not present in the record is 0.
    pub fn cell(record: &WideRecord, column: &str) -> f64 {
        record.get(column).unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
