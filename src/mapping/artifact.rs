// src/mapping/artifact.rs

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use super::Category;
use crate::error::PipelineError;
use crate::identity::Fingerprint;

/// Canonical record for one identity, keyed by its canonical name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingEntry {
    /// Canonical name; duplicated from the map key so entries stand alone.
    pub key: String,
    pub question_id: String,
    pub row_match: Option<String>,
    pub col_match: Option<String>,
    pub description: String,
    pub start_year: i32,
    pub end_year: i32,
}

impl MappingEntry {
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::new(
            &self.question_id,
            self.row_match.as_deref(),
            self.col_match.as_deref(),
        )
    }
}

/// The persisted contract between `generate-mapping` and `reconcile`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingArtifact {
    pub funding_sources: BTreeMap<String, MappingEntry>,
    pub federal_detailed: BTreeMap<String, MappingEntry>,
    pub federal_agencies: BTreeMap<String, MappingEntry>,
    pub nonfed_detailed: BTreeMap<String, MappingEntry>,
    pub other_questions: BTreeMap<String, MappingEntry>,
}

impl MappingArtifact {
    pub fn entries(&self, category: Category) -> &BTreeMap<String, MappingEntry> {
        match category {
            Category::FundingSources => &self.funding_sources,
            Category::FederalDetailed => &self.federal_detailed,
            Category::FederalAgencies => &self.federal_agencies,
            Category::NonfedDetailed => &self.nonfed_detailed,
            Category::Other => &self.other_questions,
        }
    }

    pub fn entries_mut(&mut self, category: Category) -> &mut BTreeMap<String, MappingEntry> {
        match category {
            Category::FundingSources => &mut self.funding_sources,
            Category::FederalDetailed => &mut self.federal_detailed,
            Category::FederalAgencies => &mut self.federal_agencies,
            Category::NonfedDetailed => &mut self.nonfed_detailed,
            Category::Other => &mut self.other_questions,
        }
    }

    /// Every entry with its category, categories in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (Category, &MappingEntry)> {
        Category::ALL
            .iter()
            .flat_map(move |&cat| self.entries(cat).values().map(move |e| (cat, e)))
    }

    pub fn len(&self) -> usize {
        Category::ALL.iter().map(|c| self.entries(*c).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialized form: pretty JSON with a trailing newline.
    pub fn to_json(&self) -> Result<String> {
        let mut text = serde_json::to_string_pretty(self).context("serializing mapping")?;
        text.push('\n');
        Ok(text)
    }
}

/// Write the artifact atomically: tmp file, then rename over the target.
pub fn write_artifact<P: AsRef<Path>>(path: P, artifact: &MappingArtifact) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating mapping directory {}", parent.display()))?;
    }
    let tmp_path: PathBuf = path.with_extension("json.tmp");
    let mut tmp = fs::File::create(&tmp_path)
        .with_context(|| format!("creating {}", tmp_path.display()))?;
    tmp.write_all(artifact.to_json()?.as_bytes())
        .with_context(|| format!("writing {}", tmp_path.display()))?;
    tmp.sync_all().ok();
    drop(tmp);

    fs::rename(&tmp_path, path)
        .with_context(|| format!("renaming {} -> {}", tmp_path.display(), path.display()))?;
    Ok(())
}

/// Load the artifact; a missing file is [`PipelineError::MappingArtifactMissing`].
pub fn read_artifact<P: AsRef<Path>>(path: P) -> Result<MappingArtifact> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(PipelineError::MappingArtifactMissing(path.to_path_buf()).into());
    }
    let text =
        fs::read_to_string(path).with_context(|| format!("reading mapping {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing mapping {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn json_layout_groups_by_category() -> Result<()> {
        let mut artifact = MappingArtifact::default();
        artifact.funding_sources.insert(
            "src_federal_government".into(),
            MappingEntry {
                key: "src_federal_government".into(),
                question_id: "01".into(),
                row_match: Some("Federal government".into()),
                col_match: None,
                description: "Source: Federal government - ".into(),
                start_year: 2010,
                end_year: 2015,
            },
        );

        let json: serde_json::Value = serde_json::from_str(&artifact.to_json()?)?;
        let entry = &json["funding_sources"]["src_federal_government"];
        assert_eq!(entry["question_id"], "01");
        assert_eq!(entry["col_match"], serde_json::Value::Null);
        assert!(json["other_questions"].as_object().map_or(false, |m| m.is_empty()));
        Ok(())
    }

    #[test]
    fn missing_categories_default_to_empty() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("mapping.json");
        fs::write(&path, r#"{"federal_agencies": {}}"#)?;
        let artifact = read_artifact(&path)?;
        assert!(artifact.is_empty());
        Ok(())
    }

    #[test]
    fn missing_artifact_is_fatal_error() {
        let err = read_artifact("/definitely/not/here/mapping.json").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::MappingArtifactMissing(_))
        ));
    }
}
