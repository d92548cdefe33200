// src/extract/source.rs

use anyhow::{Context, Result};
use glob::glob;
use std::{
    borrow::Cow,
    collections::BTreeSet,
    fs::{self, File},
    io::Read,
    path::{Path, PathBuf},
};
use tracing::{debug, info};
use zip::ZipArchive;

use super::{year_from_name, YearlyExtract};
use crate::error::ExtractError;
use crate::report::FileOutcome;

/// Where an extract's bytes live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    Csv(PathBuf),
    /// A `.csv` entry inside a `.zip` as shipped by the acquisition step.
    ZipEntry { archive: PathBuf, entry: String },
}

/// Result of walking the raw directory.
#[derive(Debug, Default)]
pub struct Discovered {
    pub extracts: Vec<YearlyExtract>,
    /// Archives that could not be opened or listed.
    pub rejected: Vec<FileOutcome>,
}

/// Glob `raw_dir` with each pattern, expand zip archives into their csv
/// entries and return everything sorted by name.
#[tracing::instrument(level = "info", skip(raw_dir, patterns), fields(dir = %raw_dir.as_ref().display()))]
pub fn discover<P: AsRef<Path>>(raw_dir: P, patterns: &[String]) -> Result<Discovered> {
    let raw_dir = raw_dir.as_ref();
    let mut paths = BTreeSet::new();

    // 1) gather files from every pattern
    for pat in patterns {
        let full = format!("{}/{}", raw_dir.display(), pat);
        for entry in glob(&full).with_context(|| format!("invalid glob pattern '{}'", full))? {
            match entry {
                Ok(p) if p.is_file() => {
                    paths.insert(p);
                }
                Ok(_) => {}
                Err(e) => debug!("unreadable glob entry: {}", e),
            }
        }
    }

    // 2) expand archives
    let mut found = Discovered::default();
    for path in paths {
        let file_name = file_name_of(&path);
        let is_zip = path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| e.eq_ignore_ascii_case("zip"));

        if !is_zip {
            found.extracts.push(YearlyExtract {
                year: year_from_name(&file_name),
                name: file_name,
                location: SourceLocation::Csv(path),
            });
            continue;
        }

        match list_csv_entries(&path) {
            Ok(entries) => {
                for entry in entries {
                    let year = year_from_name(&entry).or_else(|| year_from_name(&file_name));
                    found.extracts.push(YearlyExtract {
                        name: format!("{}:{}", file_name, entry),
                        year,
                        location: SourceLocation::ZipEntry {
                            archive: path.clone(),
                            entry,
                        },
                    });
                }
            }
            Err(error) => found.rejected.push(FileOutcome::Failed {
                name: file_name,
                error,
            }),
        }
    }

    found.extracts.sort_by(|a, b| a.name.cmp(&b.name));
    info!(
        extracts = found.extracts.len(),
        rejected = found.rejected.len(),
        "discovered extracts"
    );
    Ok(found)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn list_csv_entries(archive: &Path) -> Result<Vec<String>, ExtractError> {
    let read_err = |reason: String| ExtractError::SourceRead {
        path: archive.display().to_string(),
        reason,
    };
    let file = File::open(archive).map_err(|e| read_err(e.to_string()))?;
    let zip = ZipArchive::new(file).map_err(|e| read_err(e.to_string()))?;

    let mut entries: Vec<String> = zip
        .file_names()
        .filter(|n| n.to_lowercase().ends_with(".csv") && !n.ends_with('/'))
        .map(str::to_string)
        .collect();
    entries.sort();
    Ok(entries)
}

impl SourceLocation {
    /// Read the raw bytes of this source into memory.
    pub fn read_bytes(&self) -> Result<Vec<u8>, ExtractError> {
        match self {
            SourceLocation::Csv(path) => fs::read(path).map_err(|e| ExtractError::SourceRead {
                path: path.display().to_string(),
                reason: e.to_string(),
            }),
            SourceLocation::ZipEntry { archive, entry } => {
                let read_err = |reason: String| ExtractError::SourceRead {
                    path: format!("{}:{}", archive.display(), entry),
                    reason,
                };
                let file = File::open(archive).map_err(|e| read_err(e.to_string()))?;
                let mut zip = ZipArchive::new(file).map_err(|e| read_err(e.to_string()))?;
                let mut handle = zip.by_name(entry).map_err(|e| read_err(e.to_string()))?;
                let mut buf = Vec::with_capacity(handle.size() as usize);
                handle
                    .read_to_end(&mut buf)
                    .map_err(|e| read_err(e.to_string()))?;
                Ok(buf)
            }
        }
    }
}

/// UTF-8 when the bytes are valid UTF-8, Windows-1252 (Latin-1 superset)
/// otherwise. A leading UTF-8 BOM is dropped.
pub fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => encoding_rs::WINDOWS_1252.decode_without_bom_handling(bytes).0,
    }
}
